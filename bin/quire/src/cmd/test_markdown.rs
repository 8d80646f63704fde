//! Markdown self-test - run fixed documents through the validator and converter

use color_eyre::eyre::{Result, bail};
use quire_parser::{MarkdownConverter, validate};

struct Case {
    name: &'static str,
    content: &'static str,
    valid: bool,
}

const CASES: &[Case] = &[
    Case {
        name: "well-formed document",
        content: "---\ntitle: \"测试文章\"\ndate: 2024-01-01\nlayout: post\n---\n\n# 标题1\n\n\
                  这是一段正常的内容。\n\n## 标题2\n\n- 列表项1\n- 列表项2\n\n\
                  ```rust\nfn main() {\n    println!(\"Hello, World!\");\n}\n```\n",
        valid: true,
    },
    Case {
        name: "no front matter",
        content: "# 标题\n\n这是没有前置数据的内容。\n\n- 列表项\n",
        valid: true,
    },
    Case {
        name: "heading without space",
        content: "---\ntitle: \"测试\"\n---\n\n#标题1\n##标题2\n\n正常内容\n",
        valid: false,
    },
    Case {
        name: "list item without space",
        content: "---\ntitle: \"测试\"\n---\n\n-列表项1\n*列表项2\n+列表项3\n",
        valid: false,
    },
    Case {
        name: "unclosed code block",
        content: "---\ntitle: \"测试\"\n---\n\n```rust\nfn main() {\n    println!(\"Hello\");\n// no closing fence\n",
        valid: false,
    },
    Case {
        name: "empty",
        content: "",
        valid: false,
    },
    Case {
        name: "whitespace only",
        content: "   \n\t\n  ",
        valid: false,
    },
    Case {
        name: "malformed YAML header",
        content: "---\ntitle: \"测试\"\ndate: 2024-01-01\nlayout: post\ninvalid: yaml: format\n---\n\n正常内容\n",
        valid: true,
    },
];

/// Outcome of one case.
#[derive(Debug)]
struct Outcome {
    name: &'static str,
    passed: bool,
    findings: Vec<String>,
    html_len: usize,
}

fn run_cases() -> Vec<Outcome> {
    let converter = MarkdownConverter::new();
    CASES
        .iter()
        .map(|case| {
            let findings: Vec<String> = validate(case.content)
                .iter()
                .map(ToString::to_string)
                .collect();
            Outcome {
                name: case.name,
                passed: findings.is_empty() == case.valid,
                findings,
                html_len: converter.convert(case.content).len(),
            }
        })
        .collect()
}

/// Run the self-test, failing when any expectation is not met.
pub fn run() -> Result<()> {
    let outcomes = run_cases();

    println!("=== Markdown validation ===");
    for (idx, outcome) in outcomes.iter().enumerate() {
        let mark = if outcome.passed { "✓ pass" } else { "✗ fail" };
        if outcome.findings.is_empty() {
            println!("  {}. {}: {mark}", idx + 1, outcome.name);
        } else {
            println!(
                "  {}. {}: {mark} ({})",
                idx + 1,
                outcome.name,
                outcome.findings.join(", ")
            );
        }
    }

    println!();
    println!("=== Markdown conversion ===");
    for (idx, outcome) in outcomes.iter().enumerate() {
        println!("  {}. {}: {} bytes of HTML", idx + 1, outcome.name, outcome.html_len);
    }

    let failed = outcomes.iter().filter(|outcome| !outcome.passed).count();
    tracing::info!(cases = outcomes.len(), failed, "Markdown self-test finished");
    if failed > 0 {
        bail!("{failed} of {} markdown cases failed", outcomes.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_cases_pass() {
        for outcome in run_cases() {
            assert!(outcome.passed, "{}: {:?}", outcome.name, outcome.findings);
        }
        assert!(run().is_ok());
    }

    #[test]
    fn test_blank_cases_convert_to_nothing() {
        let outcomes = run_cases();
        assert_eq!(outcomes[5].html_len, 0);
        assert_eq!(outcomes[6].html_len, 0);
        assert!(outcomes[0].html_len > 0);
    }
}
