//! Markup format checks.
//!
//! Findings are advisory. The build logs them and carries on; the doctor
//! command prints them.

use std::fmt;

/// Fenced code delimiter.
pub const FENCE: &str = "```";

/// A single formatting problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// 1-based line number, when the problem is tied to a line.
    pub line: Option<usize>,
    pub kind: FindingKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingKind {
    EmptyBody,
    HeadingSpace,
    BulletSpace,
    UnclosedFence,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::EmptyBody => "content is empty",
            Self::HeadingSpace => "heading is missing a space after '#'",
            Self::BulletSpace => "list item is missing a space after the bullet",
            Self::UnclosedFence => "code block is not closed",
        };
        f.write_str(message)
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Check a document for formatting problems.
///
/// A leading front matter block and fenced code are skipped. An empty
/// document yields a single [`FindingKind::EmptyBody`].
pub fn validate(content: &str) -> Vec<Finding> {
    if content.trim().is_empty() {
        return vec![Finding {
            line: None,
            kind: FindingKind::EmptyBody,
        }];
    }

    let mut findings = Vec::new();
    let mut in_fence = false;
    let mut header = HeaderState::Before;

    for (idx, line) in content.lines().enumerate() {
        let number = idx + 1;
        let trimmed = line.trim();

        match header {
            HeaderState::Before if trimmed.is_empty() => continue,
            HeaderState::Before if trimmed == "---" => {
                header = HeaderState::Inside;
                continue;
            }
            HeaderState::Inside => {
                if trimmed == "---" {
                    header = HeaderState::Done;
                }
                continue;
            }
            _ => header = HeaderState::Done,
        }

        if is_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        if missing_heading_space(line) {
            findings.push(Finding {
                line: Some(number),
                kind: FindingKind::HeadingSpace,
            });
        } else if missing_bullet_space(line) {
            findings.push(Finding {
                line: Some(number),
                kind: FindingKind::BulletSpace,
            });
        }
    }

    if in_fence {
        findings.push(Finding {
            line: None,
            kind: FindingKind::UnclosedFence,
        });
    }

    findings
}

#[derive(Clone, Copy)]
enum HeaderState {
    Before,
    Inside,
    Done,
}

pub(crate) fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

/// `#Title`: one to six hashes directly followed by text.
pub(crate) fn missing_heading_space(line: &str) -> bool {
    let rest = line.trim_start_matches('#');
    let hashes = line.len() - rest.len();
    (1..=6).contains(&hashes)
        && rest
            .chars()
            .next()
            .is_some_and(|c| !c.is_whitespace() && c != '#')
}

/// `-item`: a bullet directly followed by a letter. `*` only counts when
/// the line has no other `*`, so emphasis is left alone.
pub(crate) fn missing_bullet_space(line: &str) -> bool {
    let mut chars = line.chars();
    let Some(bullet @ ('-' | '*' | '+')) = chars.next() else {
        return false;
    };
    let rest = chars.as_str();
    if !rest.chars().next().is_some_and(char::is_alphabetic) {
        return false;
    }
    bullet != '*' || !rest.contains('*')
}
