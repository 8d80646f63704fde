//! Tera-backed template engine.
//!
//! Every layout and include is compiled into one [`Tera`] set with
//! autoescaping on for all names. Layouts print pre-rendered HTML with
//! `{{ content | safe }}`.
//!
//! Helper functions, called with named arguments:
//!
//! | Function | Result |
//! |---|---|
//! | `include(name)` | template `name` rendered against the current data |
//! | `date(format, value)` | strftime-formatted timestamp, `""` if `value` is not one |
//! | `escape(s)` / `safe(s)` | escaped / trusted HTML |
//! | `strip(s)` | `s` trimmed |
//! | `truncate(s, n)` | first `n` characters, then `...` if cut |
//! | `first(n, seq)` | first `n` elements |
//! | `join(sep, seq)` | elements joined by `sep` |
//! | `add(a, b)` / `sub(a, b)` / `mul(a, b)` | integer arithmetic |
//! | `url_path_escape(s)` | percent-escaped path segment |

use std::{
    collections::HashMap,
    fmt::Write as _,
    sync::{
        Arc, Mutex, OnceLock, PoisonError, Weak,
        atomic::{AtomicUsize, Ordering},
    },
};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use quire_core::frontmatter::parse_timestamp;
use quire_parser::html_escape;
use tera::{Context, Function, Tera, Value};
use thiserror::Error;
use tracing::debug;

use crate::layout::LayoutRegistry;

/// Nested `include` calls allowed before a render is aborted.
const MAX_INCLUDE_DEPTH: usize = 32;

/// Characters left alone by `url_path_escape`.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b',')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'@');

/// Template errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to compile templates: {0}")]
    Compile(String),

    #[error("template not found: {0}")]
    NotFound(String),

    #[error("failed to render `{name}`: {message}")]
    Render { name: String, message: String },
}

pub type Result<T> = std::result::Result<T, TemplateError>;

/// Data of the render in progress, read by `include`.
#[derive(Debug, Clone, Default)]
struct RenderFrame(Arc<Mutex<Option<Context>>>);

impl RenderFrame {
    fn set(&self, context: Option<Context>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = context;
    }

    fn current(&self) -> Option<Context> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Compiled template set.
#[derive(Debug)]
pub struct TemplateEngine {
    tera: Arc<Tera>,
    frame: RenderFrame,
    render_lock: Mutex<()>,
}

impl TemplateEngine {
    /// Compile every registered layout and include.
    pub fn new(layouts: &LayoutRegistry) -> Result<Self> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![""]);

        let frame = RenderFrame::default();
        let slot: Arc<OnceLock<Weak<Tera>>> = Arc::new(OnceLock::new());

        tera.register_function(
            "include",
            IncludeFn {
                tera: Arc::clone(&slot),
                frame: frame.clone(),
                depth: Arc::new(AtomicUsize::new(0)),
            },
        );
        register_helpers(&mut tera);

        tera.add_raw_templates(layouts.iter().map(|layout| (layout.name.as_str(), layout.text.as_str())))
            .map_err(|e| TemplateError::Compile(error_chain(&e)))?;
        debug!(count = layouts.len(), "compiled templates");

        let tera = Arc::new(tera);
        // The slot is fresh, so this cannot already be set.
        let _ = slot.set(Arc::downgrade(&tera));

        Ok(Self {
            tera,
            frame,
            render_lock: Mutex::new(()),
        })
    }

    /// Whether a template named `name` exists.
    pub fn has(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    /// Render `name` against `context`.
    ///
    /// Renders are serialized; `context` is visible to `include` for the
    /// duration of the call.
    pub fn render(&self, name: &str, context: &Context) -> Result<String> {
        if !self.has(name) {
            return Err(TemplateError::NotFound(name.to_string()));
        }

        let _guard = self.render_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.frame.set(Some(context.clone()));
        let result = self.tera.render(name, context);
        self.frame.set(None);

        result.map_err(|e| TemplateError::Render {
            name: name.to_string(),
            message: error_chain(&e),
        })
    }
}

/// Flatten a Tera error and its causes into one line.
fn error_chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        let _ = write!(message, ": {cause}");
        source = cause.source();
    }
    message
}

struct IncludeFn {
    tera: Arc<OnceLock<Weak<Tera>>>,
    frame: RenderFrame,
    depth: Arc<AtomicUsize>,
}

impl Function for IncludeFn {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let name = str_arg(args, "include", "name")?;
        let tera = self
            .tera
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| tera::Error::msg("include: templates are not compiled yet"))?;
        let context = self
            .frame
            .current()
            .ok_or_else(|| tera::Error::msg("include: called outside of a render"))?;

        let depth = self.depth.fetch_add(1, Ordering::SeqCst);
        let result = if depth >= MAX_INCLUDE_DEPTH {
            Err(tera::Error::msg(format!(
                "include: nesting deeper than {MAX_INCLUDE_DEPTH} while including `{name}`"
            )))
        } else {
            tera.render(name, &context)
        };
        self.depth.fetch_sub(1, Ordering::SeqCst);

        result.map(Value::String)
    }

    fn is_safe(&self) -> bool {
        true
    }
}

/// Returns its input unescaped.
struct SafeFn;

impl Function for SafeFn {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        Ok(Value::String(str_arg(args, "safe", "s")?.to_string()))
    }

    fn is_safe(&self) -> bool {
        true
    }
}

/// Escapes its input once; the result is not escaped again.
struct EscapeFn;

impl Function for EscapeFn {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        Ok(Value::String(html_escape(str_arg(args, "escape", "s")?)))
    }

    fn is_safe(&self) -> bool {
        true
    }
}

fn register_helpers(tera: &mut Tera) {
    tera.register_function("safe", SafeFn);
    tera.register_function("escape", EscapeFn);
    tera.register_function("date", date);
    tera.register_function("strip", |args: &HashMap<String, Value>| {
        Ok(Value::String(str_arg(args, "strip", "s")?.trim().to_string()))
    });
    tera.register_function("truncate", truncate);
    tera.register_function("first", first);
    tera.register_function("join", join);
    tera.register_function("add", |args: &HashMap<String, Value>| {
        arithmetic(args, "add", i64::checked_add)
    });
    tera.register_function("sub", |args: &HashMap<String, Value>| {
        arithmetic(args, "sub", i64::checked_sub)
    });
    tera.register_function("mul", |args: &HashMap<String, Value>| {
        arithmetic(args, "mul", i64::checked_mul)
    });
    tera.register_function("url_path_escape", |args: &HashMap<String, Value>| {
        let s = str_arg(args, "url_path_escape", "s")?;
        Ok(Value::String(utf8_percent_encode(s, PATH_SEGMENT).to_string()))
    });
}

fn str_arg<'a>(args: &'a HashMap<String, Value>, function: &str, key: &str) -> tera::Result<&'a str> {
    match args.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(tera::Error::msg(format!(
            "{function}: `{key}` must be a string, got {other}"
        ))),
        None => Err(tera::Error::msg(format!("{function}: missing `{key}` argument"))),
    }
}

fn int_arg(args: &HashMap<String, Value>, function: &str, key: &str) -> tera::Result<i64> {
    args.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| tera::Error::msg(format!("{function}: `{key}` must be an integer")))
}

fn seq_arg<'a>(args: &'a HashMap<String, Value>, function: &str) -> tera::Result<&'a [Value]> {
    match args.get("seq") {
        Some(Value::Array(items)) => Ok(items),
        Some(Value::Null) => Ok(&[]),
        _ => Err(tera::Error::msg(format!("{function}: `seq` must be a sequence"))),
    }
}

fn date(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let format = str_arg(args, "date", "format")?;
    let Some(at) = args.get("value").and_then(Value::as_str).and_then(parse_timestamp) else {
        return Ok(Value::String(String::new()));
    };
    let mut out = String::new();
    if write!(out, "{}", at.format(format)).is_err() {
        return Err(tera::Error::msg(format!("date: invalid format `{format}`")));
    }
    Ok(Value::String(out))
}

fn truncate(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let s = str_arg(args, "truncate", "s")?;
    let n = usize::try_from(int_arg(args, "truncate", "n")?).unwrap_or(0);
    if s.chars().count() <= n {
        return Ok(Value::String(s.to_string()));
    }
    let mut out: String = s.chars().take(n).collect();
    out.push_str("...");
    Ok(Value::String(out))
}

fn first(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let n = usize::try_from(int_arg(args, "first", "n")?).unwrap_or(0);
    let items = seq_arg(args, "first")?;
    Ok(Value::Array(items.iter().take(n).cloned().collect()))
}

fn join(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let sep = str_arg(args, "join", "sep")?;
    let parts: Vec<String> = seq_arg(args, "join")?
        .iter()
        .map(|item| match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    Ok(Value::String(parts.join(sep)))
}

fn arithmetic(
    args: &HashMap<String, Value>,
    function: &str,
    op: fn(i64, i64) -> Option<i64>,
) -> tera::Result<Value> {
    let a = int_arg(args, function, "a")?;
    let b = int_arg(args, function, "b")?;
    op(a, b)
        .map(Value::from)
        .ok_or_else(|| tera::Error::msg(format!("{function}: integer overflow")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::layout::LayoutKind;

    fn engine(templates: &[(&str, &str)]) -> TemplateEngine {
        let mut layouts = LayoutRegistry::new();
        for (name, text) in templates {
            layouts
                .define(*name, *text, LayoutKind::Layout, format!("{name}.html"))
                .expect("define");
        }
        TemplateEngine::new(&layouts).expect("compile")
    }

    fn render(templates: &[(&str, &str)], context: &Context) -> String {
        engine(templates).render(templates[0].0, context).expect("render")
    }

    fn site_context() -> Context {
        let mut context = Context::new();
        context.insert("site", &json!({ "title": "Blog <1>" }));
        context.insert("content", "<p>Body</p>");
        context
    }

    #[test]
    fn test_content_and_autoescape() {
        let html = render(
            &[("default", "<h1>{{ site.title }}</h1>{{ content | safe }}")],
            &site_context(),
        );
        assert_eq!(html, "<h1>Blog &lt;1&gt;</h1><p>Body</p>");
    }

    #[test]
    fn test_include_sees_current_context() {
        let html = render(
            &[
                ("post", "{{ include(name=\"header\") }}|{{ content | safe }}"),
                ("header", "<header>{{ site.title }}</header>"),
            ],
            &site_context(),
        );
        assert_eq!(html, "<header>Blog &lt;1&gt;</header>|<p>Body</p>");
    }

    #[test]
    fn test_native_include_tag() {
        let html = render(
            &[
                ("page", "{% include \"footer\" %}"),
                ("footer", "<footer>{{ site.title | upper }}</footer>"),
            ],
            &site_context(),
        );
        assert_eq!(html, "<footer>BLOG &lt;1&gt;</footer>");
    }

    #[test]
    fn test_include_cycle_is_an_error() {
        let engine = engine(&[("loop", "{{ include(name=\"loop\") }}")]);
        let err = engine.render("loop", &Context::new()).unwrap_err();
        assert!(err.to_string().contains("nesting deeper"));
    }

    #[test]
    fn test_unknown_template() {
        let engine = engine(&[("default", "x")]);
        assert!(matches!(
            engine.render("missing", &Context::new()),
            Err(TemplateError::NotFound(_))
        ));
    }

    #[test]
    fn test_compile_error() {
        let mut layouts = LayoutRegistry::new();
        layouts
            .define("broken", "{% if %}", LayoutKind::Layout, "broken.html")
            .expect("define");
        assert!(matches!(
            TemplateEngine::new(&layouts),
            Err(TemplateError::Compile(_))
        ));
    }

    #[test]
    fn test_date_helper() {
        let mut context = Context::new();
        context.insert("when", "2024-01-15T09:30:00+08:00");
        context.insert("junk", "not a date");
        let html = render(
            &[(
                "d",
                "{{ date(format=\"%Y年%m月%d日\", value=when) }}|{{ date(format=\"%Y\", value=junk) }}",
            )],
            &context,
        );
        assert_eq!(html, "2024年01月15日|");
    }

    #[test]
    fn test_string_helpers() {
        let mut context = Context::new();
        context.insert("raw", "<b>bold</b>");
        context.insert("padded", "  hi  ");
        context.insert("long", "abcdefgh");
        let html = render(
            &[(
                "s",
                "{{ escape(s=raw) }}|{{ safe(s=raw) }}|{{ strip(s=padded) }}|{{ truncate(s=long, n=3) }}|{{ truncate(s=long, n=20) }}",
            )],
            &context,
        );
        assert_eq!(html, "&lt;b&gt;bold&lt;/b&gt;|<b>bold</b>|hi|abc...|abcdefgh");
    }

    #[test]
    fn test_sequence_helpers() {
        let mut context = Context::new();
        context.insert("tags", &vec!["rust", "web", "cli"]);
        let html = render(
            &[(
                "q",
                "{% set two = first(n=2, seq=tags) %}{% set all = first(n=10, seq=tags) %}{{ join(sep=\", \", seq=two) }}|{{ all | length }}",
            )],
            &context,
        );
        assert_eq!(html, "rust, web|3");
    }

    #[test]
    fn test_arithmetic_and_escape_path() {
        let html = render(
            &[(
                "m",
                "{{ add(a=2, b=3) }} {{ sub(a=2, b=3) }} {{ mul(a=4, b=5) }} {{ url_path_escape(s=\"a b/c\") }}",
            )],
            &Context::new(),
        );
        assert_eq!(html, "5 -1 20 a%20b%2Fc");
    }
}
