//! Template substitution for action inputs
//!
//! Templates are plain text with `{{ ... }}` actions. An action is a
//! pipeline of commands separated by `|`; the result of each command is
//! appended as the last argument of the next one. A command is either a
//! single operand or a helper function followed by operands.
//!
//! Operands:
//! - `.` followed by a dotted path, e.g. `.args.name` or `.vars.sha`
//! - a `"double quoted"` or `` `raw` `` string literal
//! - a bare number
//!
//! A path that runs off the end of the data renders as the empty string.
//! `{{- ` trims whitespace before the action and ` -}}` trims whitespace
//! after it. Parenthesised sub-pipelines are not supported.

use crate::error::{TemplateError, TemplateResult};
use regex::Regex;
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::sync::LazyLock;

// `}}` inside a quoted or raw string does not close the action
static ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)\{\{((?:"(?:[^"\\]|\\.)*"|`[^`]*`|[^"`])*?)\}\}"#)
        .expect("action pattern is valid")
});

/// Data a template is rendered against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// An empty map
    pub fn map() -> Self {
        Value::Map(BTreeMap::new())
    }

    /// Insert a key, turning a text value into a map first
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        if let Value::Text(_) = self {
            *self = Value::map();
        }
        if let Value::Map(map) = self {
            map.insert(key.into(), value.into());
        }
    }

    /// Look up a key of a map value
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            Value::Text(_) => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Render a template against `data`
pub fn render(template: &str, data: &Value) -> TemplateResult<String> {
    let mut output = String::with_capacity(template.len());
    let mut last = 0;
    let mut trim_next = false;

    for caps in ACTION.captures_iter(template) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let (body, trim_before, trim_after) = trim_markers(body.as_str());

        let mut text = &template[last..whole.start()];
        if trim_next {
            text = text.trim_start();
        }
        if trim_before {
            text = text.trim_end();
        }
        output.push_str(text);
        output.push_str(&evaluate(body, data, template)?);

        trim_next = trim_after;
        last = whole.end();
    }

    let mut rest = &template[last..];
    if rest.contains("{{") {
        return Err(syntax(template, "unclosed action"));
    }
    if trim_next {
        rest = rest.trim_start();
    }
    output.push_str(rest);
    Ok(output)
}

/// Render every value of a map
pub fn render_map<'a, I>(entries: I, data: &Value) -> TemplateResult<BTreeMap<String, String>>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    entries
        .into_iter()
        .map(|(key, value)| Ok((key.clone(), render(value, data)?)))
        .collect()
}

/// Strip `- ` / ` -` trim markers from an action body
///
/// A dash needs whitespace on its inner side, so `{{-3}}` is the number -3.
fn trim_markers(body: &str) -> (&str, bool, bool) {
    let (body, before) = match body.strip_prefix('-') {
        Some(rest) if rest.starts_with(char::is_whitespace) => (rest, true),
        _ => (body, false),
    };
    let (body, after) = match body.strip_suffix('-') {
        Some(rest) if rest.ends_with(char::is_whitespace) => (rest, true),
        _ => (body, false),
    };
    (body, before, after)
}

fn syntax(template: &str, reason: impl Into<String>) -> TemplateError {
    TemplateError::Syntax {
        template: template.to_string(),
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Path(Vec<String>),
    Literal(String),
    Ident(String),
    Pipe,
}

fn evaluate(body: &str, data: &Value, template: &str) -> TemplateResult<String> {
    let tokens = lex(body, template)?;
    if tokens.is_empty() {
        return Err(syntax(template, "empty action"));
    }

    let mut carried: Option<String> = None;
    for command in tokens.split(|t| *t == Token::Pipe) {
        let Some((head, rest)) = command.split_first() else {
            return Err(syntax(template, "missing command in pipeline"));
        };

        let value = match head {
            Token::Ident(name) => {
                let mut args = rest
                    .iter()
                    .map(|t| operand(t, data, template))
                    .collect::<TemplateResult<Vec<_>>>()?;
                args.extend(carried.take());
                call(name, args)?
            }
            operand_token => {
                if !rest.is_empty() {
                    return Err(syntax(template, "unexpected operand after value"));
                }
                if carried.is_some() {
                    return Err(syntax(template, "can only pipe into a function"));
                }
                operand(operand_token, data, template)?
            }
        };
        carried = Some(value);
    }

    Ok(carried.unwrap_or_default())
}

fn operand(token: &Token, data: &Value, template: &str) -> TemplateResult<String> {
    match token {
        Token::Literal(text) => Ok(text.clone()),
        Token::Path(path) => lookup(data, path),
        Token::Ident(name) => Err(syntax(
            template,
            format!("function '{}' cannot be used as an argument", name),
        )),
        Token::Pipe => Err(syntax(template, "unexpected '|'")),
    }
}

fn lookup(data: &Value, path: &[String]) -> TemplateResult<String> {
    let mut current = data;
    for (i, key) in path.iter().enumerate() {
        match current {
            Value::Map(map) => match map.get(key) {
                Some(next) => current = next,
                None => return Ok(String::new()),
            },
            Value::Text(_) => {
                return Err(TemplateError::NotAMap(format!(".{}", path[..i].join("."))));
            }
        }
    }

    match current {
        Value::Text(text) => Ok(text.clone()),
        Value::Map(_) => Err(TemplateError::NotText(format!(".{}", path.join(".")))),
    }
}

fn lex(body: &str, template: &str) -> TemplateResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = body.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some(other) => text.push(other),
                            None => return Err(syntax(template, "unterminated string")),
                        },
                        Some(other) => text.push(other),
                        None => return Err(syntax(template, "unterminated string")),
                    }
                }
                tokens.push(Token::Literal(text));
            }
            '`' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('`') => break,
                        Some(other) => text.push(other),
                        None => return Err(syntax(template, "unterminated raw string")),
                    }
                }
                tokens.push(Token::Literal(text));
            }
            '.' => {
                let word = take_word(&mut chars);
                let path: Vec<String> = word
                    .split('.')
                    .skip(1)
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string)
                    .collect();
                if word.len() > 1 && word.ends_with('.') {
                    return Err(syntax(template, format!("bad field path '{}'", word)));
                }
                tokens.push(Token::Path(path));
            }
            '(' | ')' => {
                return Err(syntax(
                    template,
                    "parenthesised pipelines are not supported",
                ));
            }
            c if c.is_ascii_digit() || c == '-' => {
                tokens.push(Token::Literal(take_word(&mut chars)));
            }
            c if c.is_alphabetic() || c == '_' => {
                tokens.push(Token::Ident(take_word(&mut chars)));
            }
            other => {
                return Err(syntax(template, format!("unexpected character '{}'", other)));
            }
        }
    }

    Ok(tokens)
}

fn take_word(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() || c == '|' || c == '"' || c == '`' {
            break;
        }
        word.push(c);
        chars.next();
    }
    word
}

fn arity(function: &str, args: &[String], expected: usize) -> TemplateResult<()> {
    if args.len() != expected {
        return Err(TemplateError::Arity {
            function: function.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

/// The fixed helper library
fn call(name: &str, args: Vec<String>) -> TemplateResult<String> {
    let expected = match name {
        "upper" | "lower" | "title" | "trim" | "quote" | "squote" | "base" | "dir" | "ext"
        | "env" => 1,
        "trimPrefix" | "trimSuffix" | "default" => 2,
        "replace" => 3,
        _ => return Err(TemplateError::UnknownFunction(name.to_string())),
    };
    arity(name, &args, expected)?;

    let mut args = args.into_iter();
    let mut next = || args.next().unwrap_or_default();
    Ok(match expected {
        1 => unary(name, next()),
        2 => {
            let (a, s) = (next(), next());
            match name {
                "trimPrefix" => s.strip_prefix(a.as_str()).unwrap_or(&s).to_string(),
                "trimSuffix" => s.strip_suffix(a.as_str()).unwrap_or(&s).to_string(),
                // default
                _ if s.is_empty() => a,
                _ => s,
            }
        }
        _ => {
            let (old, new, s) = (next(), next(), next());
            s.replace(&old, &new)
        }
    })
}

fn unary(name: &str, s: String) -> String {
    match name {
        "upper" => s.to_uppercase(),
        "lower" => s.to_lowercase(),
        "title" => title(&s),
        "trim" => s.trim().to_string(),
        "quote" => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        "squote" => format!("'{}'", s),
        "base" => Path::new(&s)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        "dir" => Path::new(&s)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| ".".to_string()),
        "ext" => Path::new(&s)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default(),
        "env" => env::var(&s).unwrap_or_default(),
        _ => s,
    }
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> Value {
        let mut data = Value::map();
        data.insert("os", "linux");
        data.insert(
            "args",
            [("name", "world"), ("path", "src/main.rs")]
                .into_iter()
                .collect::<Value>(),
        );
        data
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(render("no actions here", &data()).unwrap(), "no actions here");
    }

    #[test]
    fn test_simple_paths() {
        let result = render("hello {{.args.name}} on {{ .os }}", &data()).unwrap();
        assert_eq!(result, "hello world on linux");
    }

    #[test]
    fn test_missing_key_renders_empty() {
        assert_eq!(render("[{{.vars.a}}]", &data()).unwrap(), "[]");
        assert_eq!(render("[{{.args.nope}}]", &data()).unwrap(), "[]");
    }

    #[test]
    fn test_field_of_text_is_an_error() {
        let result = render("{{.os.family}}", &data());
        assert!(matches!(result, Err(TemplateError::NotAMap(_))));
    }

    #[test]
    fn test_map_is_not_text() {
        let result = render("{{.args}}", &data());
        assert!(matches!(result, Err(TemplateError::NotText(_))));
    }

    #[test]
    fn test_function_call() {
        assert_eq!(render("{{ upper .args.name }}", &data()).unwrap(), "WORLD");
        assert_eq!(render("{{ base .args.path }}", &data()).unwrap(), "main.rs");
        assert_eq!(render("{{ ext .args.path }}", &data()).unwrap(), ".rs");
        assert_eq!(render("{{ dir .args.path }}", &data()).unwrap(), "src");
    }

    #[test]
    fn test_pipeline() {
        let result = render(r#"{{ .args.name | replace "o" "0" | upper }}"#, &data()).unwrap();
        assert_eq!(result, "W0RLD");
    }

    #[test]
    fn test_default() {
        assert_eq!(
            render(r#"{{ .args.missing | default "fallback" }}"#, &data()).unwrap(),
            "fallback"
        );
        assert_eq!(
            render(r#"{{ .args.name | default "fallback" }}"#, &data()).unwrap(),
            "world"
        );
    }

    #[test]
    fn test_trim_helpers() {
        assert_eq!(
            render(r#"{{ trimSuffix ".rs" .args.path }}"#, &data()).unwrap(),
            "src/main"
        );
        assert_eq!(
            render(r#"{{ .args.path | trimPrefix "src/" }}"#, &data()).unwrap(),
            "main.rs"
        );
        assert_eq!(render(r#"{{ trim "  x  " }}"#, &data()).unwrap(), "x");
    }

    #[test]
    fn test_quote_and_title() {
        assert_eq!(render(r#"{{ quote "a\"b" }}"#, &data()).unwrap(), r#""a\"b""#);
        assert_eq!(render("{{ squote .os }}", &data()).unwrap(), "'linux'");
        assert_eq!(render(r#"{{ title "hello big world" }}"#, &data()).unwrap(), "Hello Big World");
    }

    #[test]
    fn test_raw_string_and_number() {
        assert_eq!(render("{{ `a|b` }}", &data()).unwrap(), "a|b");
        assert_eq!(render("{{ 42 }}", &data()).unwrap(), "42");
    }

    #[test]
    fn test_unknown_function() {
        let result = render("{{ shout .os }}", &data());
        assert!(matches!(result, Err(TemplateError::UnknownFunction(name)) if name == "shout"));
    }

    #[test]
    fn test_wrong_arity() {
        let result = render("{{ upper }}", &data());
        assert!(matches!(
            result,
            Err(TemplateError::Arity { expected: 1, got: 0, .. })
        ));
    }

    #[test]
    fn test_unclosed_action() {
        let result = render("echo {{ .os", &data());
        assert!(matches!(result, Err(TemplateError::Syntax { .. })));
    }

    #[test]
    fn test_empty_action() {
        let result = render("echo {{ }}", &data());
        assert!(matches!(result, Err(TemplateError::Syntax { .. })));
    }

    #[test]
    fn test_pipe_into_value() {
        let result = render("{{ .os | .os }}", &data());
        assert!(matches!(result, Err(TemplateError::Syntax { .. })));
    }

    #[test]
    fn test_braces_inside_string_literal() {
        assert_eq!(render(r#"{{ "}}" }}"#, &data()).unwrap(), "}}");
        assert_eq!(render("a{{ `x}}y` }}b", &data()).unwrap(), "ax}}yb");
    }

    #[test]
    fn test_trim_markers() {
        assert_eq!(render("a  {{- .os }}  b", &data()).unwrap(), "alinux  b");
        assert_eq!(render("a {{ .os -}}\n  b", &data()).unwrap(), "a linuxb");
        assert_eq!(render("x \n{{- .os -}} \ny", &data()).unwrap(), "xlinuxy");
    }

    #[test]
    fn test_dash_number_is_not_trim() {
        assert_eq!(render("a {{-3}} b", &data()).unwrap(), "a -3 b");
    }

    #[test]
    fn test_parenthesised_pipeline_rejected() {
        let result = render("{{ upper (.os) }}", &data());
        match result {
            Err(TemplateError::Syntax { reason, .. }) => {
                assert!(reason.contains("parenthesised"))
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_shell_braces_untouched() {
        let result = render("echo ${HOME} {a,b}", &data()).unwrap();
        assert_eq!(result, "echo ${HOME} {a,b}");
    }

    #[test]
    fn test_env_function() {
        std::env::set_var("RUNFILE_TEMPLATE_TEST", "yes");
        assert_eq!(
            render(r#"{{ env "RUNFILE_TEMPLATE_TEST" }}"#, &data()).unwrap(),
            "yes"
        );
        std::env::remove_var("RUNFILE_TEMPLATE_TEST");
    }
}
