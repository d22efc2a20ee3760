//! Reading payloads out of the script bodies returned by callback-style
//! endpoints.
//!
//! The sources never return bare JSON. They return a script that either
//! invokes a callback (`jsonpgz({...});`) or assigns globals
//! (`var Data_netWorthTrend = [...];`, `v_s_sh600519="1~...";`). The script is
//! never executed; the payload expression is located with a small scanner
//! that skips over string literals and nested brackets.

use regex::Regex;
use serde::de::DeserializeOwned;

#[derive(Debug, Clone)]
pub struct Script {
    source: String,
}

impl Script {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Argument text of the first `name(...)` invocation.
    pub fn call_argument(&self, name: &str) -> Option<&str> {
        let pattern = format!(r"(?:^|[^\w$.]){}\s*\(", regex::escape(name));
        let re = Regex::new(&pattern).ok()?;
        let open = re.find(&self.source)?.end();
        let len = scan_balanced(&self.source[open..], b')')?;
        Some(self.source[open..open + len].trim())
    }

    /// Right-hand side of the first `var name = ...;` or `name = ...;`.
    pub fn global(&self, name: &str) -> Option<&str> {
        let pattern = format!(
            r"(?:^|[;\s,{{}}])(?:(?:var|let|const)\s+)?{}\s*=\s*",
            regex::escape(name)
        );
        let re = Regex::new(&pattern).ok()?;
        let start = re.find(&self.source)?.end();
        let rest = &self.source[start..];
        let len = scan_expression(rest);
        let expr = rest[..len].trim();
        (!expr.is_empty()).then_some(expr)
    }

    /// A global holding a string literal, unquoted.
    pub fn global_string(&self, name: &str) -> Option<String> {
        unquote(self.global(name)?)
    }

    /// A global holding a JSON-compatible literal.
    pub fn global_json<T: DeserializeOwned>(&self, name: &str) -> Result<T, String> {
        let expr = self
            .global(name)
            .ok_or_else(|| format!("{name} is not assigned"))?;
        serde_json::from_str(expr).map_err(|e| format!("{name} is not valid JSON: {e}"))
    }

    /// A string-valued property inside the object literal assigned to
    /// `global`, e.g. `content` in `var apidata={ content:"...", ... };`.
    ///
    /// Works on literals with unquoted keys, which are not JSON.
    pub fn object_string_property(&self, global: &str, property: &str) -> Option<String> {
        let object = self.global(global)?;
        let pattern = format!(
            r#"(?:^|[{{,\s])["']?{}["']?\s*:\s*"#,
            regex::escape(property)
        );
        let re = Regex::new(&pattern).ok()?;
        let start = re.find(object)?.end();
        let rest = &object[start..];
        let len = scan_expression_until(rest, &[b',', b'}']);
        unquote(rest[..len].trim())
    }
}

/// Length of `text` up to (not including) the unmatched `close` byte.
fn scan_balanced(text: &str, close: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => i = skip_string(bytes, i)?,
            b'(' | b'[' | b'{' => depth += 1,
            c @ (b')' | b']' | b'}') => {
                if depth == 0 {
                    return (c == close).then_some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Length of the expression at the start of `text`, ending at a top-level
/// `;`, newline or end of input.
fn scan_expression(text: &str) -> usize {
    scan_expression_until(text, &[b';', b'\n'])
}

fn scan_expression_until(text: &str, terminators: &[u8]) -> usize {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'"' | b'\'' => match skip_string(bytes, i) {
                Some(end) => i = end,
                None => return bytes.len(),
            },
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' if depth > 0 => depth -= 1,
            _ if depth == 0 && terminators.contains(&c) => return i,
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Index of the closing quote of the string literal opening at `start`.
fn skip_string(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            c if c == quote => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Decodes a single- or double-quoted string literal.
fn unquote(expr: &str) -> Option<String> {
    let expr = expr.trim();
    let quote = expr.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    if expr.len() < 2 || !expr.ends_with(quote) {
        return None;
    }
    let body = &expr[1..expr.len() - 1];

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if let Some(decoded) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)
                {
                    out.push(decoded);
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Some(out)
}
