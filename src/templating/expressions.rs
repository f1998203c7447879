//! Field reference rewriting inside free-text expressions.
//!
//! Expression snippets (attribute expressions, label expressions, popup text,
//! SQL filters) reference fields through several syntaxes:
//!
//! | Syntax | Example |
//! |---|---|
//! | [`Syntax::Dotted`] | `$feature.NAME` |
//! | [`Syntax::Bracket`] | `$feature["NAME"]`, `$feature['NAME']`, `$feature[NAME]` |
//! | [`Syntax::JoinedTable`] | `$feature["TABLE.NAME"]` |
//! | [`Syntax::QuotedList`] | `["NAME", "OTHER"]` |
//! | [`Syntax::Curly`] | `{NAME}` |
//! | [`Syntax::Square`] | `[NAME]` |
//!
//! Each candidate field is tested in the caller's order against each syntax.
//! A pattern only matches the whole name: the characters on both sides of the
//! name are part of the pattern, so `EMP_CY` never matches inside `EMP_CY2`.
//! The surrounding characters are captured and written back; only the name is
//! replaced. Placeholders never satisfy these patterns again, so rewriting an
//! already rewritten expression is a no-op.
//!
//! The heuristics are regex based and do not tokenize the expression
//! language. Names that collide with keywords or appear inside string
//! literals are rewritten as well.

use regex::{Captures, Regex};
use std::borrow::Cow;

use super::{PLACEHOLDER_CLOSE, templatize_name};

/// A field reference syntax recognised inside expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// `$feature.NAME`
    Dotted,
    /// `$feature["NAME"]` with optional single or double quotes
    Bracket,
    /// `$feature["TABLE.NAME"]`
    JoinedTable,
    /// `"NAME"` as a member of an array literal
    QuotedList,
    /// `{NAME}`
    Curly,
    /// `[NAME]`
    Square,
}

impl Syntax {
    /// Every syntax, in the order attribute expressions are rewritten.
    pub const EXPRESSION: [Syntax; 6] = [
        Syntax::Dotted,
        Syntax::Bracket,
        Syntax::JoinedTable,
        Syntax::QuotedList,
        Syntax::Curly,
        Syntax::Square,
    ];

    /// Regex with group 1 before and group 2 after the escaped field name.
    fn pattern(self, escaped: &str) -> String {
        match self {
            Syntax::Dotted => format!(r"(?i)(\$feature\.){escaped}(\W|$)"),
            Syntax::Bracket => format!(r#"(?i)(\$feature\[\s*["']?){escaped}(["']?\s*\])"#),
            Syntax::JoinedTable => {
                format!(r#"(?i)(\$feature\[\s*["'][^"'\[\]]*\.){escaped}(["']\s*\])"#)
            }
            Syntax::QuotedList => format!(r#"(?i)([\[,]\s*["']){escaped}(["']\s*[,\]])"#),
            Syntax::Curly => format!(r"(?i)(\{{){escaped}(\}})"),
            Syntax::Square => format!(r"(?i)(\[){escaped}(\])"),
        }
    }

    /// Whether consecutive matches can share a delimiter and need another pass.
    fn overlapping(self) -> bool {
        matches!(self, Syntax::QuotedList)
    }
}

/// Rewrite field references using the given syntaxes.
pub fn templatize_with(
    text: &str,
    base_path: &str,
    field_names: &[String],
    syntaxes: &[Syntax],
) -> String {
    let mut out = text.to_string();
    for name in field_names {
        if name.is_empty() {
            continue;
        }
        let token = templatize_name(base_path, name);
        let escaped = regex::escape(name);
        for syntax in syntaxes {
            let re = match Regex::new(&syntax.pattern(&escaped)) {
                Ok(re) => re,
                Err(e) => {
                    tracing::debug!("Skipping field '{}' for {:?}: {}", name, syntax, e);
                    continue;
                }
            };
            out = replace_keeping_delimiters(&re, out, &token, syntax.overlapping());
        }
    }
    out
}

fn replace_keeping_delimiters(re: &Regex, text: String, token: &str, repeat: bool) -> String {
    let mut current = text;
    loop {
        let replaced = re.replace_all(&current, |caps: &Captures| {
            format!("{}{}{}", &caps[1], token, &caps[2])
        });
        match replaced {
            Cow::Borrowed(_) => return current,
            Cow::Owned(next) => {
                if !repeat {
                    return next;
                }
                current = next;
            }
        }
    }
}

/// Rewrite an attribute expression with every supported syntax.
///
/// ```rust
/// use solution_deployer::templating::expressions::templatize_expression;
///
/// let fields = vec!["POP".to_string()];
/// let out = templatize_expression("$feature.POP * 2", "abc.fieldInfos.layer0.fields", &fields);
/// assert_eq!(out, "$feature.{{abc.fieldInfos.layer0.fields.pop}} * 2");
/// ```
pub fn templatize_expression(text: &str, base_path: &str, field_names: &[String]) -> String {
    templatize_with(text, base_path, field_names, &Syntax::EXPRESSION)
}

/// Rewrite `{NAME}` interpolations (popup titles, descriptions, label values).
pub fn templatize_curly(text: &str, base_path: &str, field_names: &[String]) -> String {
    templatize_with(text, base_path, field_names, &[Syntax::Curly])
}

/// Rewrite `[NAME]` references (label and rotation expressions).
pub fn templatize_square(text: &str, base_path: &str, field_names: &[String]) -> String {
    templatize_with(text, base_path, field_names, &[Syntax::Square])
}

/// Rewrite bare field names in a SQL-like filter.
///
/// A name matches as a whole word, case-insensitively, unless it is directly
/// followed by `.` or by the placeholder close token; both exceptions keep
/// segments of existing placeholders (owner id, `fieldInfos`, the leaf) from
/// being rewritten a second time.
pub fn templatize_simple_names(text: &str, base_path: &str, field_names: &[String]) -> String {
    let mut out = text.to_string();
    for name in field_names {
        if name.is_empty() {
            continue;
        }
        let re = match Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name))) {
            Ok(re) => re,
            Err(e) => {
                tracing::debug!("Skipping field '{}' in filter: {}", name, e);
                continue;
            }
        };
        let token = templatize_name(base_path, name);
        let mut result = String::with_capacity(out.len());
        let mut last = 0;
        for m in re.find_iter(&out) {
            let rest = &out[m.end()..];
            if rest.starts_with('.') || rest.starts_with(PLACEHOLDER_CLOSE) {
                continue;
            }
            result.push_str(&out[last..m.start()]);
            result.push_str(&token);
            last = m.end();
        }
        result.push_str(&out[last..]);
        out = result;
    }
    out
}
