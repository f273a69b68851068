use std::ops::Range;

use indexmap::IndexMap;

use crate::error::CompileError;

/// Attribute name to value, in the order written in the reference.
pub type Attributes = IndexMap<String, String>;

/// Parse the attribute portion of a reference: `key=value key2="quoted value"`.
///
/// Quoted values run to the next `"`; there are no escape sequences.
/// `span` is the span of the enclosing tag and is attached to any error.
pub fn parse_attributes(text: Option<&str>, span: Range<usize>) -> Result<Attributes, CompileError> {
    let mut attributes = Attributes::new();
    let Some(text) = text else {
        return Ok(attributes);
    };

    let mut rest = text.trim_start();
    while !rest.is_empty() {
        let key_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let key = &rest[..key_end];
        rest = &rest[key_end..];

        if key.is_empty() {
            return Err(CompileError::syntax(
                "attribute value without a name",
                span,
            ));
        }
        let Some(after_eq) = rest.strip_prefix('=') else {
            return Err(CompileError::syntax(
                format!("attribute `{}` has no value (expected `{}=value`)", key, key),
                span,
            ));
        };

        let (value, remainder) = if let Some(quoted) = after_eq.strip_prefix('"') {
            let Some(close) = quoted.find('"') else {
                return Err(CompileError::syntax(
                    format!("unterminated quoted value for attribute `{}`", key),
                    span,
                ));
            };
            let remainder = &quoted[close + 1..];
            if remainder.starts_with(|c: char| !c.is_whitespace()) {
                return Err(CompileError::syntax(
                    format!("expected whitespace after the value of attribute `{}`", key),
                    span,
                ));
            }
            (&quoted[..close], remainder)
        } else {
            let end = after_eq
                .find(char::is_whitespace)
                .unwrap_or(after_eq.len());
            (&after_eq[..end], &after_eq[end..])
        };

        if attributes.contains_key(key) {
            return Err(CompileError::syntax(
                format!("duplicate attribute `{}`", key),
                span,
            ));
        }
        attributes.insert(key.to_string(), value.to_string());
        rest = remainder.trim_start();
    }

    Ok(attributes)
}
