use std::fmt;
use std::ops::Range;

use crate::error::CompileError;
use crate::parser::attributes::{Attributes, parse_attributes};

/// A component reference split into its parts: `method.identifier key=value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReference {
    pub method: String,
    /// Everything after the first `.` of the name, dots included.
    pub identifier: Option<String>,
    pub attributes: Attributes,
}

impl ParsedReference {
    /// The `method.identifier` part, as used to match block endings.
    pub fn name(&self) -> String {
        match &self.identifier {
            Some(identifier) => format!("{}.{}", self.method, identifier),
            None => self.method.clone(),
        }
    }

    pub fn same_name(&self, other: &ParsedReference) -> bool {
        self.method == other.method && self.identifier == other.identifier
    }
}

impl fmt::Display for ParsedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        for (key, value) in &self.attributes {
            if value.is_empty() || value.contains(char::is_whitespace) {
                write!(f, " {}=\"{}\"", key, value)?;
            } else {
                write!(f, " {}={}", key, value)?;
            }
        }
        Ok(())
    }
}

/// Split a raw reference into method, identifier and attributes.
pub fn parse_reference(raw: &str, span: Range<usize>) -> Result<ParsedReference, CompileError> {
    let raw = raw.trim();
    let (name, attribute_text) = match raw.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, Some(rest)),
        None => (raw, None),
    };

    let (method, identifier) = match name.split_once('.') {
        Some((method, identifier)) => (method, Some(identifier.to_string())),
        None => (name, None),
    };
    if method.is_empty() {
        return Err(CompileError::syntax(
            format!("missing component name in `{}`", raw),
            span,
        ));
    }

    Ok(ParsedReference {
        method: method.to_string(),
        identifier,
        attributes: parse_attributes(attribute_text, span)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileErrorKind;

    #[test]
    fn bare_method() {
        let reference = parse_reference("title", 0..5).unwrap();
        assert_eq!(reference.method, "title");
        assert_eq!(reference.identifier, None);
        assert!(reference.attributes.is_empty());
    }

    #[test]
    fn identifier_keeps_further_dots() {
        let reference = parse_reference("i18n.home.welcome", 0..0).unwrap();
        assert_eq!(reference.method, "i18n");
        assert_eq!(reference.identifier.as_deref(), Some("home.welcome"));
        assert!(reference.attributes.is_empty());
    }

    #[test]
    fn attributes_follow_the_first_whitespace() {
        let reference = parse_reference(r#"season?  name=summer  label="long days""#, 0..0).unwrap();
        assert_eq!(reference.method, "season?");
        assert_eq!(reference.attributes["name"], "summer");
        assert_eq!(reference.attributes["label"], "long days");
    }

    #[test]
    fn display_round_trips_through_the_parser() {
        let reference = parse_reference(r#"link.home title="Go home" rel=nofollow"#, 0..0).unwrap();
        assert_eq!(reference.to_string(), r#"link.home title="Go home" rel=nofollow"#);
    }

    #[test]
    fn empty_name_is_a_syntax_error() {
        for raw in ["", "   ", ".identifier"] {
            let err = parse_reference(raw, 3..7).unwrap_err();
            assert_eq!(err.kind(), CompileErrorKind::Syntax, "input: {:?}", raw);
            assert_eq!(err.span(), 3..7);
        }
    }

    #[test]
    fn attribute_errors_propagate() {
        let err = parse_reference("title size", 0..0).unwrap_err();
        assert_eq!(err.kind(), CompileErrorKind::Syntax);
    }
}
