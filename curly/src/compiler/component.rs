use std::ops::Range;

use crate::contract::{Contract, Operation};
use crate::error::CompileError;
use crate::parser::ParsedReference;
use crate::template::Call;

/// Validate a plain `{{component}}` reference against `contract`.
pub fn compile_component(
    contract: &Contract,
    reference: &ParsedReference,
    span: Range<usize>,
) -> Result<Call, CompileError> {
    validate(contract, reference, &span)?;
    Ok(to_call(reference, span))
}

/// Validate the opening tag of a `{{#…}}` or `{{^…}}` block. The call's
/// result is tested for truthiness at render time.
pub fn compile_conditional(
    contract: &Contract,
    reference: &ParsedReference,
    span: Range<usize>,
) -> Result<Call, CompileError> {
    validate(contract, reference, &span)?;
    Ok(to_call(reference, span))
}

/// Validate the opening tag of a `{{*…}}` block. The operation must be
/// declared as returning a collection.
pub fn compile_collection(
    contract: &Contract,
    reference: &ParsedReference,
    span: Range<usize>,
) -> Result<Call, CompileError> {
    let operation = validate(contract, reference, &span)?;
    if !operation.is_collection() {
        return Err(CompileError::invalid_component(
            reference.name(),
            format!("`{}` does not return a collection", reference.method),
            span,
        ));
    }
    Ok(to_call(reference, span))
}

fn validate<'c>(
    contract: &'c Contract,
    reference: &ParsedReference,
    span: &Range<usize>,
) -> Result<&'c Operation, CompileError> {
    let invalid = |reason: String| {
        CompileError::invalid_component(reference.name(), reason, span.clone())
    };

    let Some(operation) = contract.operation(&reference.method) else {
        return Err(invalid(format!(
            "presenter `{}` has no component `{}`",
            contract.name(),
            reference.method
        )));
    };

    if operation.positional_params().len() > 1 {
        return Err(invalid(format!(
            "wrong arity: `{}` takes {} positional arguments, components take at most one",
            reference.method,
            operation.positional_params().len()
        )));
    }

    match (&reference.identifier, operation.accepts_identifier()) {
        (None, true) if !operation.identifier_has_default() => {
            return Err(invalid(format!(
                "missing identifier: `{}` requires one, e.g. `{}.name`",
                reference.method, reference.method
            )));
        }
        (Some(identifier), false) => {
            return Err(invalid(format!(
                "unexpected identifier `{}`: `{}` does not take one",
                identifier, reference.method
            )));
        }
        _ => {}
    }

    if let Some(attribute) = reference
        .attributes
        .keys()
        .find(|key| !operation.accepts_keyword(key))
    {
        return Err(CompileError::InvalidAttribute {
            reference: reference.name(),
            attribute: attribute.clone(),
            span: span.clone(),
        });
    }

    if let Some(attribute) = operation
        .required_keywords()
        .iter()
        .find(|keyword| !reference.attributes.contains_key(keyword.as_str()))
    {
        return Err(CompileError::MissingAttribute {
            reference: reference.name(),
            attribute: attribute.clone(),
            span: span.clone(),
        });
    }

    Ok(operation)
}

fn to_call(reference: &ParsedReference, span: Range<usize>) -> Call {
    Call {
        method: reference.method.clone(),
        identifier: reference.identifier.clone(),
        attributes: reference.attributes.clone(),
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Param;
    use crate::error::CompileErrorKind;
    use crate::parser::parse_reference;

    fn contract() -> Contract {
        Contract::new("seasons")
            .with(Operation::new("title"))
            .with(Operation::new("i18n").identifier())
            .with(Operation::new("avatar").optional_identifier().optional_keyword("size"))
            .with(Operation::new("season?").keyword("name"))
            .with(
                Operation::new("between")
                    .positional(Param::Required)
                    .positional(Param::Required),
            )
            .with(Operation::new("months").collection())
    }

    fn component(raw: &str) -> Result<Call, CompileError> {
        let reference = parse_reference(raw, 0..raw.len()).unwrap();
        compile_component(&contract(), &reference, 0..raw.len())
    }

    fn kind_of(raw: &str) -> CompileErrorKind {
        component(raw).unwrap_err().kind()
    }

    #[test]
    fn valid_references_produce_calls() {
        let call = component("title").unwrap();
        assert_eq!(call.method, "title");

        let call = component("i18n.home.welcome").unwrap();
        assert_eq!(call.identifier.as_deref(), Some("home.welcome"));

        let call = component("season? name=summer").unwrap();
        assert_eq!(call.attributes["name"], "summer");
        assert_eq!(call.span, 0..19);
    }

    #[test]
    fn unknown_methods_are_invalid() {
        assert_eq!(kind_of("subtitle"), CompileErrorKind::InvalidComponent);
    }

    #[test]
    fn identifier_rules() {
        assert!(component("i18n").unwrap_err().to_string().contains("missing identifier"));
        assert!(component("title.main").unwrap_err().to_string().contains("unexpected identifier"));
        assert!(component("avatar").is_ok());
        assert!(component("avatar.large").is_ok());
    }

    #[test]
    fn more_than_one_positional_is_never_a_component() {
        let err = component("between.a").unwrap_err();
        assert_eq!(err.kind(), CompileErrorKind::InvalidComponent);
        assert!(err.to_string().contains("wrong arity"));
    }

    #[test]
    fn attribute_rules() {
        assert_eq!(kind_of("season? name=summer extreme=true"), CompileErrorKind::InvalidAttribute);
        assert_eq!(kind_of("season?"), CompileErrorKind::MissingAttribute);
        assert_eq!(kind_of("title size=large"), CompileErrorKind::InvalidAttribute);
        assert!(component("avatar size=large").is_ok());
    }

    #[test]
    fn unknown_attributes_are_reported_before_missing_ones() {
        let err = component("season? extreme=true").unwrap_err();
        assert_eq!(
            err,
            CompileError::InvalidAttribute {
                reference: "season?".to_string(),
                attribute: "extreme".to_string(),
                span: 0..20,
            }
        );
    }

    #[test]
    fn conditionals_validate_like_components() {
        let reference = parse_reference("season? name=winter", 0..0).unwrap();
        assert!(compile_conditional(&contract(), &reference, 0..0).is_ok());
        let reference = parse_reference("season?", 0..0).unwrap();
        assert_eq!(
            compile_conditional(&contract(), &reference, 0..0).unwrap_err().kind(),
            CompileErrorKind::MissingAttribute
        );
    }

    #[test]
    fn collections_must_be_declared() {
        let months = parse_reference("months", 0..0).unwrap();
        assert!(compile_collection(&contract(), &months, 0..0).is_ok());
        let title = parse_reference("title", 0..0).unwrap();
        let err = compile_collection(&contract(), &title, 0..0).unwrap_err();
        assert_eq!(err.kind(), CompileErrorKind::InvalidComponent);
        assert!(err.to_string().contains("does not return a collection"));
    }
}
