//! Declarative presenters loaded from TOML.
//!
//! A manifest describes each presenter's components: the shape the
//! compiler validates against and the values the presenter returns.
//!
//! ```toml
//! [presenters."posts/show".components]
//! title = "Hello"
//! "season?" = { keywords = ["name"], cases = [{ attributes = { name = "summer" }, value = true }], value = false }
//! comments = { collection = true, value = [{ body = "first" }] }
//!
//! [presenters."posts/show/comment".components]
//! body = { binding = "comment.body" }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use curly::{Attributes, Contract, Operation};
use serde::Deserialize;
use thiserror::Error;

use crate::error::RenderError;
use crate::presenter::{Bindings, Presenter};
use crate::registry::PresenterRegistry;
use crate::value::Value;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid manifest: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    /// Initial bindings for top-level renders.
    #[serde(default)]
    pub bindings: BTreeMap<String, toml::Value>,

    /// Initial content slots.
    #[serde(default)]
    pub content: BTreeMap<String, String>,

    #[serde(default)]
    pub presenters: BTreeMap<String, PresenterSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresenterSpec {
    #[serde(default)]
    pub components: BTreeMap<String, ComponentSpec>,

    /// Fragment cache key returned by the presenter.
    #[serde(default)]
    pub cache_key: Option<String>,

    /// Fragment lifetime in seconds.
    #[serde(default)]
    pub cache_seconds: Option<u64>,
}

/// A component entry. Tables are always component descriptions, so a
/// misspelled key is an error; a fixed record goes under `value`.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "toml::Value")]
pub enum ComponentSpec {
    Detailed(DetailedComponent),
    /// A component that takes no arguments and always returns this value.
    Value(toml::Value),
}

impl TryFrom<toml::Value> for ComponentSpec {
    type Error = toml::de::Error;

    fn try_from(value: toml::Value) -> Result<Self, Self::Error> {
        match value {
            toml::Value::Table(_) => Ok(ComponentSpec::Detailed(value.try_into()?)),
            other => Ok(ComponentSpec::Value(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierSpec {
    Required,
    Optional,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetailedComponent {
    #[serde(default)]
    pub identifier: Option<IdentifierSpec>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub optional_keywords: Vec<String>,
    #[serde(default)]
    pub collection: bool,
    /// Returned when no case matches.
    #[serde(default)]
    pub value: Option<toml::Value>,
    #[serde(default)]
    pub cases: Vec<Case>,
    /// Return the binding at this dotted path instead of a fixed value.
    #[serde(default)]
    pub binding: Option<String>,
    /// Return the text of this content slot.
    #[serde(default)]
    pub content: Option<String>,
}

/// A value returned when the call's identifier and attributes match.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Case {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub value: toml::Value,
}

impl Case {
    fn matches(&self, identifier: Option<&str>, attributes: &Attributes) -> bool {
        self.identifier
            .as_deref()
            .is_none_or(|expected| identifier == Some(expected))
            && self
                .attributes
                .iter()
                .all(|(key, value)| attributes.get(key) == Some(value))
    }
}

impl Manifest {
    pub fn from_toml_str(source: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn bindings(&self) -> Bindings {
        let mut bindings: Bindings = self
            .bindings
            .iter()
            .map(|(name, value)| (name.clone(), to_value(value)))
            .collect();
        for (slot, text) in &self.content {
            bindings.set_content(slot.clone(), text.clone());
        }
        bindings
    }

    pub fn registry(&self) -> PresenterRegistry {
        let mut registry = PresenterRegistry::new();
        self.register_into(&mut registry);
        registry
    }

    pub fn register_into(&self, registry: &mut PresenterRegistry) {
        for (name, spec) in &self.presenters {
            let spec = Arc::new(spec.clone());
            let presenter_name = name.clone();
            registry.register(spec.contract(name), move |bindings: &Bindings| {
                Ok(Box::new(StaticPresenter {
                    name: presenter_name.clone(),
                    spec: Arc::clone(&spec),
                    bindings: bindings.clone(),
                }) as Box<dyn Presenter>)
            });
        }
    }
}

impl PresenterSpec {
    pub fn contract(&self, name: &str) -> Contract {
        let mut contract = Contract::new(name);
        for (method, component) in &self.components {
            let mut operation = Operation::new(method.as_str());
            if let ComponentSpec::Detailed(detail) = component {
                operation = match detail.identifier {
                    Some(IdentifierSpec::Required) => operation.identifier(),
                    Some(IdentifierSpec::Optional) => operation.optional_identifier(),
                    None => operation,
                };
                for keyword in &detail.keywords {
                    operation = operation.keyword(keyword.as_str());
                }
                for keyword in &detail.optional_keywords {
                    operation = operation.optional_keyword(keyword.as_str());
                }
                if detail.collection {
                    operation = operation.collection();
                }
            }
            contract.insert(operation);
        }
        contract
    }
}

/// A presenter whose components are described by a [`PresenterSpec`].
pub struct StaticPresenter {
    name: String,
    spec: Arc<PresenterSpec>,
    bindings: Bindings,
}

impl Presenter for StaticPresenter {
    fn call(
        &self,
        method: &str,
        identifier: Option<&str>,
        attributes: &Attributes,
    ) -> Result<Value, RenderError> {
        let Some(component) = self.spec.components.get(method) else {
            return Err(RenderError::Unimplemented {
                presenter: self.name.clone(),
                method: method.to_string(),
            });
        };
        let detail = match component {
            ComponentSpec::Value(value) => return Ok(to_value(value)),
            ComponentSpec::Detailed(detail) => detail,
        };

        if let Some(path) = &detail.binding {
            return Ok(self.bindings.lookup(path).cloned().unwrap_or(Value::Nil));
        }
        if let Some(slot) = &detail.content {
            return Ok(Value::from(self.bindings.content_for(slot)));
        }
        let value = detail
            .cases
            .iter()
            .find(|case| case.matches(identifier, attributes))
            .map(|case| &case.value)
            .or(detail.value.as_ref());
        Ok(value.map(to_value).unwrap_or(Value::Nil))
    }

    fn cache_key(&self) -> Option<String> {
        self.spec.cache_key.clone()
    }

    fn cache_duration(&self) -> Option<std::time::Duration> {
        self.spec.cache_seconds.map(std::time::Duration::from_secs)
    }
}

pub fn to_value(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::Text(s.clone()),
        toml::Value::Integer(n) => Value::Number(*n as f64),
        toml::Value::Float(f) => Value::Number(*f),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(dt) => Value::Text(dt.to_string()),
        toml::Value::Array(items) => Value::List(items.iter().map(to_value).collect()),
        toml::Value::Table(table) => Value::Record(
            table
                .iter()
                .map(|(key, value)| (key.clone(), to_value(value)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MANIFEST: &str = r#"
        [bindings]
        user = "Ann"

        [content]
        sidebar = "<nav/>"

        [presenters."posts/show"]
        cache_key = "v1"
        cache_seconds = 60

        [presenters."posts/show".components]
        title = "Hello"
        "admin?" = true
        "season?" = { keywords = ["name"], optional_keywords = ["hemisphere"], cases = [{ attributes = { name = "summer" }, value = true }], value = false }
        i18n = { identifier = "required", cases = [{ identifier = "home.welcome", value = "Welcome" }] }
        comments = { collection = true, value = [{ body = "first" }, { body = "second" }] }
        greeting = { binding = "user" }
        sidebar = { content = "sidebar" }
        meta = { value = { author = "Ann" } }
    "#;

    fn presenter(manifest: &Manifest) -> Box<dyn Presenter> {
        manifest
            .registry()
            .instantiate("posts/show", &manifest.bindings())
            .unwrap()
    }

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn builds_contracts_from_components() {
        let manifest = Manifest::from_toml_str(MANIFEST).unwrap();
        let contract = manifest.presenters["posts/show"].contract("posts/show");

        let season = contract.operation("season?").unwrap();
        assert!(season.required_keywords().contains("name"));
        assert!(season.optional_keywords().contains("hemisphere"));
        assert!(!season.accepts_identifier());

        let i18n = contract.operation("i18n").unwrap();
        assert!(i18n.accepts_identifier());
        assert!(!i18n.identifier_has_default());

        assert!(contract.operation("comments").unwrap().is_collection());
        assert!(contract.operation("title").unwrap().required_keywords().is_empty());
    }

    #[test]
    fn evaluates_values_cases_and_bindings() {
        let manifest = Manifest::from_toml_str(MANIFEST).unwrap();
        let presenter = presenter(&manifest);
        let none = Attributes::new();

        assert_eq!(presenter.call("title", None, &none).unwrap(), Value::from("Hello"));
        assert_eq!(
            presenter.call("season?", None, &attrs(&[("name", "summer")])).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            presenter.call("season?", None, &attrs(&[("name", "winter")])).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            presenter.call("i18n", Some("home.welcome"), &none).unwrap(),
            Value::from("Welcome")
        );
        assert_eq!(presenter.call("i18n", Some("other"), &none).unwrap(), Value::Nil);
        assert_eq!(presenter.call("greeting", None, &none).unwrap(), Value::from("Ann"));
        assert_eq!(presenter.call("sidebar", None, &none).unwrap(), Value::from("<nav/>"));
        assert_eq!(presenter.call("comments", None, &none).unwrap().into_items().len(), 2);
        assert_eq!(presenter.call("meta", None, &none).unwrap().to_string(), "author=Ann");
    }

    #[test]
    fn unknown_methods_are_unimplemented() {
        let manifest = Manifest::from_toml_str(MANIFEST).unwrap();
        let err = presenter(&manifest)
            .call("missing", None, &Attributes::new())
            .unwrap_err();
        assert!(matches!(err, RenderError::Unimplemented { .. }));
    }

    #[test]
    fn exposes_cache_settings() {
        let manifest = Manifest::from_toml_str(MANIFEST).unwrap();
        let presenter = presenter(&manifest);
        assert_eq!(presenter.cache_key().as_deref(), Some("v1"));
        assert_eq!(presenter.cache_duration(), Some(std::time::Duration::from_secs(60)));
    }

    #[test]
    fn rejects_unknown_presenter_keys() {
        let err = Manifest::from_toml_str("[presenters.page]\ncomponent = 1\n").unwrap_err();
        assert!(matches!(err, ManifestError::Toml(_)));
    }

    #[test]
    fn rejects_misspelled_component_keys() {
        let err = Manifest::from_toml_str(
            "[presenters.page.components]\n\"season?\" = { keyword = [\"name\"], value = true }\n",
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::Toml(_)));
        assert!(err.to_string().contains("keyword"), "{}", err);
    }

    #[test]
    fn loads_from_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();
        let manifest = Manifest::from_path(file.path()).unwrap();
        assert_eq!(manifest.presenters.len(), 1);
        assert_eq!(manifest.bindings().get("user"), Some(&Value::from("Ann")));
        assert_eq!(manifest.bindings().content_for("sidebar"), Some("<nav/>"));

        assert!(matches!(
            Manifest::from_path(file.path().with_extension("missing")),
            Err(ManifestError::Io(_))
        ));
    }
}
