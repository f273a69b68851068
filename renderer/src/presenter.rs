use std::collections::BTreeMap;
use std::time::Duration;

use curly::{Attributes, CollectionScope};

use crate::error::RenderError;
use crate::value::Value;

/// The runtime side of a contract: the operations a template may call.
///
/// Rendering happens in two phases. [`Presenter::setup`] runs once before
/// a top-level render and may have side effects; `call` is expected to be
/// free of them so a compiled template can be evaluated concurrently
/// against distinct presenters.
pub trait Presenter {
    fn call(
        &self,
        method: &str,
        identifier: Option<&str>,
        attributes: &Attributes,
    ) -> Result<Value, RenderError>;

    fn setup(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    /// Key for caching the rendered output, if the output is cacheable.
    fn cache_key(&self) -> Option<String> {
        None
    }

    fn cache_duration(&self) -> Option<Duration> {
        None
    }
}

/// Named values available to a presenter, plus named content slots
/// holding text rendered elsewhere for later composition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    values: BTreeMap<String, Value>,
    content: BTreeMap<String, String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Resolve a dotted path: the first segment names a binding, the rest
    /// walk record fields (`comment.author.name`).
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        segments.try_fold(self.values.get(first)?, |value, field| value.field(field))
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn content_for(&self, slot: &str) -> Option<&str> {
        self.content.get(slot).map(String::as_str)
    }

    pub fn set_content(&mut self, slot: impl Into<String>, text: impl Into<String>) {
        self.content.insert(slot.into(), text.into());
    }

    pub fn with_content(mut self, slot: impl Into<String>, text: impl Into<String>) -> Self {
        self.set_content(slot, text);
        self
    }

    /// Bindings for one item of a collection block: everything in `self`
    /// plus the item and its 1-based position.
    pub fn nested(&self, scope: &CollectionScope, item: Value, index: usize) -> Bindings {
        self.clone()
            .with(scope.item.clone(), item)
            .with(scope.counter.clone(), index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.content.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bindings = Bindings::new();
        for (name, value) in iter {
            bindings.insert(name, value);
        }
        bindings
    }
}
