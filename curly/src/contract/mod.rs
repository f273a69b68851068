use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Names a presenter may define that are lifecycle hooks, never components.
pub const RESERVED_OPERATIONS: &[&str] = &["setup!", "cache_key", "cache_duration", "cache_options"];

/// A positional parameter of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Required,
    /// Has a default value, so callers may omit it.
    Optional,
}

/// The declared shape of one presenter operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    name: String,
    positional: Vec<Param>,
    required_keywords: BTreeSet<String>,
    optional_keywords: BTreeSet<String>,
    collection: bool,
}

impl Operation {
    /// An operation taking no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Operation {
            name: name.into(),
            positional: Vec::new(),
            required_keywords: BTreeSet::new(),
            optional_keywords: BTreeSet::new(),
            collection: false,
        }
    }

    /// Accept a required identifier (`{{name.identifier}}`).
    pub fn identifier(self) -> Self {
        self.positional(Param::Required)
    }

    /// Accept an identifier that may be omitted.
    pub fn optional_identifier(self) -> Self {
        self.positional(Param::Optional)
    }

    /// Append a positional parameter. Operations with more than one can
    /// never be used as components.
    pub fn positional(mut self, param: Param) -> Self {
        self.positional.push(param);
        self
    }

    pub fn keyword(mut self, name: impl Into<String>) -> Self {
        self.required_keywords.insert(name.into());
        self
    }

    pub fn optional_keyword(mut self, name: impl Into<String>) -> Self {
        self.optional_keywords.insert(name.into());
        self
    }

    /// Mark the operation as returning a collection usable by `{{*…}}` blocks.
    pub fn collection(mut self) -> Self {
        self.collection = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn positional_params(&self) -> &[Param] {
        &self.positional
    }

    pub fn accepts_identifier(&self) -> bool {
        !self.positional.is_empty()
    }

    pub fn identifier_has_default(&self) -> bool {
        self.positional.first() == Some(&Param::Optional)
    }

    pub fn required_keywords(&self) -> &BTreeSet<String> {
        &self.required_keywords
    }

    pub fn optional_keywords(&self) -> &BTreeSet<String> {
        &self.optional_keywords
    }

    pub fn accepts_keyword(&self, name: &str) -> bool {
        self.required_keywords.contains(name) || self.optional_keywords.contains(name)
    }

    pub fn is_collection(&self) -> bool {
        self.collection
    }
}

/// Renders the operation the way a reference to it is written, e.g.
/// `avatar[.<identifier>] [size=...]`.
impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        match self.positional.as_slice() {
            [] => {}
            [Param::Required] => write!(f, ".<identifier>")?,
            [Param::Optional] => write!(f, "[.<identifier>]")?,
            params => return write!(f, " (takes {} positional arguments)", params.len()),
        }
        for keyword in &self.required_keywords {
            write!(f, " {}=...", keyword)?;
        }
        for keyword in &self.optional_keywords {
            write!(f, " [{}=...]", keyword)?;
        }
        if self.collection {
            write!(f, " (collection)")?;
        }
        Ok(())
    }
}

/// The static description of what a presenter type exposes.
///
/// Built once per presenter type and only ever queried by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    name: String,
    operations: BTreeMap<String, Operation>,
}

impl Contract {
    pub fn new(name: impl Into<String>) -> Self {
        Contract {
            name: name.into(),
            operations: BTreeMap::new(),
        }
    }

    pub fn with(mut self, operation: Operation) -> Self {
        self.insert(operation);
        self
    }

    /// Declare an operation, replacing any earlier declaration of the same name.
    pub fn insert(&mut self, operation: Operation) {
        self.operations.insert(operation.name.clone(), operation);
    }

    /// The presenter type this contract describes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up an operation usable as a component. Reserved hook names
    /// are never returned even when declared.
    pub fn operation(&self, name: &str) -> Option<&Operation> {
        if RESERVED_OPERATIONS.contains(&name) {
            return None;
        }
        self.operations.get(name)
    }

    pub fn has_component(&self, name: &str) -> bool {
        self.operation(name).is_some()
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations
            .values()
            .filter(|op| !RESERVED_OPERATIONS.contains(&op.name.as_str()))
    }
}

/// Supplies the contract that applies inside a collection block.
///
/// `item` is the singular name bound to each element, e.g. `comment`
/// for `{{*comments}}`. How that name maps to a presenter type is up to
/// the implementor.
pub trait ContractResolver {
    fn nested_contract(&self, parent: &Contract, item: &str) -> Option<Arc<Contract>>;
}

/// A resolver for templates that use no collection blocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNestedContracts;

impl ContractResolver for NoNestedContracts {
    fn nested_contract(&self, _parent: &Contract, _item: &str) -> Option<Arc<Contract>> {
        None
    }
}

impl<F> ContractResolver for F
where
    F: Fn(&Contract, &str) -> Option<Arc<Contract>>,
{
    fn nested_contract(&self, parent: &Contract, item: &str) -> Option<Arc<Contract>> {
        self(parent, item)
    }
}
