use std::collections::HashMap;
use std::sync::Arc;

use curly::{CollectionScope, Contract, ContractResolver};
use log::trace;

use crate::error::RenderError;
use crate::presenter::{Bindings, Presenter};
use crate::value::Value;

/// Builds a presenter instance from the bindings in scope.
pub type PresenterFactory =
    Box<dyn Fn(&Bindings) -> Result<Box<dyn Presenter>, RenderError> + Send + Sync>;

/// Registry of presenter types, indexed by name.
///
/// Names are `/`-separated paths (`posts/show`). Collection blocks look up
/// the presenter for their items relative to the enclosing presenter.
#[derive(Default)]
pub struct PresenterRegistry {
    contracts: HashMap<String, Arc<Contract>>,
    factories: HashMap<String, PresenterFactory>,
}

impl PresenterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a presenter type under its contract's name.
    pub fn register<F>(&mut self, contract: Contract, factory: F)
    where
        F: Fn(&Bindings) -> Result<Box<dyn Presenter>, RenderError> + Send + Sync + 'static,
    {
        let name = contract.name().to_string();
        self.factories.insert(name.clone(), Box::new(factory));
        self.contracts.insert(name, Arc::new(contract));
    }

    /// Register a contract that templates can be compiled against but
    /// that has no runtime implementation.
    pub fn register_contract(&mut self, contract: Contract) {
        self.contracts
            .insert(contract.name().to_string(), Arc::new(contract));
    }

    pub fn contract(&self, name: &str) -> Option<Arc<Contract>> {
        self.contracts.get(name).cloned()
    }

    /// All registered presenter names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.contracts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn instantiate(
        &self,
        name: &str,
        bindings: &Bindings,
    ) -> Result<Box<dyn Presenter>, RenderError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RenderError::UnknownPresenter(name.to_string()))?;
        factory(bindings)
    }

    /// Find the contract for `item`s inside presenter `parent`, trying
    /// `parent/item`, then `item` beside `parent`, then a top-level `item`.
    pub fn resolve_nested_contract(&self, parent: &str, item: &str) -> Option<Arc<Contract>> {
        nested_candidates(parent, item)
            .into_iter()
            .find_map(|name| self.contract(&name))
    }

    /// Create the presenter for the `index`th (1-based) item of a
    /// collection block, returning it with the bindings it was built from.
    pub fn instantiate_nested_presenter(
        &self,
        scope: &CollectionScope,
        item: Value,
        index: usize,
        outer: &Bindings,
    ) -> Result<(Box<dyn Presenter>, Bindings), RenderError> {
        trace!("instantiating `{}` for {} #{}", scope.presenter, scope.item, index);
        let bindings = outer.nested(scope, item, index);
        let presenter = self.instantiate(&scope.presenter, &bindings)?;
        Ok((presenter, bindings))
    }
}

impl ContractResolver for PresenterRegistry {
    fn nested_contract(&self, parent: &Contract, item: &str) -> Option<Arc<Contract>> {
        self.resolve_nested_contract(parent.name(), item)
    }
}

fn nested_candidates(parent: &str, item: &str) -> Vec<String> {
    let mut candidates = vec![format!("{}/{}", parent, item)];
    if let Some((namespace, _)) = parent.rsplit_once('/') {
        candidates.push(format!("{}/{}", namespace, item));
    }
    candidates.push(item.to_string());
    candidates
}
