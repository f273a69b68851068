use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use curly::{CompileError, Contract, ContractResolver, Template, compile};
use log::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PlanKey {
    presenter: String,
    source: String,
}

/// Compiled templates keyed by (presenter type, template source).
///
/// Compilation happens outside the lock. Two threads compiling the same
/// key at once both succeed and the first insert wins; compilation is
/// deterministic so either plan is equivalent.
#[derive(Debug, Default)]
pub struct PlanCache {
    plans: RwLock<HashMap<PlanKey, Arc<Template>>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(
        &self,
        source: &str,
        contract: &Contract,
        resolver: &dyn ContractResolver,
    ) -> Result<Arc<Template>, CompileError> {
        let key = PlanKey {
            presenter: contract.name().to_string(),
            source: source.to_string(),
        };

        if let Some(template) = self
            .plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            debug!("plan cache hit for `{}`", key.presenter);
            return Ok(Arc::clone(template));
        }

        debug!("plan cache miss for `{}`", key.presenter);
        let template = Arc::new(compile(source, contract, resolver)?);
        let mut plans = self.plans.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(plans.entry(key).or_insert(template)))
    }

    pub fn len(&self) -> usize {
        self.plans.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.plans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Storage for rendered output, consulted when a presenter supplies a
/// cache key.
pub trait FragmentCache: Send + Sync {
    fn fetch(&self, key: &str) -> Option<String>;

    /// Store `fragment`; with a `ttl` the entry expires after that long.
    fn store(&self, key: &str, fragment: String, ttl: Option<Duration>);
}

#[derive(Debug)]
struct Fragment {
    text: String,
    expires_at: Option<Instant>,
}

/// A process-local [`FragmentCache`].
#[derive(Debug, Default)]
pub struct MemoryFragmentCache {
    entries: Mutex<HashMap<String, Fragment>>,
}

impl MemoryFragmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FragmentCache for MemoryFragmentCache {
    fn fetch(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = entries
            .get(key)?
            .expires_at
            .is_some_and(|at| Instant::now() >= at);
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|fragment| fragment.text.clone())
    }

    /// Storing also drops every entry that has already expired.
    fn store(&self, key: &str, fragment: String, ttl: Option<Duration>) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, entry| entry.expires_at.is_none_or(|at| now < at));
        entries.insert(
            key.to_string(),
            Fragment {
                text: fragment,
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curly::{NoNestedContracts, Operation};

    fn contract() -> Contract {
        Contract::new("page").with(Operation::new("title"))
    }

    #[test]
    fn compiles_each_key_once() {
        let cache = PlanCache::new();
        let first = cache
            .get_or_compile("<h1>{{title}}</h1>", &contract(), &NoNestedContracts)
            .unwrap();
        let second = cache
            .get_or_compile("<h1>{{title}}</h1>", &contract(), &NoNestedContracts)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        cache
            .get_or_compile("{{title}}", &contract(), &NoNestedContracts)
            .unwrap();
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn keys_include_the_presenter() {
        let cache = PlanCache::new();
        let other = Contract::new("other").with(Operation::new("title"));
        cache.get_or_compile("{{title}}", &contract(), &NoNestedContracts).unwrap();
        cache.get_or_compile("{{title}}", &other, &NoNestedContracts).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_compiles_are_not_cached() {
        let cache = PlanCache::new();
        assert!(cache.get_or_compile("{{nope}}", &contract(), &NoNestedContracts).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_first_compiles_converge() {
        let cache = PlanCache::new();
        let contract = contract();
        let plans: Vec<Arc<Template>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        cache
                            .get_or_compile("a{{title}}b", &contract, &NoNestedContracts)
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(cache.len(), 1);
        assert!(plans.iter().all(|plan| **plan == *plans[0]));
    }

    #[test]
    fn fragments_expire() {
        let cache = MemoryFragmentCache::new();
        cache.store("forever", "a".to_string(), None);
        cache.store("gone", "b".to_string(), Some(Duration::ZERO));
        assert_eq!(cache.fetch("forever").as_deref(), Some("a"));
        assert_eq!(cache.fetch("gone"), None);
        assert_eq!(cache.fetch("missing"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn storing_prunes_expired_fragments() {
        let cache = MemoryFragmentCache::new();
        cache.store("stale/1", "a".to_string(), Some(Duration::ZERO));
        cache.store("stale/2", "b".to_string(), Some(Duration::ZERO));
        cache.store("kept", "c".to_string(), Some(Duration::from_secs(3600)));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.fetch("kept").as_deref(), Some("c"));
    }
}
