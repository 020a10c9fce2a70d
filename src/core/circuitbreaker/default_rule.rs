use super::*;
use crate::{logging, Result};
use arc_swap::ArcSwap;
use lru::LruCache;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Resources memoized with default breakers at most, the least recently used ones are evicted.
pub const DEFAULT_RULE_MEMO_CAPACITY: usize = 10000;

type BreakerMemo = LruCache<String, Vec<Arc<CircuitBreaker>>>;

/// The wildcard rules together with the breakers built from them so far.
struct DefaultState {
    rules: Vec<Arc<Rule>>,
    breakers: Mutex<BreakerMemo>,
}

impl DefaultState {
    fn new(rules: Vec<Arc<Rule>>, capacity: usize) -> Self {
        DefaultState {
            rules,
            breakers: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn memo(&self) -> MutexGuard<'_, BreakerMemo> {
        self.breakers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `DefaultRuleResolver` lazily instantiates breakers from the wildcard rules
/// for resources that have no explicit rule.
pub struct DefaultRuleResolver {
    state: ArcSwap<DefaultState>,
    capacity: usize,
    exclusions: RwLock<HashSet<String>>,
    listeners: StateChangeListeners,
}

impl DefaultRuleResolver {
    pub fn new(listeners: StateChangeListeners) -> Self {
        Self::with_capacity(listeners, DEFAULT_RULE_MEMO_CAPACITY)
    }

    pub fn with_capacity(listeners: StateChangeListeners, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        DefaultRuleResolver {
            state: ArcSwap::from_pointee(DefaultState::new(Vec::new(), capacity)),
            capacity,
            exclusions: RwLock::new(HashSet::new()),
            listeners,
        }
    }

    /// replaces the wildcard rules, breakers created from the previous ones are dropped
    pub fn load_rules(&self, rules: Vec<Arc<Rule>>) {
        self.state
            .store(Arc::new(DefaultState::new(rules, self.capacity)));
    }

    pub fn get_rules(&self) -> Vec<Arc<Rule>> {
        self.state.load().rules.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.state.load().rules.is_empty()
    }

    /// number of resources currently holding default breakers
    pub fn memoized_len(&self) -> usize {
        self.state.load().memo().len()
    }

    /// `set_exclusions` replaces the exclusion set,
    /// only the resources entering or leaving it lose their default breakers.
    pub fn set_exclusions(&self, resources: Vec<String>) {
        let next: HashSet<String> = resources.into_iter().collect();
        let mut exclusions = self.exclusions.write().unwrap_or_else(PoisonError::into_inner);
        let state = self.state.load();
        let mut memo = state.memo();
        for res in exclusions.symmetric_difference(&next) {
            memo.pop(res);
        }
        *exclusions = next;
    }

    pub fn add_exclusion(&self, resource: &str) {
        self.exclusions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(resource.into());
        self.state.load().memo().pop(resource);
    }

    /// a resource leaving the exclusion set starts with fresh default breakers
    pub fn remove_exclusion(&self, resource: &str) {
        self.exclusions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(resource);
        self.state.load().memo().pop(resource);
    }

    pub fn is_excluded(&self, resource: &str) -> bool {
        self.exclusions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(resource)
    }

    /// `breakers_of` returns the default breakers of `resource`, creating them on first use.
    pub fn breakers_of(&self, resource: &str) -> Vec<Arc<CircuitBreaker>> {
        if self.is_excluded(resource) {
            return Vec::new();
        }
        let state = self.state.load();
        if state.rules.is_empty() {
            return Vec::new();
        }
        let mut memo = state.memo();
        if let Some(breakers) = memo.get(resource) {
            return breakers.clone();
        }
        match self.build(&state.rules, resource) {
            Ok(breakers) => {
                memo.put(resource.into(), breakers.clone());
                breakers
            }
            Err(err) => {
                logging::error!(
                    "[CircuitBreaker DefaultRuleResolver] Fail to build default circuit breakers, resource: {}, reason: {:?}",
                    resource,
                    err
                );
                Vec::new()
            }
        }
    }

    fn build(&self, rules: &[Arc<Rule>], resource: &str) -> Result<Vec<Arc<CircuitBreaker>>> {
        let mut breakers = Vec::with_capacity(rules.len());
        for rule in rules {
            let rule = Arc::new(rule.with_resource(resource));
            breakers.push(Arc::new(CircuitBreaker::new(
                rule,
                Arc::clone(&self.listeners),
            )?));
        }
        Ok(breakers)
    }
}
