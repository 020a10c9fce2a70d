use super::*;
use crate::{
    base::SentinelRule,
    datasource::{DynamicProperty, PropertyListener},
    logging, utils, Error, Result,
};
use arc_swap::{ArcSwap, ArcSwapOption};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

pub type RuleMap = HashMap<String, HashSet<Arc<Rule>>>;
pub type BreakerMap = HashMap<String, Vec<Arc<CircuitBreaker>>>;

/// `RuleSnapshot` pairs the valid rules with the breakers built from them.
/// Both are published together, readers never see one without the other.
#[derive(Debug, Default)]
pub struct RuleSnapshot {
    pub rules: RuleMap,
    /// breakers of explicit rules, the wildcard rules live in the `DefaultRuleResolver`
    pub breakers: BreakerMap,
}

/// A rule property the manager currently follows.
struct Subscription {
    property: Arc<DynamicProperty<Vec<Arc<Rule>>>>,
    listener: Arc<dyn PropertyListener<Vec<Arc<Rule>>>>,
}

/// `RuleManager` owns the circuit breaking rules of one engine instance,
/// and the circuit breakers derived from them.
pub struct RuleManager {
    snapshot: ArcSwap<RuleSnapshot>,
    // the raw rules of the last successful load, including invalid ones.
    // writers serialize on it.
    current_rules: Mutex<RuleMap>,
    default_resolver: DefaultRuleResolver,
    listeners: StateChangeListeners,
    subscription: ArcSwapOption<Subscription>,
}

impl Default for RuleManager {
    fn default() -> Self {
        let listeners = StateChangeListeners::default();
        RuleManager {
            snapshot: ArcSwap::from_pointee(RuleSnapshot::default()),
            current_rules: Mutex::new(HashMap::new()),
            default_resolver: DefaultRuleResolver::new(Arc::clone(&listeners)),
            listeners,
            subscription: ArcSwapOption::empty(),
        }
    }
}

impl RuleManager {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn lock_current_rules(&self) -> MutexGuard<'_, RuleMap> {
        self.current_rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// `snapshot` returns the currently published rules and breakers.
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        self.snapshot.load_full()
    }

    pub fn default_rule_resolver(&self) -> &DefaultRuleResolver {
        &self.default_resolver
    }

    /// `load_rules` replaces old rules with the given circuit breaking rules.
    /// returned `bool` indicates whether the internal map has been changed.
    /// On failure the previous rules stay in effect.
    pub fn load_rules(&self, rules: Vec<Arc<Rule>>) -> Result<bool> {
        let mut rule_map: RuleMap = HashMap::new();
        for rule in rules {
            rule_map.entry(rule.resource.clone()).or_default().insert(rule);
        }
        let mut current = self.lock_current_rules();
        self.publish(&mut current, rule_map)
    }

    /// `load_rules_of_resource` loads the given resource's rules, while all previous rules of the resource
    /// will be replaced. An empty `rules` clears the resource.
    /// returns `Ok(false)` if the rules are the same with the previous ones of the resource.
    pub fn load_rules_of_resource(&self, res: &str, rules: Vec<Arc<Rule>>) -> Result<bool> {
        if utils::is_blank(res) {
            return Err(Error::msg("empty resource"));
        }
        let mut res_rules = HashSet::with_capacity(rules.len());
        for rule in rules {
            if rule.resource == res {
                res_rules.insert(rule);
            } else {
                logging::warn!(
                    "[CircuitBreaker load_rules_of_resource] Ignoring rule of unmatched resource, expect: {}, rule: {:?}",
                    res,
                    rule
                );
            }
        }
        let mut current = self.lock_current_rules();
        let mut rule_map = current.clone();
        if res_rules.is_empty() {
            rule_map.remove(res);
        } else {
            rule_map.insert(res.into(), res_rules);
        }
        self.publish(&mut current, rule_map)
    }

    /// `append_rules` adds rules to the current ones, rules already present are ignored.
    pub fn append_rules(&self, rules: Vec<Arc<Rule>>) -> Result<bool> {
        let mut current = self.lock_current_rules();
        let mut rule_map = current.clone();
        for rule in rules {
            rule_map.entry(rule.resource.clone()).or_default().insert(rule);
        }
        self.publish(&mut current, rule_map)
    }

    /// `clear_rules` clear all the previous rules.
    pub fn clear_rules(&self) {
        let mut current = self.lock_current_rules();
        current.clear();
        self.snapshot.store(Arc::new(RuleSnapshot::default()));
        self.default_resolver.load_rules(Vec::new());
        logging::info!("[CircuitBreaker] Circuit breaking rules were cleared");
    }

    /// `clear_rules_of_resource` clears resource level rules.
    pub fn clear_rules_of_resource(&self, res: &str) {
        let mut current = self.lock_current_rules();
        current.remove(res);
        let old = self.snapshot.load_full();
        let mut next = RuleSnapshot {
            rules: old.rules.clone(),
            breakers: old.breakers.clone(),
        };
        next.rules.remove(res);
        next.breakers.remove(res);
        self.snapshot.store(Arc::new(next));
        if res == WILDCARD_RESOURCE {
            self.default_resolver.load_rules(Vec::new());
        }
    }

    /// `get_rules` returns all the valid rules in effect, the default rules included
    pub fn get_rules(&self) -> Vec<Arc<Rule>> {
        self.snapshot
            .load()
            .rules
            .values()
            .flat_map(|rules| rules.iter().cloned())
            .collect()
    }

    /// `get_rules_of_resource` returns specific resource's rules
    pub fn get_rules_of_resource(&self, res: &str) -> Vec<Arc<Rule>> {
        self.snapshot
            .load()
            .rules
            .get(res)
            .map(|rules| rules.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// `get_breakers_of_resource` returns the breakers built from the explicit rules of the resource
    pub fn get_breakers_of_resource(&self, res: &str) -> Vec<Arc<CircuitBreaker>> {
        self.snapshot
            .load()
            .breakers
            .get(res)
            .cloned()
            .unwrap_or_default()
    }

    /// `breakers_for` returns the breakers guarding `res`:
    /// the explicit ones if any, otherwise the ones derived from the default rules.
    pub fn breakers_for(&self, res: &str) -> Vec<Arc<CircuitBreaker>> {
        if let Some(breakers) = self.snapshot.load().breakers.get(res) {
            return breakers.clone();
        }
        self.default_resolver.breakers_of(res)
    }

    /// `register_state_change_listeners` registers the state change listener for all circuit breakers
    /// of this manager, including the ones created later.
    pub fn register_state_change_listeners(&self, mut listeners: Vec<Arc<dyn StateChangeListener>>) {
        if listeners.is_empty() {
            return;
        }
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .append(&mut listeners);
    }

    /// `clear_state_change_listeners` clears the all StateChangeListener
    pub fn clear_state_change_listeners(&self) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// `register_property` makes the manager follow `property`, replacing the previous subscription.
    /// The current value of the property, if any, is loaded at once.
    pub fn register_property(self: &Arc<Self>, property: Arc<DynamicProperty<Vec<Arc<Rule>>>>) {
        let listener: Arc<dyn PropertyListener<Vec<Arc<Rule>>>> = Arc::new(RulePropertyListener {
            manager: Arc::downgrade(self),
        });
        let previous = self.subscription.swap(Some(Arc::new(Subscription {
            property: Arc::clone(&property),
            listener: Arc::clone(&listener),
        })));
        if let Some(previous) = previous {
            previous.property.remove_listener(&previous.listener);
        }
        property.add_listener(listener);
    }

    /// `unregister_property` stops following the current property.
    pub fn unregister_property(&self) {
        if let Some(previous) = self.subscription.swap(None) {
            previous.property.remove_listener(&previous.listener);
        }
    }

    fn valid_rules_of(rules: &HashSet<Arc<Rule>>) -> HashSet<Arc<Rule>> {
        let mut valid_rules = HashSet::with_capacity(rules.len());
        for rule in rules {
            match rule.is_valid() {
                Ok(_) => {
                    valid_rules.insert(Arc::clone(rule));
                }
                Err(err) => logging::warn!(
                    "[CircuitBreaker load_rules] Ignoring invalid circuit breaking rule {:?}, reason: {:?}",
                    rule,
                    err
                ),
            }
        }
        valid_rules
    }

    // builds the whole snapshot aside and publishes it with a single store
    fn publish(&self, current: &mut RuleMap, rule_map: RuleMap) -> Result<bool> {
        if *current == rule_map {
            logging::info!(
                "[CircuitBreaker] Loaded rules is the same with current rules, so ignore load operation."
            );
            return Ok(false);
        }
        let start = utils::curr_time_nanos();
        let old = self.snapshot.load_full();
        let mut next = RuleSnapshot::default();
        for (res, rules) in &rule_map {
            let valid_rules = Self::valid_rules_of(rules);
            if valid_rules.is_empty() {
                continue;
            }
            if res != WILDCARD_RESOURCE {
                let old_cbs = old.breakers.get(res).map(Vec::as_slice).unwrap_or(&[]);
                let cbs = self
                    .build_resource_circuit_breaker(&valid_rules, old_cbs)
                    .map_err(|err| {
                        logging::error!(
                            "[CircuitBreaker load_rules] Fail to build circuit breakers, resource: {}, the previous rules are kept, reason: {:?}",
                            res,
                            err
                        );
                        err
                    })?;
                next.breakers.insert(res.clone(), cbs);
            }
            next.rules.insert(res.clone(), valid_rules);
        }

        let default_changed = next.rules.get(WILDCARD_RESOURCE) != old.rules.get(WILDCARD_RESOURCE);
        let default_rules: Vec<Arc<Rule>> = next
            .rules
            .get(WILDCARD_RESOURCE)
            .map(|rules| rules.iter().cloned().collect())
            .unwrap_or_default();
        if next.rules.is_empty() {
            logging::info!("[CircuitBreaker] Circuit breaking rules were cleared")
        } else {
            logging::info!(
                "[CircuitBreaker] Circuit breaking rules were loaded: {:?}",
                next.rules.values()
            )
        }
        self.snapshot.store(Arc::new(next));
        if default_changed {
            self.default_resolver.load_rules(default_rules);
        }
        *current = rule_map;
        logging::debug!(
            "[CircuitBreaker load_rules] Time statistic(ns) for updating circuit breaking rules, time cost {}",
            utils::curr_time_nanos() - start
        );
        Ok(true)
    }

    /// `build_resource_circuit_breaker` builds the breakers of one resource,
    /// reusing the old breaker of an equal rule so that its state and statistics survive.
    fn build_resource_circuit_breaker(
        &self,
        rules_of_res: &HashSet<Arc<Rule>>,
        old_res_cbs: &[Arc<CircuitBreaker>],
    ) -> Result<Vec<Arc<CircuitBreaker>>> {
        let mut new_res_cbs = Vec::with_capacity(rules_of_res.len());
        for rule in rules_of_res {
            match old_res_cbs.iter().find(|cb| cb.bound_rule() == rule) {
                Some(old_cb) => new_res_cbs.push(Arc::clone(old_cb)),
                None => new_res_cbs.push(Arc::new(CircuitBreaker::new(
                    Arc::clone(rule),
                    Arc::clone(&self.listeners),
                )?)),
            }
        }
        Ok(new_res_cbs)
    }
}

/// Forwards rule updates of a property to a manager, without keeping the manager alive.
struct RulePropertyListener {
    manager: Weak<RuleManager>,
}

impl RulePropertyListener {
    fn apply(&self, rules: &[Arc<Rule>]) {
        if let Some(manager) = self.manager.upgrade() {
            if let Err(err) = manager.load_rules(rules.to_vec()) {
                logging::error!(
                    "[CircuitBreaker RulePropertyListener] Fail to apply rules from property, reason: {:?}",
                    err
                );
            }
        }
    }
}

impl PropertyListener<Vec<Arc<Rule>>> for RulePropertyListener {
    fn config_update(&self, value: &Vec<Arc<Rule>>) {
        self.apply(value);
    }

    fn config_load(&self, value: &Vec<Arc<Rule>>) {
        self.apply(value);
    }
}
