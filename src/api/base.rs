use crate::{
    base::{BlockError, EntryContext},
    circuitbreaker::{Rule, RuleManager, StateChangeListener},
    datasource::DynamicProperty,
    Error, Result,
};
use lazy_static::lazy_static;
use std::sync::Arc;

lazy_static! {
    static ref GLOBAL_RULE_MANAGER: Arc<RuleManager> = Arc::new(RuleManager::new());
}

/// `global_rule_manager` returns the process-wide rule manager behind the free functions of this module.
pub fn global_rule_manager() -> Arc<RuleManager> {
    GLOBAL_RULE_MANAGER.clone()
}

/// `load_rules` replaces all of the degrade rules, returns false if they are unchanged.
#[inline]
pub fn load_rules(rules: Vec<Arc<Rule>>) -> Result<bool> {
    GLOBAL_RULE_MANAGER.load_rules(rules)
}

#[inline]
pub fn load_rules_of_resource(res: &str, rules: Vec<Arc<Rule>>) -> Result<bool> {
    GLOBAL_RULE_MANAGER.load_rules_of_resource(res, rules)
}

#[inline]
pub fn append_rules(rules: Vec<Arc<Rule>>) -> Result<bool> {
    GLOBAL_RULE_MANAGER.append_rules(rules)
}

#[inline]
pub fn clear_rules() {
    GLOBAL_RULE_MANAGER.clear_rules()
}

/// `get_rules` returns the valid rules currently in effect, the wildcard ones included.
#[inline]
pub fn get_rules() -> Vec<Arc<Rule>> {
    GLOBAL_RULE_MANAGER.get_rules()
}

#[inline]
pub fn register_state_change_listeners(listeners: Vec<Arc<dyn StateChangeListener>>) {
    GLOBAL_RULE_MANAGER.register_state_change_listeners(listeners)
}

/// `register_rule_property` makes the process-wide rules follow `property`.
#[inline]
pub fn register_rule_property(property: Arc<DynamicProperty<Vec<Arc<Rule>>>>) {
    GLOBAL_RULE_MANAGER.register_property(property)
}

/// `degrade_check` decides whether the call of `res` from `caller` may proceed.
/// An admitted call must be reported by `degrade_record` when it finishes.
#[inline]
pub fn degrade_check(res: &str, caller: &str) -> std::result::Result<(), BlockError> {
    GLOBAL_RULE_MANAGER.degrade_check(res, caller)
}

#[inline]
pub fn degrade_record(res: &str, elapsed_ms: u64, error: Option<&Error>, was_blocked: bool) {
    GLOBAL_RULE_MANAGER.degrade_record(res, elapsed_ms, error, was_blocked)
}

/// `entry` is the context based counterpart of `degrade_check`,
/// the context must be handed back to `exit`.
#[inline]
pub fn entry(res: &str, caller: &str) -> std::result::Result<EntryContext, BlockError> {
    GLOBAL_RULE_MANAGER.entry(res, caller)
}

#[inline]
pub fn exit(ctx: EntryContext, error: Option<Error>) {
    GLOBAL_RULE_MANAGER.exit(ctx, error)
}
