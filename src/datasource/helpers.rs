use super::*;
use crate::core::circuitbreaker::{Rule, RuleManager};

/// `circuitbreaker_rule_updater` loads the rules into the given rule manager.
pub fn circuitbreaker_rule_updater(manager: Arc<RuleManager>) -> PropertyUpdater<Rule> {
    Box::new(move |rules: Vec<Arc<Rule>>| manager.load_rules(rules))
}

pub fn new_circuitbreaker_rule_handler(
    manager: Arc<RuleManager>,
    converter: PropertyConverter<Rule>,
) -> Arc<DefaultPropertyHandler<Rule>> {
    DefaultPropertyHandler::new(converter, circuitbreaker_rule_updater(manager))
}

/// `circuitbreaker_property_updater` publishes the rules to a dynamic property,
/// for the rule managers subscribed to it.
pub fn circuitbreaker_property_updater(
    property: Arc<DynamicProperty<Vec<Arc<Rule>>>>,
) -> PropertyUpdater<Rule> {
    Box::new(move |rules: Vec<Arc<Rule>>| Ok(property.update_value(rules)))
}

pub fn new_circuitbreaker_property_handler(
    property: Arc<DynamicProperty<Vec<Arc<Rule>>>>,
    converter: PropertyConverter<Rule>,
) -> Arc<DefaultPropertyHandler<Rule>> {
    DefaultPropertyHandler::new(converter, circuitbreaker_property_updater(property))
}
