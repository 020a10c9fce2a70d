use super::global_rule_manager;
use crate::{base::SlotChain, circuitbreaker};
use lazy_static::lazy_static;
use std::sync::Arc;

lazy_static! {
    pub static ref GLOBAL_SLOT_CHAIN: Arc<SlotChain> = {
        let mut sc = SlotChain::new();
        sc.add_rule_check_slot(Arc::new(circuitbreaker::Slot::new(global_rule_manager()))); // 5000
        sc.add_stat_slot(Arc::new(circuitbreaker::MetricStatSlot::new(global_rule_manager()))); // 5000
        Arc::new(sc)
    };
}

/// `global_slot_chain` returns the chain checking the process-wide degrade rules,
/// for frameworks carrying an `EntryContext` through their own checks.
pub fn global_slot_chain() -> Arc<SlotChain> {
    GLOBAL_SLOT_CHAIN.clone()
}

/// `build_slot_chain` assembles a chain for a dedicated rule manager.
pub fn build_slot_chain(manager: Arc<circuitbreaker::RuleManager>) -> SlotChain {
    let mut sc = SlotChain::new();
    sc.add_rule_check_slot(Arc::new(circuitbreaker::Slot::new(Arc::clone(&manager))));
    sc.add_stat_slot(Arc::new(circuitbreaker::MetricStatSlot::new(manager)));
    sc
}
