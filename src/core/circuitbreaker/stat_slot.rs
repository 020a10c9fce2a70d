use super::*;
use crate::base::{BaseSlot, EntryContext, StatSlot};
use std::sync::Arc;

const STAT_SLOT_ORDER: u32 = 5000;

/// MetricStatSlot records metrics for circuit breaker on invocation completed.
/// MetricStatSlot must be filled into slot chain if circuit breaker is alive.
pub struct MetricStatSlot {
    manager: Arc<RuleManager>,
}

impl MetricStatSlot {
    pub fn new(manager: Arc<RuleManager>) -> Self {
        MetricStatSlot { manager }
    }
}

impl BaseSlot for MetricStatSlot {
    fn order(&self) -> u32 {
        STAT_SLOT_ORDER
    }
}

impl StatSlot for MetricStatSlot {
    fn on_completed(&self, ctx: &mut EntryContext) {
        self.manager
            .record_completion(ctx.resource(), ctx.round_trip(), ctx.get_err());
    }
}
