use super::{BlockError, EntryContext, TokenResult};
use crate::utils::curr_time_millis;
use std::sync::Arc;

const SLOT_INIT: usize = 4;

/// SlotChain will sort all it's slots by ascending sort value in each bucket
/// (RuleCheckSlot bucket and StatSlot bucket)
pub trait BaseSlot: Sync + Send {
    /// order returns the sort value of the slot.
    fn order(&self) -> u32 {
        0
    }
}

/// RuleCheckSlot is rule based checking strategy
/// All checking rule must implement this interface.
pub trait RuleCheckSlot: BaseSlot {
    // check function do some validation
    // It can break off the slot pipeline
    fn check(&self, ctx: &mut EntryContext) -> TokenResult {
        ctx.result().clone()
    }
}

/// StatSlot is responsible for counting all custom biz metrics.
pub trait StatSlot: BaseSlot {
    /// on_entry_pass function will be invoked when RuleCheckSlots execute pass
    fn on_entry_pass(&self, _ctx: &EntryContext) {}
    /// on_entry_blocked function will be invoked when RuleCheckSlots fail to execute
    fn on_entry_blocked(&self, _ctx: &EntryContext, _block_error: BlockError) {}
    /// on_completed function will be invoked when chain exits.
    /// Note: blocked entry will not call this function
    fn on_completed(&self, _ctx: &mut EntryContext) {}
}

/// SlotChain is the minimal pipeline driving the check slots at entry
/// and the statistic slots at exit of an invocation.
#[derive(Clone)]
pub struct SlotChain {
    /// rule_checks is in ascending order by RuleCheckSlot.order() value.
    rule_checks: Vec<Arc<dyn RuleCheckSlot>>,
    /// stats is in ascending order by StatSlot.order() value.
    stats: Vec<Arc<dyn StatSlot>>,
}

impl Default for SlotChain {
    fn default() -> Self {
        Self {
            rule_checks: Vec::with_capacity(SLOT_INIT),
            stats: Vec::with_capacity(SLOT_INIT),
        }
    }
}

impl SlotChain {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_rule_check_slot(&mut self, s: Arc<dyn RuleCheckSlot>) {
        self.rule_checks.push(s);
        self.rule_checks.sort_by_key(|a| a.order());
    }

    pub fn add_stat_slot(&mut self, s: Arc<dyn StatSlot>) {
        self.stats.push(s);
        self.stats.sort_by_key(|a| a.order());
    }

    /// `entry` runs the check slots in order, stopping at the first block.
    pub fn entry(&self, ctx: &mut EntryContext) -> TokenResult {
        for s in &self.rule_checks {
            let res = s.check(ctx);
            if res.is_blocked() {
                ctx.set_result(res);
                break;
            }
        }
        match ctx.result().block_err() {
            Some(block_err) => {
                for s in &self.stats {
                    s.on_entry_blocked(ctx, block_err.clone());
                }
            }
            None => {
                for s in &self.stats {
                    s.on_entry_pass(ctx);
                }
            }
        }
        ctx.result().clone()
    }

    /// `exit` completes the invocation: stat slots only see passed invocations,
    /// exit hooks always run.
    pub fn exit(&self, ctx: &mut EntryContext) {
        if !ctx.is_blocked() {
            ctx.calculate_round_trip(curr_time_millis());
            for s in &self.stats {
                s.on_completed(ctx);
            }
        }
        ctx.run_exit_handlers();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::BlockType;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Reject {
        order: u32,
    }

    impl BaseSlot for Reject {
        fn order(&self) -> u32 {
            self.order
        }
    }

    impl RuleCheckSlot for Reject {
        fn check(&self, _ctx: &mut EntryContext) -> TokenResult {
            TokenResult::new_blocked(BlockType::Other(self.order as u8))
        }
    }

    #[derive(Default)]
    struct Counting {
        passed: AtomicU32,
        blocked: AtomicU32,
        completed: AtomicU32,
    }

    impl BaseSlot for Counting {}

    impl StatSlot for Counting {
        fn on_entry_pass(&self, _ctx: &EntryContext) {
            self.passed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_entry_blocked(&self, _ctx: &EntryContext, _block_error: BlockError) {
            self.blocked.fetch_add(1, Ordering::SeqCst);
        }
        fn on_completed(&self, _ctx: &mut EntryContext) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn first_block_wins() {
        let stat = Arc::new(Counting::default());
        let mut sc = SlotChain::new();
        sc.add_rule_check_slot(Arc::new(Reject { order: 20 }));
        sc.add_rule_check_slot(Arc::new(Reject { order: 10 }));
        sc.add_stat_slot(stat.clone());

        let mut ctx = EntryContext::new();
        let res = sc.entry(&mut ctx);
        assert_eq!(res.block_err().unwrap().block_type(), BlockType::Other(10));
        sc.exit(&mut ctx);
        assert_eq!(stat.blocked.load(Ordering::SeqCst), 1);
        assert_eq!(stat.completed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn pass_and_complete() {
        let stat = Arc::new(Counting::default());
        let mut sc = SlotChain::new();
        sc.add_stat_slot(stat.clone());
        let mut ctx = EntryContext::new();
        assert!(sc.entry(&mut ctx).is_pass());
        sc.exit(&mut ctx);
        assert_eq!(stat.passed.load(Ordering::SeqCst), 1);
        assert_eq!(stat.completed.load(Ordering::SeqCst), 1);
    }
}
