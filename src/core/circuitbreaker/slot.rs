use super::*;
use crate::{
    base::{BaseSlot, BlockError, BlockType, EntryContext, RuleCheckSlot, SentinelRule, TokenResult},
    utils, Error, Result,
};
use std::sync::Arc;

const RULE_CHECK_SLOT_ORDER: u32 = 5000;

/// `Slot` is the RuleCheckSlot checking the circuit breakers of a rule manager.
pub struct Slot {
    manager: Arc<RuleManager>,
}

impl Slot {
    pub fn new(manager: Arc<RuleManager>) -> Self {
        Slot { manager }
    }
}

impl BaseSlot for Slot {
    fn order(&self) -> u32 {
        RULE_CHECK_SLOT_ORDER
    }
}

impl RuleCheckSlot for Slot {
    fn check(&self, ctx: &mut EntryContext) -> TokenResult {
        self.manager.check_context(ctx);
        ctx.result().clone()
    }
}

impl RuleManager {
    /// `try_acquire` asks every breaker of `res` applying to `origin` for admission.
    /// Returns the breakers whose probe was granted to this invocation.
    /// When a breaker refuses, the probes granted before it are rolled back.
    fn try_acquire(
        &self,
        res: &str,
        origin: &str,
        now: u64,
    ) -> std::result::Result<Vec<Arc<CircuitBreaker>>, BlockError> {
        let mut probes = Vec::new();
        for cb in self.breakers_for(res) {
            if !cb.bound_rule().applies_to(origin) {
                continue;
            }
            match cb.try_acquire_with_time(now) {
                Admission::Pass => {}
                Admission::Probe => probes.push(cb),
                Admission::Block => {
                    for probe in &probes {
                        probe.rollback_probe_with_time(now);
                    }
                    let rule: Arc<dyn SentinelRule> = Arc::clone(cb.bound_rule()) as _;
                    return Err(BlockError::new_with_cause(
                        BlockType::CircuitBreaking,
                        format!(
                            "circuit breaker check blocked, state: {:?}",
                            cb.current_state()
                        ),
                        rule,
                        None,
                    ));
                }
            }
        }
        Ok(probes)
    }

    /// `check_context` runs the circuit breaker check for an invocation context.
    /// A probe granted here is rolled back on exit if the invocation ends up blocked by a later check.
    pub fn check_context(&self, ctx: &mut EntryContext) {
        if ctx.resource().is_empty() || ctx.is_blocked() {
            return;
        }
        let res = ctx.resource().to_owned();
        let origin = ctx.origin().to_owned();
        match self.try_acquire(&res, &origin, utils::curr_time_millis()) {
            Ok(probes) => {
                for probe in probes {
                    ctx.when_exit(Box::new(move |ctx: &EntryContext| -> Result<()> {
                        if ctx.is_blocked() {
                            probe.rollback_probe();
                        }
                        Ok(())
                    }));
                }
            }
            Err(block_err) => ctx.set_result(TokenResult::Blocked(block_err)),
        }
    }

    /// `record_completion` feeds a finished invocation to every breaker of the resource.
    pub fn record_completion(&self, res: &str, rt: u64, error: Option<&Error>) {
        for cb in self.breakers_for(res) {
            cb.on_request_complete(rt, error);
        }
    }

    /// `entry` checks whether an invocation of `res` from `caller` may proceed.
    /// The returned context must be handed back to `exit` when the invocation finishes.
    pub fn entry(&self, res: &str, caller: &str) -> std::result::Result<EntryContext, BlockError> {
        let mut ctx = EntryContext::new();
        ctx.set_resource(res.into());
        ctx.set_origin(caller.into());
        ctx.set_start_time(utils::curr_time_millis());
        self.check_context(&mut ctx);
        match ctx.result().block_err() {
            Some(block_err) => {
                ctx.run_exit_handlers();
                Err(block_err)
            }
            None => Ok(ctx),
        }
    }

    /// `exit` completes an invocation admitted by `entry`, with the error it ended with, if any.
    pub fn exit(&self, mut ctx: EntryContext, error: Option<Error>) {
        if let Some(error) = error {
            ctx.set_err(error);
        }
        if !ctx.is_blocked() {
            ctx.calculate_round_trip(utils::curr_time_millis());
            self.record_completion(ctx.resource(), ctx.round_trip(), ctx.get_err());
        }
        ctx.run_exit_handlers();
    }

    /// `degrade_check` is the context free admission check.
    /// A probe granted here is settled by the following `degrade_record` of the invocation.
    /// If the invocation ends up blocked by another checker, nothing settles the probe,
    /// and the breaker grants a new one once the recovery timeout elapsed again.
    pub fn degrade_check(&self, res: &str, caller: &str) -> std::result::Result<(), BlockError> {
        if res.is_empty() {
            return Ok(());
        }
        self.try_acquire(res, caller, utils::curr_time_millis())
            .map(|_| ())
    }

    /// `degrade_record` reports a finished invocation, blocked invocations are skipped.
    /// A blocked invocation carries no caller, so it cannot tell whether it held the probe
    /// of a half-open breaker, and leaves the probe to expire.
    pub fn degrade_record(&self, res: &str, elapsed_ms: u64, error: Option<&Error>, was_blocked: bool) {
        if was_blocked || res.is_empty() {
            return;
        }
        self.record_completion(res, elapsed_ms, error);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::SlotChain;

    fn error_count_rule(resource: &str, limit_app: &str) -> Arc<Rule> {
        Arc::new(Rule {
            resource: resource.into(),
            grade: Grade::ExceptionCount,
            threshold: 1.0,
            recovery_timeout_sec: 1,
            stat_interval_ms: 10000,
            limit_app: limit_app.into(),
            ..Default::default()
        })
    }

    struct Reject;

    impl BaseSlot for Reject {
        fn order(&self) -> u32 {
            RULE_CHECK_SLOT_ORDER + 1
        }
    }

    impl RuleCheckSlot for Reject {
        fn check(&self, _ctx: &mut EntryContext) -> TokenResult {
            TokenResult::new_blocked(BlockType::Other(1))
        }
    }

    fn open_breaker(manager: &RuleManager, res: &str) -> Arc<CircuitBreaker> {
        let cb = manager.get_breakers_of_resource(res).remove(0);
        cb.on_request_complete(1, Some(&Error::msg("biz error")));
        assert_eq!(cb.current_state(), State::Open);
        cb
    }

    #[test]
    fn check_blocked() {
        let manager = Arc::new(RuleManager::new());
        manager
            .load_rules(vec![error_count_rule("abc", LIMIT_APP_DEFAULT)])
            .unwrap();
        open_breaker(&manager, "abc");

        let slot = Slot::new(Arc::clone(&manager));
        let mut ctx = EntryContext::new();
        ctx.set_resource("abc".into());
        let token = slot.check(&mut ctx);
        assert!(token.is_blocked());
        let block_err = token.block_err().unwrap();
        assert_eq!(block_err.block_type(), BlockType::CircuitBreaking);
        assert_eq!(block_err.resource(), "abc");
        assert_eq!(block_err.limit_app(), LIMIT_APP_DEFAULT);
        assert!(block_err.triggered_rule().is_some());

        assert!(manager.entry("abc", "").is_err());
        assert!(manager.degrade_check("abc", "").is_err());
    }

    #[test]
    fn check_pass() {
        let manager = Arc::new(RuleManager::new());
        manager
            .load_rules(vec![error_count_rule("abc", LIMIT_APP_DEFAULT)])
            .unwrap();
        let slot = Slot::new(Arc::clone(&manager));
        let mut ctx = EntryContext::new();
        ctx.set_resource("abc".into());
        assert!(slot.check(&mut ctx).is_pass());
        assert!(ctx.result().is_pass());
        // resources without rules always pass
        assert!(manager.degrade_check("def", "").is_ok());
        assert!(manager.degrade_check("", "").is_ok());
    }

    #[test]
    fn limit_app_scoping() {
        let manager = RuleManager::new();
        manager
            .load_rules(vec![error_count_rule("abc", "app-a")])
            .unwrap();
        open_breaker(&manager, "abc");
        assert!(manager.degrade_check("abc", "app-a").is_err());
        assert!(manager.degrade_check("abc", "app-b").is_ok());
        assert!(manager.degrade_check("abc", "").is_ok());
    }

    #[test]
    fn entry_exit_cycle() {
        let manager = RuleManager::new();
        manager
            .load_rules(vec![error_count_rule("abc", LIMIT_APP_DEFAULT)])
            .unwrap();
        let ctx = manager.entry("abc", "app-a").unwrap();
        manager.exit(ctx, Some(Error::msg("biz error")));
        let cb = manager.get_breakers_of_resource("abc").remove(0);
        assert_eq!(cb.current_state(), State::Open);
        let block_err = manager.entry("abc", "app-a").unwrap_err();
        assert!(block_err.to_string().contains("abc"));
    }

    #[test]
    fn probe_rolled_back_when_blocked_later() {
        let manager = Arc::new(RuleManager::new());
        manager
            .load_rules(vec![error_count_rule("abc", LIMIT_APP_DEFAULT)])
            .unwrap();
        let cb = open_breaker(&manager, "abc");
        let retry_at = cb.next_retry_timestamp_ms();
        while utils::curr_time_millis() < retry_at {
            utils::sleep_for_ms(retry_at - utils::curr_time_millis());
        }

        let mut chain = SlotChain::new();
        chain.add_rule_check_slot(Arc::new(Slot::new(Arc::clone(&manager))));
        chain.add_rule_check_slot(Arc::new(Reject));
        chain.add_stat_slot(Arc::new(MetricStatSlot::new(Arc::clone(&manager))));
        let mut ctx = EntryContext::new();
        ctx.set_resource("abc".into());
        let token = chain.entry(&mut ctx);
        assert!(token.is_blocked());
        // the probe was granted, then another check refused the invocation
        assert_eq!(cb.current_state(), State::HalfOpen);
        chain.exit(&mut ctx);
        assert_eq!(cb.current_state(), State::Open);
        assert!(cb.next_retry_timestamp_ms() >= retry_at + 1000);
    }

    #[test]
    fn blocked_elsewhere_expires_after_deadline() {
        let manager = RuleManager::new();
        manager
            .load_rules(vec![error_count_rule("abc", LIMIT_APP_DEFAULT)])
            .unwrap();
        let cb = open_breaker(&manager, "abc");
        let retry_at = cb.next_retry_timestamp_ms();
        while utils::curr_time_millis() < retry_at {
            utils::sleep_for_ms(retry_at - utils::curr_time_millis());
        }
        // admitted for recovery, then another checker refuses the invocation
        assert!(manager.degrade_check("abc", "").is_ok());
        manager.degrade_record("abc", 0, None, true);
        assert_eq!(cb.current_state(), State::HalfOpen);
        assert!(manager.degrade_check("abc", "").is_err());

        let deadline = cb.next_retry_timestamp_ms();
        while utils::curr_time_millis() < deadline {
            utils::sleep_for_ms(deadline - utils::curr_time_millis());
        }
        let mut passed = 0;
        for _ in 0..100 {
            if manager.degrade_check("abc", "").is_ok() {
                passed += 1;
            }
        }
        assert_eq!(passed, 1);
        manager.degrade_record("abc", 1, None, false);
        assert_eq!(cb.current_state(), State::Closed);
        assert!(manager.degrade_check("abc", "").is_ok());
    }

    #[test]
    fn degrade_record_skips_blocked() {
        let manager = RuleManager::new();
        manager
            .load_rules(vec![error_count_rule("abc", LIMIT_APP_DEFAULT)])
            .unwrap();
        let err = Error::msg("biz error");
        manager.degrade_record("abc", 1, Some(&err), true);
        let cb = manager.get_breakers_of_resource("abc").remove(0);
        assert_eq!(cb.current_state(), State::Closed);
        assert_eq!(cb.stat().current_aggregate().total, 0);
        manager.degrade_record("abc", 1, Some(&err), false);
        assert_eq!(cb.current_state(), State::Open);
    }
}
