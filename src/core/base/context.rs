//! Context
//!
use super::{TokenResult, DEFAULT_ORIGIN};
use crate::utils::curr_time_millis;
use crate::{logging, Error, Result};

/// Hook executed when the invocation owning the context exits.
pub type ExitHandler = Box<dyn FnOnce(&EntryContext) -> Result<()> + Send + Sync>;

/// `EntryContext` carries the state of one invocation on a resource,
/// from the rule checking at entry until the statistics at exit.
pub struct EntryContext {
    /// Use to calculate RT
    start_time: u64,
    /// The round trip time of this transaction
    round_trip: u64,
    resource: String,
    /// the caller tag, matched against `limit_app` of rules
    origin: String,
    /// the result of rule slots check
    rule_check_result: TokenResult,
    err: Option<Error>,
    exit_handlers: Vec<ExitHandler>,
}

impl std::fmt::Debug for EntryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryContext")
            .field("start_time", &self.start_time)
            .field("round_trip", &self.round_trip)
            .field("resource", &self.resource)
            .field("origin", &self.origin)
            .field("rule_check_result", &self.rule_check_result)
            .field("err", &self.err)
            .field("exit_handlers", &self.exit_handlers.len())
            .finish()
    }
}

impl Default for EntryContext {
    fn default() -> Self {
        EntryContext {
            start_time: 0,
            round_trip: 0,
            resource: String::new(),
            origin: DEFAULT_ORIGIN.into(),
            rule_check_result: TokenResult::default(),
            err: None,
            exit_handlers: Vec::new(),
        }
    }
}

impl EntryContext {
    pub fn new() -> Self {
        EntryContext {
            start_time: curr_time_millis(),
            ..Default::default()
        }
    }

    pub fn set_start_time(&mut self, start_time: u64) {
        self.start_time = start_time;
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn is_blocked(&self) -> bool {
        self.rule_check_result.is_blocked()
    }

    pub fn set_round_trip(&mut self, round_trip: u64) {
        self.round_trip = round_trip
    }

    pub fn round_trip(&self) -> u64 {
        self.round_trip
    }

    /// Fill the round trip time from `now`, unless it has been set explicitly.
    pub fn calculate_round_trip(&mut self, now: u64) {
        if self.round_trip == 0 {
            self.round_trip = now.saturating_sub(self.start_time);
        }
    }

    pub fn set_resource(&mut self, resource: String) {
        self.resource = resource;
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn set_origin(&mut self, origin: String) {
        self.origin = origin;
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn set_result(&mut self, result: TokenResult) {
        self.rule_check_result = result;
    }

    pub fn reset_result_to_pass(&mut self) {
        self.rule_check_result.reset_to_pass();
    }

    pub fn result(&self) -> &TokenResult {
        &self.rule_check_result
    }

    pub fn set_err(&mut self, err: Error) {
        self.err = Some(err);
    }

    pub fn get_err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Register a hook to run when the invocation exits, whether it passed or not.
    pub fn when_exit(&mut self, handler: ExitHandler) {
        self.exit_handlers.push(handler);
    }

    /// Run and drain the registered exit hooks. Failures are logged and do not stop other hooks.
    pub fn run_exit_handlers(&mut self) {
        let handlers = std::mem::take(&mut self.exit_handlers);
        for handler in handlers {
            if let Err(err) = handler(&*self) {
                logging::error!(
                    "[EntryContext] Fail to execute exit handler, resource: {}, reason: {:?}",
                    self.resource,
                    err
                );
            }
        }
    }
}
