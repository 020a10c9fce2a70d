/// `limit_app` value meaning the rule applies to every caller.
pub const LIMIT_APP_DEFAULT: &str = "default";
/// Caller tag used when the invocation does not carry one.
pub const DEFAULT_ORIGIN: &str = "";
