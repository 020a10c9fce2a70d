use super::LIMIT_APP_DEFAULT;
use crate::Result;
use std::fmt;

/// `SentinelRule` is the common behavior of rules that could block an invocation.
pub trait SentinelRule: fmt::Debug + Send + Sync {
    fn resource_name(&self) -> String;

    /// the caller scope this rule takes effect on
    fn limit_app(&self) -> String {
        LIMIT_APP_DEFAULT.into()
    }

    fn is_valid(&self) -> Result<()> {
        Ok(())
    }
}
