use super::{BlockType, SentinelRule};
use std::error;
use std::fmt;
use std::sync::Arc;

/// `BlockError` indicates the request was blocked by Sentinel.
/// It carries enough context (the resource, the caller scope and the triggered rule)
/// to be handled without inspecting any backtrace.
#[derive(Debug, Clone, Default)]
pub struct BlockError {
    block_type: BlockType,
    /// additional message for the block error
    block_msg: String,
    resource: String,
    limit_app: String,
    rule: Option<Arc<dyn SentinelRule>>,
    /// the triggered "snapshot" value, e.g. the slow request ratio when the breaker opened
    snapshot_value: Option<f64>,
}

impl PartialEq for BlockError {
    fn eq(&self, other: &BlockError) -> bool {
        self.block_type == other.block_type
            && self.block_msg == other.block_msg
            && self.resource == other.resource
    }
}

impl BlockError {
    pub fn new(block_type: BlockType) -> Self {
        Self {
            block_type,
            ..Self::default()
        }
    }

    pub fn new_with_msg(block_type: BlockType, block_msg: String) -> Self {
        Self {
            block_type,
            block_msg,
            ..Self::default()
        }
    }

    pub fn new_with_cause(
        block_type: BlockType,
        block_msg: String,
        rule: Arc<dyn SentinelRule>,
        snapshot_value: Option<f64>,
    ) -> Self {
        Self {
            block_type,
            block_msg,
            resource: rule.resource_name(),
            limit_app: rule.limit_app(),
            rule: Some(rule),
            snapshot_value,
        }
    }

    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    pub fn block_msg(&self) -> String {
        self.block_msg.clone()
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn limit_app(&self) -> &str {
        &self.limit_app
    }

    pub fn triggered_rule(&self) -> Option<Arc<dyn SentinelRule>> {
        self.rule.clone()
    }

    pub fn triggered_value(&self) -> Option<f64> {
        self.snapshot_value
    }
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.block_msg.is_empty() {
            write!(f, "SentinelBlockError: {}", self.block_type)?;
        } else {
            write!(
                f,
                "SentinelBlockError: {}, message: {}",
                self.block_type, self.block_msg
            )?;
        }
        if !self.resource.is_empty() {
            write!(
                f,
                ", resource: {}, limit_app: {}",
                self.resource, self.limit_app
            )?;
        }
        Ok(())
    }
}

impl error::Error for BlockError {}
