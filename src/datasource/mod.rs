//! Rule sources: converting raw rule payloads into rules, and pushing them
//! to a rule manager directly or through a `DynamicProperty`.
pub mod adapters;
pub mod dynamic;
pub mod helpers;
pub mod property;

pub use adapters::*;
pub use dynamic::*;
pub use helpers::*;
pub use property::*;

use crate::base::SentinelRule;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
