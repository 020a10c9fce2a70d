/// The `stat` mod implements the basic statistic data structures,
/// such as the sliding window and its underlying LeapArray
mod base;

pub use base::*;
