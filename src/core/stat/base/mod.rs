mod leap_array;

pub use leap_array::*;
