pub mod base;
pub mod circuitbreaker;
pub mod config;
pub mod stat;
