#![allow(clippy::derive_partial_eq_without_eq)]

mod active;
pub mod calculator;
pub mod call;
pub mod config;
pub mod demo;
pub mod error;
pub mod executor;
pub mod greet;
pub mod logging;
pub mod proto;
pub mod streaming;
pub mod transport;

#[macro_use]
extern crate log;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
