#[macro_use]
extern crate lazy_static;

pub mod ci;
pub mod client;
pub mod config;
pub mod github;
pub mod processing;

pub use processing::{Director, RunSummary};
