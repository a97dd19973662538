pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod security;
pub mod services;
pub mod storage;
pub mod utils;
pub mod validation;
pub mod web;

pub use error::{Error, Result};

// Declare tests module only when testing
#[cfg(test)]
pub mod tests;
