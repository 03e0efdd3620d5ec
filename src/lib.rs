pub mod cli;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod matrix;
pub mod metrics;
pub mod reference;
pub mod service;
pub mod tags;
pub mod template;

pub use error::{Error, Result};
