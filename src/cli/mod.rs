//! CLI argument parsing and processing

pub mod args;
pub mod process;

pub use args::{Args, LogFormat, SecretString};
pub use process::build_request;
