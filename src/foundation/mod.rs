/// Bridge and server configuration.
pub mod config;
/// Error taxonomy and exit/status code mapping.
pub mod error;
