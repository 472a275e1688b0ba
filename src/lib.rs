//! A small blocking HTTP client.
//!
//! [`HttpRequestClient`] keeps a User-Agent, extra header lines, a proxy, a
//! redirect policy and a TLS verification flag, and performs `GET`/`POST`
//! requests returning the response header lines and raw body.

pub mod agent;
pub mod client;
pub mod error;
pub mod negotiators;
pub mod options;
pub mod proxy;
pub mod transport;

pub use agent::{AgentPreset, DESKTOP_AGENT, MOBILE_AGENT};
pub use client::{HttpRequestClient, COMPRESSION_HEADER};
pub use error::{Error, Result};
pub use options::{OptionValue, RequestOption};
pub use proxy::{Proxy, ProxyType};
pub use transport::{HyperTransport, PreparedRequest, Response, Transport};

/// Initializes the logging system for the application.
///
/// # Arguments
///
/// * `log_level`: The desired verbosity level for logging.
///
/// # Returns
///
/// A result indicating the success or failure of the logging setup.
#[cfg(feature = "log")]
pub fn initialize_logging(log_level: log::LevelFilter) -> anyhow::Result<()> {
    stderrlog::new()
        .module(module_path!()) // Configures the module path for log messages.
        .show_module_names(true) // Enables module names in log output.
        .verbosity(log_level) // Sets the specified log verbosity level.
        .init()?; // Initializes the logger.
    Ok(())
}
