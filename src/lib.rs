//! Portmapper - UPnP Internet Gateway Device port mapping
//!
//! This library discovers Internet Gateway Devices (home routers) on the local
//! network and manages their NAT port mappings: add, remove, enumerate, query
//! the external IP, and resolve the local host's address as seen by the router.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod model;
pub mod router;

pub use config::DiscoveryConfig;
pub use model::{PortMapping, Protocol};
pub use router::{DeviceRouter, IgdRouterFactory, Router, RouterFactory};

use std::error::Error as StdError;

/// Result type alias for router operations
pub type Result<T> = std::result::Result<T, RouterError>;

/// The single failure type of every discovery, connection and control operation
///
/// The message names the operation and its target; the underlying device or
/// I/O failure, if any, is available through [`std::error::Error::source`].
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct RouterError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl RouterError {
    /// Create an error without an underlying cause
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The human-readable message, without the cause chain
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Initialize logging with the default formatting subscriber
pub fn init() {
    tracing_subscriber::fmt::init();
}

#[cfg(test)]
mod tests;
