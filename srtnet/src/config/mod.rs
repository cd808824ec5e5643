//! Demo configuration module.
//!
//! The binary runs a server and a set of clients against each other. Its
//! configuration composes the global settings with the same parameter structs
//! the session API takes.
//!
//! # Example
//!
//! ```toml
//! [global.logging]
//! level = "debug"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8009
//!
//! [server.link]
//! psk = "Th1$_is_4n_0pt10N4L_P$k"
//!
//! [client]
//! host = "127.0.0.1"
//! port = 8009
//!
//! [client.link]
//! psk = "Th1$_is_4n_0pt10N4L_P$k"
//!
//! [demo]
//! clients = 3
//! packets = 20
//! ```

pub mod global;
pub mod loader;
pub mod validation;

#[cfg(test)]
mod tests;

pub use global::{GlobalConfig, LogLevel, LoggingConfig};
pub use loader::{load_config, resolve_config, CliArgs};
pub use validation::ConfigValidator;

use serde::{Deserialize, Serialize};

use crate::params::{ClientParams, ServerParams};

/// Top-level configuration for the demo binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Logging and telemetry
    pub global: GlobalConfig,

    /// Server session parameters
    pub server: ServerParams,

    /// Parameters shared by every demo client
    pub client: ClientParams,

    /// Traffic pattern
    pub demo: DemoSettings,
}

/// Traffic the demo generates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    /// Number of client sessions.
    ///
    /// **Default:** `3`
    pub clients: usize,

    /// Packets each client sends.
    ///
    /// **Default:** `10`
    pub packets: usize,

    /// Payload size of each packet in bytes.
    ///
    /// **Default:** `1000`
    pub packet_size: usize,

    /// Pause between rounds of packets in milliseconds.
    ///
    /// **Default:** `10`
    pub interval_ms: u64,

    /// Server echoes every n-th packet of a client back. `0` never echoes.
    ///
    /// **Default:** `2`
    pub echo_every: usize,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            clients: 3,
            packets: 10,
            packet_size: 1000,
            interval_ms: 10,
            echo_every: 2,
        }
    }
}

impl DemoSettings {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.clients == 0 {
            errors.push("demo.clients must be > 0".to_string());
        }
        if self.clients > 1000 {
            errors.push("demo.clients is unreasonably high (> 1000)".to_string());
        }
        if self.packet_size == 0 {
            errors.push("demo.packet_size must be > 0".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl DemoConfig {
    /// Validate the entire configuration.
    ///
    /// Section errors are prefixed with the section name. Cross-section
    /// mismatches that still allow a run are logged as warnings by
    /// [`ConfigValidator`].
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = self.global.validate() {
            errors.extend(e);
        }
        if let Err(e) = self.server.validate() {
            errors.extend(e.into_iter().map(|err| format!("server: {}", err)));
        }
        if let Err(e) = self.client.validate() {
            errors.extend(e.into_iter().map(|err| format!("client: {}", err)));
        }
        if let Err(e) = self.demo.validate() {
            errors.extend(e);
        }

        if self.demo.packet_size > self.client.link.mtu {
            errors.push(format!(
                "demo.packet_size ({}) exceeds client.link.mtu ({})",
                self.demo.packet_size, self.client.link.mtu
            ));
        }
        if self.server.single_sender && self.demo.clients > 1 {
            errors.push(format!(
                "server.single_sender admits one client but demo.clients is {}",
                self.demo.clients
            ));
        }

        if let Err(warnings) = ConfigValidator::validate(self) {
            for warning in warnings {
                tracing::warn!("{}", warning);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
