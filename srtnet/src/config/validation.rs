//! Cross-section configuration checks.
//!
//! Each section validates itself. The checks here compare server and client
//! settings that are individually valid but unlikely to work together.

use super::DemoConfig;

/// Configuration validator trait.
pub trait ConfigValidator {
    /// Returns `Ok(())` if consistent, or a list of findings.
    fn validate(&self) -> Result<(), Vec<String>>;
}

impl ConfigValidator for DemoConfig {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut warnings = Vec::new();

        if self.server.link.psk != self.client.link.psk {
            warnings.push(
                "server.link.psk and client.link.psk differ; clients will be rejected".to_string(),
            );
        }

        if self.server.port != 0 && self.client.port != self.server.port {
            warnings.push(format!(
                "client.port ({}) differs from server.port ({})",
                self.client.port, self.server.port
            ));
        }

        if self.client.link.mtu != self.server.link.mtu {
            warnings.push(format!(
                "client.link.mtu ({}) differs from server.link.mtu ({}); echoes above {} bytes will fail",
                self.client.link.mtu,
                self.server.link.mtu,
                self.server.link.mtu.min(self.client.link.mtu)
            ));
        }

        if warnings.is_empty() {
            Ok(())
        } else {
            Err(warnings)
        }
    }
}
