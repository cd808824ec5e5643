//! Operating parameters for starting a session.
//!
//! Parameters are plain serde structs so the same types serve both the
//! programmatic API and the `[server]` / `[client]` sections of the TOML
//! configuration. A session copies what it needs at start; changing a value
//! afterwards has no effect on the running session.

use serde::{Deserialize, Serialize};
use srtnet_x::{
    SocketOption, LIVE_MAX_PAYLOAD, PASSPHRASE_KEY_LEN, PASSPHRASE_MAX_LEN, PASSPHRASE_MIN_LEN,
};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::SessionError;

/// Link tuning shared by server and client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkParams {
    /// Reorder window in packets before a gap is reported as loss.
    ///
    /// Default: 16
    pub reorder: u32,

    /// Latency budget in milliseconds. Data older than this is dropped.
    ///
    /// Default: 1000
    pub latency_ms: u64,

    /// Retransmission bandwidth overhead in percent (5..=100).
    ///
    /// Default: 100
    pub overhead_percent: u32,

    /// Maximum payload per message in bytes (1..=1456).
    ///
    /// Default: 1456
    pub mtu: usize,

    /// Silence in milliseconds before the peer is declared gone.
    ///
    /// Default: 5000
    pub peer_idle_timeout_ms: u64,

    /// Pre-shared key. Empty disables encryption.
    pub psk: String,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            reorder: 16,
            latency_ms: 1000,
            overhead_percent: 100,
            mtu: LIVE_MAX_PAYLOAD,
            peer_idle_timeout_ms: srtnet_x::DEFAULT_PEER_IDLE_TIMEOUT.as_millis() as u64,
            psk: String::new(),
        }
    }
}

impl LinkParams {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.mtu == 0 || self.mtu > LIVE_MAX_PAYLOAD {
            errors.push(format!(
                "mtu {} outside 1..={}",
                self.mtu, LIVE_MAX_PAYLOAD
            ));
        }
        if !(5..=100).contains(&self.overhead_percent) {
            errors.push(format!(
                "overhead_percent {} outside 5..=100",
                self.overhead_percent
            ));
        }
        if !self.psk.is_empty()
            && !(PASSPHRASE_MIN_LEN..=PASSPHRASE_MAX_LEN).contains(&self.psk.len())
        {
            errors.push(format!(
                "psk must be empty or {}..={} characters, got {}",
                PASSPHRASE_MIN_LEN,
                PASSPHRASE_MAX_LEN,
                self.psk.len()
            ));
        }
        if self.peer_idle_timeout_ms == 0 {
            errors.push("peer_idle_timeout_ms must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Socket options in the order they are applied before bind/connect.
    pub fn socket_options(&self) -> Vec<SocketOption> {
        let mut options = vec![
            SocketOption::ReceiveBlocking(true),
            SocketOption::LossMaxTtl(self.reorder),
            SocketOption::Latency(Duration::from_millis(self.latency_ms)),
            SocketOption::OverheadBandwidth(self.overhead_percent),
            SocketOption::PayloadSize(self.mtu),
        ];
        if !self.psk.is_empty() {
            options.push(SocketOption::KeyLength(PASSPHRASE_KEY_LEN));
            options.push(SocketOption::Passphrase(self.psk.clone()));
        }
        options.push(SocketOption::PeerIdleTimeout(Duration::from_millis(
            self.peer_idle_timeout_ms,
        )));
        options
    }
}

/// Parameters for [`Session::start_server`](crate::Session::start_server).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerParams {
    /// IP literal to listen on. `0.0.0.0` or `::` for all interfaces.
    pub host: String,

    /// Port to listen on. `0` auto-assigns.
    pub port: u16,

    /// Admit one peer, then stop listening.
    pub single_sender: bool,

    pub link: LinkParams,
}

impl Default for ServerParams {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8009,
            single_sender: false,
            link: LinkParams::default(),
        }
    }
}

impl ServerParams {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.host.parse::<IpAddr>().is_err() {
            errors.push(format!("Invalid host address: {}", self.host));
        }
        if let Err(e) = self.link.validate() {
            errors.extend(e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Listen address. Only IP literals are accepted.
    pub fn socket_addr(&self) -> Result<SocketAddr, SessionError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| SessionError::InvalidAddress(self.host.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Parameters for [`Session::start_client`](crate::Session::start_client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientParams {
    /// Server host name or IP literal.
    pub host: String,

    pub port: u16,

    /// Optional local IP to bind before connecting.
    pub local_host: Option<String>,

    /// Local port when `local_host` is set. `0` auto-assigns.
    pub local_port: u16,

    pub link: LinkParams,
}

impl Default for ClientParams {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8009,
            local_host: None,
            local_port: 0,
            link: LinkParams::default(),
        }
    }
}

impl ClientParams {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.host.trim().is_empty() {
            errors.push("host must not be empty".to_string());
        }
        if self.port == 0 {
            errors.push("port must be > 0".to_string());
        }
        if let Some(local) = &self.local_host {
            if local.parse::<IpAddr>().is_err() {
                errors.push(format!("Invalid local host address: {}", local));
            }
        }
        if let Err(e) = self.link.validate() {
            errors.extend(e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Local bind address, if one was requested.
    pub fn local_addr(&self) -> Result<Option<SocketAddr>, SessionError> {
        match &self.local_host {
            None => Ok(None),
            Some(host) => {
                let ip: IpAddr = host
                    .parse()
                    .map_err(|_| SessionError::InvalidAddress(host.clone()))?;
                Ok(Some(SocketAddr::new(ip, self.local_port)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(LinkParams::default().validate().is_ok());
        assert!(ServerParams::default().validate().is_ok());
        assert!(ClientParams::default().validate().is_ok());
        assert_eq!(LinkParams::default().peer_idle_timeout_ms, 5000);
    }

    #[test]
    fn test_mtu_bounds() {
        let mut link = LinkParams {
            mtu: 0,
            ..LinkParams::default()
        };
        assert!(link.validate().is_err());
        link.mtu = LIVE_MAX_PAYLOAD + 1;
        assert!(link.validate().is_err());
        link.mtu = 1;
        assert!(link.validate().is_ok());
    }

    #[test]
    fn test_psk_length_rule() {
        let mut link = LinkParams {
            psk: "too-short".to_string(),
            ..LinkParams::default()
        };
        let errors = link.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("psk")));

        link.psk = "Th1$_is_4n_0pt10N4L_P$k".to_string();
        assert!(link.validate().is_ok());

        link.psk = "x".repeat(80);
        assert!(link.validate().is_err());
    }

    #[test]
    fn test_passphrase_options_only_with_psk() {
        let plain = LinkParams::default().socket_options();
        assert!(!plain
            .iter()
            .any(|o| matches!(o, SocketOption::Passphrase(_) | SocketOption::KeyLength(_))));

        let secured = LinkParams {
            psk: "0123456789".to_string(),
            ..LinkParams::default()
        }
        .socket_options();
        assert!(secured.contains(&SocketOption::KeyLength(16)));
        assert!(secured.contains(&SocketOption::Passphrase("0123456789".to_string())));
    }

    #[test]
    fn test_server_host_must_be_ip_literal() {
        let params = ServerParams::new("localhost", 8009);
        assert!(params.validate().is_err());
        assert!(matches!(
            params.socket_addr(),
            Err(SessionError::InvalidAddress(_))
        ));
        assert_eq!(
            ServerParams::new("::1", 0).socket_addr().unwrap(),
            "[::1]:0".parse().unwrap()
        );
    }

    #[test]
    fn test_client_local_bind() {
        let mut params = ClientParams::new("127.0.0.1", 8009);
        assert_eq!(params.local_addr().unwrap(), None);
        params.local_host = Some("127.0.0.1".to_string());
        params.local_port = 9100;
        assert_eq!(
            params.local_addr().unwrap(),
            Some("127.0.0.1:9100".parse().unwrap())
        );
    }
}
