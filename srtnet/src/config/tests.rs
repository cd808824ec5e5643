//! Tests for the configuration module.
//!
//! Tests cover:
//! - Default values
//! - Section and cross-section validation
//! - TOML loading and CLI precedence

#[cfg(test)]
mod global_config_tests {
    use crate::config::global::{GlobalConfig, LogLevel, LoggingConfig};

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert!(!config.json_format);
        assert!(config.enable_colors);
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("TRACE".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_level_display_round_trips_through_filter_syntax() {
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            assert_eq!(level.to_string().parse::<LogLevel>().unwrap(), level);
        }
    }

    #[test]
    fn test_global_config_rejects_empty_service_name() {
        let mut config = GlobalConfig::default();
        assert!(config.validate().is_ok());
        config.telemetry.service_name = "  ".to_string();
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("service_name")));
    }
}

#[cfg(test)]
mod demo_config_tests {
    use crate::config::{DemoConfig, DemoSettings};

    #[test]
    fn test_demo_settings_default() {
        let settings = DemoSettings::default();
        assert_eq!(settings.clients, 3);
        assert_eq!(settings.packet_size, 1000);
        assert_eq!(settings.echo_every, 2);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = DemoConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8009);
        assert_eq!(config.client.port, 8009);
    }

    #[test]
    fn test_zero_clients_rejected() {
        let mut config = DemoConfig::default();
        config.demo.clients = 0;
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("demo.clients")));
    }

    #[test]
    fn test_packet_larger_than_mtu_rejected() {
        let mut config = DemoConfig::default();
        config.client.link.mtu = 500;
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("packet_size")));
    }

    #[test]
    fn test_single_sender_needs_one_client() {
        let mut config = DemoConfig::default();
        config.server.single_sender = true;
        assert!(config.validate().is_err());
        config.demo.clients = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_section_errors_are_prefixed() {
        let mut config = DemoConfig::default();
        config.server.host = "example.org".to_string();
        config.client.port = 0;
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.starts_with("server: ")));
        assert!(errors.iter().any(|e| e.starts_with("client: ")));
    }
}

#[cfg(test)]
mod validation_tests {
    use crate::config::{ConfigValidator, DemoConfig};

    #[test]
    fn test_consistent_config_has_no_findings() {
        let config = DemoConfig::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_psk_mismatch_is_reported() {
        let mut config = DemoConfig::default();
        config.server.link.psk = "Th1$_is_4n_0pt10N4L_P$k".to_string();
        let findings = ConfigValidator::validate(&config).unwrap_err();
        assert!(findings.iter().any(|f| f.contains("psk")));

        // A mismatch is a warning, not a hard error.
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_port_mismatch_is_reported() {
        let mut config = DemoConfig::default();
        config.client.port = 9000;
        let findings = ConfigValidator::validate(&config).unwrap_err();
        assert!(findings.iter().any(|f| f.contains("9000")));
    }

    #[test]
    fn test_auto_port_server_skips_port_check() {
        let mut config = DemoConfig::default();
        config.server.port = 0;
        config.client.port = 9000;
        assert!(ConfigValidator::validate(&config).is_ok());
    }
}

#[cfg(test)]
mod loader_tests {
    use std::io::Write;

    use clap::Parser;
    use tempfile::NamedTempFile;

    use crate::config::{resolve_config, CliArgs, DemoConfig, LogLevel};

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["srtnet"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn test_cli_defaults() {
        let cli = args(&[]);
        assert_eq!(cli.config, "srtnet.toml");
        assert!(cli.host.is_none());
        assert!(!cli.validate);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let cli = args(&["--config", "/nonexistent/srtnet.toml"]);
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.server.port, 8009);
        assert_eq!(config.demo.clients, 3);
    }

    #[test]
    fn test_file_values_are_loaded() {
        let file = write_config(
            r#"
[global.logging]
level = "debug"

[server]
host = "127.0.0.1"
port = 9100

[server.link]
latency_ms = 120

[client]
port = 9100

[demo]
clients = 2
packets = 5
"#,
        );
        let path = file.path().to_string_lossy().to_string();
        let config = resolve_config(&args(&["--config", &path])).unwrap();

        assert_eq!(config.global.logging.level, LogLevel::Debug);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.link.latency_ms, 120);
        assert_eq!(config.server.link.mtu, 1456);
        assert_eq!(config.client.host, "127.0.0.1");
        assert_eq!(config.demo.clients, 2);
        assert_eq!(config.demo.packets, 5);
        assert_eq!(config.demo.packet_size, 1000);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = write_config(
            r#"
[server]
port = 9100

[demo]
clients = 2
"#,
        );
        let path = file.path().to_string_lossy().to_string();
        let config = resolve_config(&args(&[
            "--config",
            &path,
            "--port",
            "9200",
            "--host",
            "127.0.0.1",
            "--clients",
            "4",
            "--log-level",
            "trace",
        ]))
        .unwrap();

        assert_eq!(config.server.port, 9200);
        assert_eq!(config.client.port, 9200);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.client.host, "127.0.0.1");
        assert_eq!(config.demo.clients, 4);
        assert_eq!(config.global.logging.level, LogLevel::Trace);
    }

    #[test]
    fn test_invalid_log_level_is_ignored() {
        let config = resolve_config(&args(&[
            "--config",
            "/nonexistent/srtnet.toml",
            "--log-level",
            "loud",
        ]))
        .unwrap();
        assert_eq!(config.global.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let file = write_config("[server\nport = ");
        let path = file.path().to_string_lossy().to_string();
        let err = resolve_config(&args(&["--config", &path])).unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML config"));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let file = write_config(
            r#"
[client.link]
mtu = 4000
"#,
        );
        let path = file.path().to_string_lossy().to_string();
        let err = resolve_config(&args(&["--config", &path])).unwrap_err();
        assert!(err.to_string().contains("Configuration validation failed"));
    }

    #[test]
    fn test_default_config_serializes_to_loadable_toml() {
        let text = toml::to_string_pretty(&DemoConfig::default()).unwrap();
        let file = write_config(&text);
        let path = file.path().to_string_lossy().to_string();
        let config = resolve_config(&args(&["--config", &path])).unwrap();
        assert_eq!(config.server, DemoConfig::default().server);
        assert_eq!(config.demo, DemoConfig::default().demo);
    }
}
