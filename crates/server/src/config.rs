//! Layered configuration: defaults -> JSON config file -> environment ->
//! direct flags, highest precedence winning per field.
//!
//! Environment variables use the `MIKROSCOPE_` prefix
//! (`MIKROSCOPE_PORT`, `MIKROSCOPE_DB_PATH`, ...); flags use kebab-case
//! (`--port`, `--db-path`, ...).

use crate::alerts::AlertPolicy;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8686;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1_048_576;
pub const DEFAULT_INGEST_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_QUEUE_FLUSH_MS: u64 = 250;
pub const DEFAULT_MIN_FREE_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    pub logs_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    pub api_token: Option<String>,
    pub auth_username: Option<String>,
    pub auth_password: Option<String>,
    pub cors_allow_origin: String,
    /// `token -> producerId`
    pub ingest_producers: HashMap<String, String>,
    pub ingest_max_body_bytes: usize,
    pub ingest_interval_ms: u64,
    pub disable_auto_ingest: bool,
    pub ingest_async_queue: bool,
    pub ingest_queue_flush_ms: u64,
    pub db_retention_days: i64,
    pub db_audit_retention_days: i64,
    pub log_retention_days: i64,
    pub log_audit_retention_days: i64,
    pub maintenance_interval_ms: u64,
    pub min_free_bytes: u64,
    pub audit_backup_directory: Option<PathBuf>,
    pub alert_config_path: Option<PathBuf>,
    pub alert_enabled: Option<bool>,
    pub alert_webhook_url: Option<String>,
    pub alert_interval_ms: Option<u64>,
    pub alert_window_minutes: Option<u64>,
    pub alert_error_threshold: Option<u64>,
    pub alert_no_logs_threshold_minutes: Option<u64>,
    pub alert_cooldown_ms: Option<u64>,
    pub alert_webhook_timeout_ms: Option<u64>,
    pub alert_webhook_retry_attempts: Option<u32>,
    pub alert_webhook_backoff_ms: Option<u64>,
}

/// One configuration layer; `Some` wins over the layer below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct PartialConfig {
    db_path: Option<String>,
    logs_path: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    protocol: Option<String>,
    tls_cert_path: Option<String>,
    tls_key_path: Option<String>,
    api_token: Option<String>,
    auth_username: Option<String>,
    auth_password: Option<String>,
    cors_allow_origin: Option<String>,
    ingest_producers: Option<String>,
    ingest_max_body_bytes: Option<usize>,
    ingest_interval_ms: Option<u64>,
    disable_auto_ingest: Option<bool>,
    ingest_async_queue: Option<bool>,
    ingest_queue_flush_ms: Option<u64>,
    db_retention_days: Option<i64>,
    db_audit_retention_days: Option<i64>,
    log_retention_days: Option<i64>,
    log_audit_retention_days: Option<i64>,
    maintenance_interval_ms: Option<u64>,
    min_free_bytes: Option<u64>,
    audit_backup_directory: Option<String>,
    alert_config_path: Option<String>,
    alert_enabled: Option<bool>,
    alert_webhook_url: Option<String>,
    alert_interval_ms: Option<u64>,
    alert_window_minutes: Option<u64>,
    alert_error_threshold: Option<u64>,
    alert_no_logs_threshold_minutes: Option<u64>,
    alert_cooldown_ms: Option<u64>,
    alert_webhook_timeout_ms: Option<u64>,
    alert_webhook_retry_attempts: Option<u32>,
    alert_webhook_backoff_ms: Option<u64>,
}

impl PartialConfig {
    fn overlay(&mut self, other: PartialConfig) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            db_path,
            logs_path,
            host,
            port,
            protocol,
            tls_cert_path,
            tls_key_path,
            api_token,
            auth_username,
            auth_password,
            cors_allow_origin,
            ingest_producers,
            ingest_max_body_bytes,
            ingest_interval_ms,
            disable_auto_ingest,
            ingest_async_queue,
            ingest_queue_flush_ms,
            db_retention_days,
            db_audit_retention_days,
            log_retention_days,
            log_audit_retention_days,
            maintenance_interval_ms,
            min_free_bytes,
            audit_backup_directory,
            alert_config_path,
            alert_enabled,
            alert_webhook_url,
            alert_interval_ms,
            alert_window_minutes,
            alert_error_threshold,
            alert_no_logs_threshold_minutes,
            alert_cooldown_ms,
            alert_webhook_timeout_ms,
            alert_webhook_retry_attempts,
            alert_webhook_backoff_ms,
        );
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|v| v.parse().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    env_string(name).map(|v| matches!(v.as_str(), "true" | "1"))
}

fn env_layer() -> PartialConfig {
    PartialConfig {
        db_path: env_string("MIKROSCOPE_DB_PATH"),
        logs_path: env_string("MIKROSCOPE_LOGS_PATH"),
        host: env_string("MIKROSCOPE_HOST"),
        port: env_parse("MIKROSCOPE_PORT"),
        protocol: env_string("MIKROSCOPE_PROTOCOL"),
        tls_cert_path: env_string("MIKROSCOPE_TLS_CERT_PATH"),
        tls_key_path: env_string("MIKROSCOPE_TLS_KEY_PATH"),
        api_token: env_string("MIKROSCOPE_API_TOKEN"),
        auth_username: env_string("MIKROSCOPE_AUTH_USERNAME"),
        auth_password: env_string("MIKROSCOPE_AUTH_PASSWORD"),
        cors_allow_origin: env_string("MIKROSCOPE_CORS_ALLOW_ORIGIN"),
        ingest_producers: env_string("MIKROSCOPE_INGEST_PRODUCERS"),
        ingest_max_body_bytes: env_parse("MIKROSCOPE_INGEST_MAX_BODY_BYTES"),
        ingest_interval_ms: env_parse("MIKROSCOPE_INGEST_INTERVAL_MS"),
        disable_auto_ingest: env_bool("MIKROSCOPE_DISABLE_AUTO_INGEST"),
        ingest_async_queue: env_bool("MIKROSCOPE_INGEST_ASYNC_QUEUE"),
        ingest_queue_flush_ms: env_parse("MIKROSCOPE_INGEST_QUEUE_FLUSH_MS"),
        db_retention_days: env_parse("MIKROSCOPE_DB_RETENTION_DAYS"),
        db_audit_retention_days: env_parse("MIKROSCOPE_DB_AUDIT_RETENTION_DAYS"),
        log_retention_days: env_parse("MIKROSCOPE_LOG_RETENTION_DAYS"),
        log_audit_retention_days: env_parse("MIKROSCOPE_LOG_AUDIT_RETENTION_DAYS"),
        maintenance_interval_ms: env_parse("MIKROSCOPE_MAINTENANCE_INTERVAL_MS"),
        min_free_bytes: env_parse("MIKROSCOPE_MIN_FREE_BYTES"),
        audit_backup_directory: env_string("MIKROSCOPE_AUDIT_BACKUP_DIRECTORY"),
        alert_config_path: env_string("MIKROSCOPE_ALERT_CONFIG_PATH"),
        alert_enabled: env_bool("MIKROSCOPE_ALERT_ENABLED"),
        alert_webhook_url: env_string("MIKROSCOPE_ALERT_WEBHOOK_URL"),
        alert_interval_ms: env_parse("MIKROSCOPE_ALERT_INTERVAL_MS"),
        alert_window_minutes: env_parse("MIKROSCOPE_ALERT_WINDOW_MINUTES"),
        alert_error_threshold: env_parse("MIKROSCOPE_ALERT_ERROR_THRESHOLD"),
        alert_no_logs_threshold_minutes: env_parse("MIKROSCOPE_ALERT_NO_LOGS_THRESHOLD_MINUTES"),
        alert_cooldown_ms: env_parse("MIKROSCOPE_ALERT_COOLDOWN_MS"),
        alert_webhook_timeout_ms: env_parse("MIKROSCOPE_ALERT_WEBHOOK_TIMEOUT_MS"),
        alert_webhook_retry_attempts: env_parse("MIKROSCOPE_ALERT_WEBHOOK_RETRY_ATTEMPTS"),
        alert_webhook_backoff_ms: env_parse("MIKROSCOPE_ALERT_WEBHOOK_BACKOFF_MS"),
    }
}

pub fn flag_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn flag_parse<T: std::str::FromStr>(args: &[String], name: &str) -> Option<T> {
    flag_value(args, name).and_then(|v| v.parse().ok())
}

fn flag_present(args: &[String], name: &str) -> Option<bool> {
    args.iter().any(|a| a == name).then_some(true)
}

fn flags_layer(args: &[String]) -> PartialConfig {
    PartialConfig {
        db_path: flag_value(args, "--db-path"),
        logs_path: flag_value(args, "--logs-path"),
        host: flag_value(args, "--host"),
        port: flag_parse(args, "--port"),
        protocol: flag_value(args, "--protocol"),
        tls_cert_path: flag_value(args, "--tls-cert-path"),
        tls_key_path: flag_value(args, "--tls-key-path"),
        api_token: flag_value(args, "--api-token"),
        auth_username: flag_value(args, "--auth-username"),
        auth_password: flag_value(args, "--auth-password"),
        cors_allow_origin: flag_value(args, "--cors-allow-origin"),
        ingest_producers: flag_value(args, "--ingest-producers"),
        ingest_max_body_bytes: flag_parse(args, "--ingest-max-body-bytes"),
        ingest_interval_ms: flag_parse(args, "--ingest-interval-ms"),
        disable_auto_ingest: flag_present(args, "--disable-auto-ingest"),
        ingest_async_queue: flag_present(args, "--ingest-async-queue"),
        ingest_queue_flush_ms: flag_parse(args, "--ingest-queue-flush-ms"),
        db_retention_days: flag_parse(args, "--db-retention-days"),
        db_audit_retention_days: flag_parse(args, "--db-audit-retention-days"),
        log_retention_days: flag_parse(args, "--log-retention-days"),
        log_audit_retention_days: flag_parse(args, "--log-audit-retention-days"),
        maintenance_interval_ms: flag_parse(args, "--maintenance-interval-ms"),
        min_free_bytes: flag_parse(args, "--min-free-bytes"),
        audit_backup_directory: flag_value(args, "--audit-backup-directory"),
        alert_config_path: flag_value(args, "--alert-config-path"),
        alert_enabled: flag_parse(args, "--alert-enabled"),
        alert_webhook_url: flag_value(args, "--alert-webhook-url"),
        alert_interval_ms: flag_parse(args, "--alert-interval-ms"),
        alert_window_minutes: flag_parse(args, "--alert-window-minutes"),
        alert_error_threshold: flag_parse(args, "--alert-error-threshold"),
        alert_no_logs_threshold_minutes: flag_parse(args, "--alert-no-logs-threshold-minutes"),
        alert_cooldown_ms: flag_parse(args, "--alert-cooldown-ms"),
        alert_webhook_timeout_ms: flag_parse(args, "--alert-webhook-timeout-ms"),
        alert_webhook_retry_attempts: flag_parse(args, "--alert-webhook-retry-attempts"),
        alert_webhook_backoff_ms: flag_parse(args, "--alert-webhook-backoff-ms"),
    }
}

/// Parse `token=producerId,token2=producer2`.
fn parse_producers(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut map = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((token, producer)) = pair.split_once('=') else {
            return Err(ConfigError::Invalid(format!(
                "ingestProducers entry {:?} is not token=producerId",
                pair
            )));
        };
        if token.is_empty() || producer.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "ingestProducers entry {:?} has an empty side",
                pair
            )));
        }
        map.insert(token.to_string(), producer.to_string());
    }
    Ok(map)
}

impl ServerConfig {
    /// Resolve configuration from all layers. `args` are the raw process
    /// arguments (minus the binary name).
    pub fn resolve(args: &[String]) -> Result<Self, ConfigError> {
        let mut merged = PartialConfig::default();

        let config_file = flag_value(args, "--config").or_else(|| env_string("MIKROSCOPE_CONFIG"));
        if let Some(path) = config_file {
            let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let layer: PartialConfig =
                serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?;
            merged.overlay(layer);
        }

        merged.overlay(env_layer());
        merged.overlay(flags_layer(args));
        Self::finalize(merged)
    }

    fn finalize(layers: PartialConfig) -> Result<Self, ConfigError> {
        let protocol = match layers.protocol.as_deref() {
            None | Some("http") => Protocol::Http,
            Some("https") => Protocol::Https,
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "protocol must be http or https, got {:?}",
                    other
                )))
            }
        };

        let tls_cert_path = layers.tls_cert_path.map(PathBuf::from);
        let tls_key_path = layers.tls_key_path.map(PathBuf::from);
        if protocol == Protocol::Https && (tls_cert_path.is_none() || tls_key_path.is_none()) {
            return Err(ConfigError::Invalid(
                "https requires both tlsCertPath and tlsKeyPath".to_string(),
            ));
        }

        let ingest_producers = match &layers.ingest_producers {
            Some(raw) => parse_producers(raw)?,
            None => HashMap::new(),
        };

        Ok(Self {
            db_path: PathBuf::from(
                layers.db_path.unwrap_or_else(|| "data/mikroscope.db".to_string()),
            ),
            logs_path: PathBuf::from(layers.logs_path.unwrap_or_else(|| "logs".to_string())),
            host: layers.host.unwrap_or_else(|| "0.0.0.0".to_string()),
            port: layers.port.unwrap_or(DEFAULT_PORT),
            protocol,
            tls_cert_path,
            tls_key_path,
            api_token: layers.api_token,
            auth_username: layers.auth_username,
            auth_password: layers.auth_password,
            cors_allow_origin: layers.cors_allow_origin.unwrap_or_else(|| "*".to_string()),
            ingest_producers,
            ingest_max_body_bytes: layers
                .ingest_max_body_bytes
                .unwrap_or(DEFAULT_MAX_BODY_BYTES),
            ingest_interval_ms: layers
                .ingest_interval_ms
                .unwrap_or(DEFAULT_INGEST_INTERVAL_MS),
            disable_auto_ingest: layers.disable_auto_ingest.unwrap_or(false),
            ingest_async_queue: layers.ingest_async_queue.unwrap_or(false),
            ingest_queue_flush_ms: layers
                .ingest_queue_flush_ms
                .unwrap_or(DEFAULT_QUEUE_FLUSH_MS),
            db_retention_days: layers.db_retention_days.unwrap_or(0).max(0),
            db_audit_retention_days: layers.db_audit_retention_days.unwrap_or(0).max(0),
            log_retention_days: layers.log_retention_days.unwrap_or(0).max(0),
            log_audit_retention_days: layers.log_audit_retention_days.unwrap_or(0).max(0),
            maintenance_interval_ms: layers
                .maintenance_interval_ms
                .unwrap_or(crate::maintenance::DEFAULT_INTERVAL_MS)
                .max(crate::maintenance::MIN_INTERVAL_MS),
            min_free_bytes: layers.min_free_bytes.unwrap_or(DEFAULT_MIN_FREE_BYTES),
            audit_backup_directory: layers.audit_backup_directory.map(PathBuf::from),
            alert_config_path: layers.alert_config_path.map(PathBuf::from),
            alert_enabled: layers.alert_enabled,
            alert_webhook_url: layers.alert_webhook_url,
            alert_interval_ms: layers.alert_interval_ms,
            alert_window_minutes: layers.alert_window_minutes,
            alert_error_threshold: layers.alert_error_threshold,
            alert_no_logs_threshold_minutes: layers.alert_no_logs_threshold_minutes,
            alert_cooldown_ms: layers.alert_cooldown_ms,
            alert_webhook_timeout_ms: layers.alert_webhook_timeout_ms,
            alert_webhook_retry_attempts: layers.alert_webhook_retry_attempts,
            alert_webhook_backoff_ms: layers.alert_webhook_backoff_ms,
        })
    }

    /// Seed alert policy from CLI + environment knobs. The persisted
    /// policy file, when present, is overlaid on top of this by the
    /// alert manager.
    pub fn alert_seed(&self) -> AlertPolicy {
        let defaults = AlertPolicy::default();
        AlertPolicy {
            enabled: self
                .alert_enabled
                .unwrap_or(self.alert_webhook_url.is_some()),
            webhook_url: self.alert_webhook_url.clone(),
            interval_ms: self.alert_interval_ms.unwrap_or(defaults.interval_ms),
            window_minutes: self.alert_window_minutes.unwrap_or(defaults.window_minutes),
            error_threshold: self
                .alert_error_threshold
                .unwrap_or(defaults.error_threshold),
            no_logs_threshold_minutes: self
                .alert_no_logs_threshold_minutes
                .unwrap_or(defaults.no_logs_threshold_minutes),
            cooldown_ms: self.alert_cooldown_ms.unwrap_or(defaults.cooldown_ms),
            webhook_timeout_ms: self
                .alert_webhook_timeout_ms
                .unwrap_or(defaults.webhook_timeout_ms),
            webhook_retry_attempts: self
                .alert_webhook_retry_attempts
                .unwrap_or(defaults.webhook_retry_attempts),
            webhook_backoff_ms: self
                .alert_webhook_backoff_ms
                .unwrap_or(defaults.webhook_backoff_ms),
        }
    }

    /// Default: next to the database file.
    pub fn resolved_alert_config_path(&self) -> PathBuf {
        self.alert_config_path.clone().unwrap_or_else(|| {
            let dir = self.db_path.parent().unwrap_or_else(|| std::path::Path::new("."));
            dir.join(crate::alerts::DEFAULT_CONFIG_FILENAME)
        })
    }

    pub fn retention(&self) -> crate::maintenance::RetentionConfig {
        crate::maintenance::RetentionConfig {
            log_retention_days: self.log_retention_days,
            log_audit_retention_days: self.log_audit_retention_days,
            db_retention_days: self.db_retention_days,
            db_audit_retention_days: self.db_audit_retention_days,
            audit_backup_directory: self.audit_backup_directory.clone(),
        }
    }

    pub fn service_url(&self) -> String {
        format!("{}://{}:{}", self.protocol.as_str(), self.host, self.port)
    }

    pub fn api_auth_configured(&self) -> bool {
        self.api_token.is_some() || (self.auth_username.is_some() && self.auth_password.is_some())
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allow_origin
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::resolve(&[]).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.protocol, Protocol::Http);
        assert_eq!(config.cors_allow_origin, "*");
        assert_eq!(config.ingest_max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert!(!config.ingest_async_queue);
        assert!(config.ingest_producers.is_empty());
        assert!(!config.api_auth_configured());
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.json");
        std::fs::write(&file, r#"{ "port": 9000, "host": "10.0.0.1" }"#).unwrap();

        let config = ServerConfig::resolve(&args(&[
            "--config",
            file.to_str().unwrap(),
            "--port",
            "9100",
        ]))
        .unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.host, "10.0.0.1");
    }

    #[test]
    fn test_unknown_config_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.json");
        std::fs::write(&file, r#"{ "prot": "http" }"#).unwrap();

        let err = ServerConfig::resolve(&args(&["--config", file.to_str().unwrap()]));
        assert!(matches!(err, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_https_requires_cert_and_key() {
        let err = ServerConfig::resolve(&args(&["--protocol", "https"]));
        assert!(matches!(err, Err(ConfigError::Invalid(_))));

        let config = ServerConfig::resolve(&args(&[
            "--protocol",
            "https",
            "--tls-cert-path",
            "server.crt",
            "--tls-key-path",
            "server.key",
        ]))
        .unwrap();
        assert_eq!(config.protocol, Protocol::Https);
        assert!(config.service_url().starts_with("https://"));
    }

    #[test]
    fn test_producer_map_parse() {
        let config = ServerConfig::resolve(&args(&[
            "--ingest-producers",
            "tokenA=frontend-web, tokenB=backend",
        ]))
        .unwrap();
        assert_eq!(
            config.ingest_producers.get("tokenA").map(String::as_str),
            Some("frontend-web")
        );
        assert_eq!(
            config.ingest_producers.get("tokenB").map(String::as_str),
            Some("backend")
        );

        let err = ServerConfig::resolve(&args(&["--ingest-producers", "nodelimiter"]));
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_maintenance_interval_floor() {
        let config = ServerConfig::resolve(&args(&["--maintenance-interval-ms", "10"])).unwrap();
        assert_eq!(config.maintenance_interval_ms, 1000);
    }

    #[test]
    fn test_alert_seed_enabled_iff_url() {
        let config = ServerConfig::resolve(&[]).unwrap();
        assert!(!config.alert_seed().enabled);

        let config = ServerConfig::resolve(&args(&[
            "--alert-webhook-url",
            "https://hooks.example/a",
        ]))
        .unwrap();
        let seed = config.alert_seed();
        assert!(seed.enabled);
        assert_eq!(seed.webhook_url.as_deref(), Some("https://hooks.example/a"));
    }

    #[test]
    fn test_alert_config_path_defaults_next_to_db() {
        let config =
            ServerConfig::resolve(&args(&["--db-path", "/var/lib/mikroscope/index.db"])).unwrap();
        assert_eq!(
            config.resolved_alert_config_path(),
            PathBuf::from("/var/lib/mikroscope/mikroscope.alert-config.json")
        );
    }

    #[test]
    fn test_cors_origin_list() {
        let config = ServerConfig::resolve(&args(&[
            "--cors-allow-origin",
            "https://a.example, https://b.example",
        ]))
        .unwrap();
        assert_eq!(
            config.cors_origins(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
