//! Composite health report: one unauthenticated snapshot of every
//! subsystem. The alert webhook URL is masked here; the raw policy is
//! only available on the authenticated config route.

use crate::alerts::AlertManager;
use crate::config::ServerConfig;
use crate::db::IndexStore;
use crate::indexer::Indexer;
use crate::ingest::IngestQueue;
use crate::maintenance::MaintenanceLoop;
use crate::preflight::free_bytes;
use chrono::{DateTime, Utc};
use std::path::Path;

#[allow(clippy::too_many_arguments)]
pub fn build_report(
    config: &ServerConfig,
    started_at: DateTime<Utc>,
    store: &IndexStore,
    indexer: &Indexer,
    queue: Option<&IngestQueue>,
    alerts: &AlertManager,
    maintenance: &MaintenanceLoop,
) -> serde_json::Value {
    let uptime_sec = (Utc::now() - started_at).num_seconds().max(0);

    let ingest_enabled = !config.ingest_producers.is_empty()
        || (config.auth_username.is_some() && config.auth_password.is_some());

    let db_dir = config
        .db_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let db_size = store.get_stats().map(|s| s.approx_size_bytes).unwrap_or(0);

    serde_json::json!({
        "ok": true,
        "service": "mikroscope",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSec": uptime_sec,
        "ingest": {
            "lastReport": indexer.last_report(),
            "lastError": indexer.last_error(),
            "inFlight": indexer.is_in_flight(),
        },
        "auth": {
            "apiTokenEnabled": config.api_token.is_some(),
            "basicEnabled": config.auth_username.is_some() && config.auth_password.is_some(),
        },
        "ingestPolicy": {
            "autoIngest": !config.disable_auto_ingest,
            "intervalMs": config.ingest_interval_ms,
        },
        "ingestEndpoint": {
            "enabled": ingest_enabled,
            "maxBodyBytes": config.ingest_max_body_bytes,
            "producerCount": config.ingest_producers.len(),
            "queue": queue.map(|q| serde_json::to_value(q.snapshot()).unwrap_or_default()),
        },
        "alerting": alerts.state_snapshot(),
        "alertPolicy": alerts.policy().masked(),
        "maintenance": {
            "lastReport": maintenance.last_report(),
            "lastError": maintenance.last_error(),
            "intervalMs": config.maintenance_interval_ms,
        },
        "retentionDays": {
            "db": config.db_retention_days,
            "dbAudit": config.db_audit_retention_days,
            "logs": config.log_retention_days,
            "logsAudit": config.log_audit_retention_days,
        },
        "backup": {
            "auditDirectory": config.audit_backup_directory,
        },
        "storage": {
            "dbApproximateSizeBytes": db_size,
            "dbDirectoryFreeBytes": free_bytes(&db_dir),
            "logsDirectoryFreeBytes": free_bytes(&config.logs_path),
            "minFreeBytes": config.min_free_bytes,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertPolicy;
    use crate::query::QueryService;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_report_masks_webhook_url() {
        let dir = tempdir().unwrap();
        let config = ServerConfig::resolve(&[]).unwrap();
        let store = Arc::new(IndexStore::open_in_memory().unwrap());
        let indexer = Indexer::new(store.clone(), dir.path().to_path_buf());
        let query = Arc::new(QueryService::new(store.clone()));
        let alerts = AlertManager::new(
            query,
            dir.path().join("alert.json"),
            AlertPolicy {
                webhook_url: Some("https://hooks.example/secret".to_string()),
                ..AlertPolicy::default()
            },
        );
        let maintenance = MaintenanceLoop::new(
            store.clone(),
            dir.path().to_path_buf(),
            config.retention(),
        );

        let report = build_report(
            &config,
            Utc::now(),
            &store,
            &indexer,
            None,
            &alerts,
            &maintenance,
        );

        assert_eq!(report["service"], "mikroscope");
        assert_eq!(report["alertPolicy"]["webhookUrl"], "[configured]");
        let rendered = report.to_string();
        assert!(!rendered.contains("hooks.example/secret"));
    }

    #[test]
    fn test_report_shape() {
        let dir = tempdir().unwrap();
        let config = ServerConfig::resolve(&[]).unwrap();
        let store = Arc::new(IndexStore::open_in_memory().unwrap());
        let indexer = Indexer::new(store.clone(), dir.path().to_path_buf());
        let query = Arc::new(QueryService::new(store.clone()));
        let alerts = AlertManager::new(
            query,
            dir.path().join("alert.json"),
            AlertPolicy::default(),
        );
        let maintenance = MaintenanceLoop::new(
            store.clone(),
            dir.path().to_path_buf(),
            config.retention(),
        );

        let report = build_report(
            &config,
            Utc::now(),
            &store,
            &indexer,
            None,
            &alerts,
            &maintenance,
        );

        assert_eq!(report["ok"], true);
        assert_eq!(report["ingestEndpoint"]["enabled"], false);
        assert_eq!(report["auth"]["apiTokenEnabled"], false);
        assert!(report["retentionDays"].get("dbAudit").is_some());
        assert!(report["storage"].get("minFreeBytes").is_some());
    }
}
