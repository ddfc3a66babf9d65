//! Alerting manager: periodic rule evaluation with webhook delivery.
//!
//! The policy is seeded from configuration, overlaid with the persisted
//! JSON document, and can be patched at runtime; every update is written
//! back atomically. Rules are evaluated against the query service on a
//! timer; successful deliveries are rate-limited per rule by a cooldown.

use crate::query::QueryService;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mikroscope_core::EntryFilter;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILENAME: &str = "mikroscope.alert-config.json";

const RULE_ERROR_THRESHOLD: &str = "error_threshold";
const RULE_NO_LOGS: &str = "no_logs";
const RULE_MANUAL_TEST: &str = "manual_test";

/// Persisted alerting policy. Bounds are enforced by [`AlertPolicy::validate`];
/// violations are validation errors, never silent clamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertPolicy {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub interval_ms: u64,
    pub window_minutes: u64,
    pub error_threshold: u64,
    pub no_logs_threshold_minutes: u64,
    pub cooldown_ms: u64,
    pub webhook_timeout_ms: u64,
    pub webhook_retry_attempts: u32,
    pub webhook_backoff_ms: u64,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: None,
            interval_ms: 30_000,
            window_minutes: 5,
            error_threshold: 20,
            no_logs_threshold_minutes: 0,
            cooldown_ms: 300_000,
            webhook_timeout_ms: 5_000,
            webhook_retry_attempts: 3,
            webhook_backoff_ms: 250,
        }
    }
}

impl AlertPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.webhook_url.as_deref().map_or(true, str::is_empty) {
            return Err("alerting cannot be enabled without a webhookUrl".to_string());
        }
        if self.interval_ms < 1000 {
            return Err("intervalMs must be at least 1000".to_string());
        }
        if self.window_minutes < 1 {
            return Err("windowMinutes must be at least 1".to_string());
        }
        if self.error_threshold < 1 {
            return Err("errorThreshold must be at least 1".to_string());
        }
        if self.cooldown_ms < 1000 {
            return Err("cooldownMs must be at least 1000".to_string());
        }
        if self.webhook_timeout_ms < 250 {
            return Err("webhookTimeoutMs must be at least 250".to_string());
        }
        if self.webhook_retry_attempts < 1 {
            return Err("webhookRetryAttempts must be at least 1".to_string());
        }
        if self.webhook_backoff_ms < 25 {
            return Err("webhookBackoffMs must be at least 25".to_string());
        }
        Ok(())
    }

    /// Masked rendering for `/health`: the URL is replaced by
    /// `"[configured]"` when set, omitted otherwise.
    pub fn masked(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            if obj.contains_key("webhookUrl") {
                obj.insert(
                    "webhookUrl".to_string(),
                    serde_json::Value::String("[configured]".to_string()),
                );
            }
        }
        value
    }
}

fn deserialize_explicit<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Per-field policy patch. Unknown keys are rejected so configuration
/// typos surface as 400s instead of being silently ignored. `webhookUrl`
/// distinguishes "absent" from explicit `null` (which clears the URL).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct PolicyPatch {
    pub enabled: Option<bool>,
    #[serde(deserialize_with = "deserialize_explicit")]
    pub webhook_url: Option<Option<String>>,
    pub interval_ms: Option<u64>,
    pub window_minutes: Option<u64>,
    pub error_threshold: Option<u64>,
    pub no_logs_threshold_minutes: Option<u64>,
    pub cooldown_ms: Option<u64>,
    pub webhook_timeout_ms: Option<u64>,
    pub webhook_retry_attempts: Option<u32>,
    pub webhook_backoff_ms: Option<u64>,
}

impl PolicyPatch {
    pub fn apply(&self, base: &AlertPolicy) -> AlertPolicy {
        let mut policy = base.clone();
        if let Some(enabled) = self.enabled {
            policy.enabled = enabled;
        }
        if let Some(url) = &self.webhook_url {
            policy.webhook_url = url.clone();
        }
        if let Some(v) = self.interval_ms {
            policy.interval_ms = v;
        }
        if let Some(v) = self.window_minutes {
            policy.window_minutes = v;
        }
        if let Some(v) = self.error_threshold {
            policy.error_threshold = v;
        }
        if let Some(v) = self.no_logs_threshold_minutes {
            policy.no_logs_threshold_minutes = v;
        }
        if let Some(v) = self.cooldown_ms {
            policy.cooldown_ms = v;
        }
        if let Some(v) = self.webhook_timeout_ms {
            policy.webhook_timeout_ms = v;
        }
        if let Some(v) = self.webhook_retry_attempts {
            policy.webhook_retry_attempts = v;
        }
        if let Some(v) = self.webhook_backoff_ms {
            policy.webhook_backoff_ms = v;
        }
        policy
    }
}

/// Process-local alerting counters, reported through `/health`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertState {
    pub runs: u64,
    pub sent: u64,
    pub suppressed: u64,
    pub last_trigger_at_by_rule: HashMap<String, String>,
    pub last_error: Option<String>,
    pub last_cycle_at: Option<String>,
    pub last_cycle_ms: Option<u64>,
    pub last_webhook_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload {
    source: &'static str,
    rule: String,
    severity: String,
    triggered_at: String,
    service_url: String,
    details: serde_json::Value,
}

/// Result of a manual webhook test.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookTestResult {
    pub ok: bool,
    pub sent_at: String,
    pub target_url: String,
}

/// Exponential backoff for retry `attempt` (1-based). The policy has no
/// upper bound on attempts, so both the doubling and the multiplication
/// saturate instead of overflowing.
fn backoff_for_attempt(base_ms: u64, attempt: u32) -> u64 {
    let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor)
}

fn within_cooldown(last_trigger: Option<&String>, now: DateTime<Utc>, cooldown_ms: u64) -> bool {
    let Some(last) = last_trigger else {
        return false;
    };
    let Ok(last) = DateTime::parse_from_rfc3339(last) else {
        return false;
    };
    let elapsed = now.signed_duration_since(last.with_timezone(&Utc));
    elapsed < ChronoDuration::milliseconds(cooldown_ms as i64)
}

pub struct AlertManager {
    query: Arc<QueryService>,
    policy: Mutex<AlertPolicy>,
    state: Mutex<AlertState>,
    running: AtomicBool,
    timer: Mutex<Option<tokio::task::JoinHandle<()>>>,
    config_path: PathBuf,
    service_url: Mutex<String>,
    client: reqwest::Client,
}

impl AlertManager {
    /// Build the manager: load the persisted policy if present and overlay
    /// it onto the seed (CLI + environment). A corrupt file is logged and
    /// ignored rather than blocking startup.
    pub fn new(query: Arc<QueryService>, config_path: PathBuf, seed: AlertPolicy) -> Self {
        let policy = match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_json::from_str::<PolicyPatch>(&content) {
                Ok(saved) => saved.apply(&seed),
                Err(e) => {
                    tracing::warn!(
                        "ignoring unreadable alert config {}: {}",
                        config_path.display(),
                        e
                    );
                    seed
                }
            },
            Err(_) => seed,
        };

        Self {
            query,
            policy: Mutex::new(policy),
            state: Mutex::new(AlertState::default()),
            running: AtomicBool::new(false),
            timer: Mutex::new(None),
            config_path,
            service_url: Mutex::new(String::new()),
            client: reqwest::Client::new(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn set_service_url(&self, url: String) {
        *self.service_url.lock().unwrap() = url;
    }

    pub fn policy(&self) -> AlertPolicy {
        self.policy.lock().unwrap().clone()
    }

    pub fn state_snapshot(&self) -> AlertState {
        self.state.lock().unwrap().clone()
    }

    /// Persist the current policy, creating the parent directory on
    /// demand. The write goes through a temp file and a rename; on Unix
    /// the file ends up mode 0600.
    fn persist(&self, policy: &AlertPolicy) -> Result<(), String> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("cannot create {}: {}", parent.display(), e))?;
        }
        let body = serde_json::to_string_pretty(policy).map_err(|e| e.to_string())?;
        let tmp = self.config_path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|e| format!("cannot write alert config: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600));
        }
        std::fs::rename(&tmp, &self.config_path)
            .map_err(|e| format!("cannot write alert config: {}", e))?;
        Ok(())
    }

    /// Start the evaluation timer when the policy allows it. The first
    /// cycle runs immediately.
    pub fn start(self: &Arc<Self>) {
        let policy = self.policy();
        if !policy.enabled || policy.webhook_url.is_none() {
            return;
        }
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                manager.run_cycle().await;
                let interval = manager.policy.lock().unwrap().interval_ms;
                tokio::time::sleep(Duration::from_millis(interval)).await;
            }
        });
        *self.timer.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(handle) = self.timer.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Evaluate all rules once. Cycles are guarded by an in-flight flag;
    /// overlapping triggers are skipped, and a failing cycle records its
    /// error without stopping the scheduler.
    pub async fn run_cycle(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let started = std::time::Instant::now();
        if let Err(e) = self.evaluate_rules().await {
            self.state.lock().unwrap().last_error = Some(e);
        }
        {
            let mut state = self.state.lock().unwrap();
            state.runs += 1;
            state.last_cycle_at = Some(mikroscope_core::now_canonical());
            state.last_cycle_ms = Some(started.elapsed().as_millis() as u64);
        }
        self.running.store(false, Ordering::SeqCst);
    }

    async fn evaluate_rules(&self) -> Result<(), String> {
        let policy = self.policy();
        let Some(url) = policy.webhook_url.clone() else {
            return Ok(());
        };
        if !policy.enabled {
            return Ok(());
        }
        let now = Utc::now();

        // error_threshold: ERROR count within the sliding window
        let window_start =
            mikroscope_core::to_canonical(now - ChronoDuration::minutes(policy.window_minutes as i64));
        let window_filter = EntryFilter::default().from(window_start.clone());
        let error_count = self
            .query
            .count(&window_filter.clone().level("ERROR"))
            .map_err(|e| e.to_string())?;
        if error_count as u64 >= policy.error_threshold {
            let total = self.query.count(&window_filter).map_err(|e| e.to_string())?;
            self.trigger(
                RULE_ERROR_THRESHOLD,
                "critical",
                serde_json::json!({
                    "errorCount": error_count,
                    "threshold": policy.error_threshold,
                    "totalWindowCount": total,
                    "windowMinutes": policy.window_minutes,
                }),
                &url,
                &policy,
                now,
            )
            .await;
        }

        // no_logs: silence longer than the configured threshold
        if policy.no_logs_threshold_minutes > 0 {
            let since = mikroscope_core::to_canonical(
                now - ChronoDuration::minutes(policy.no_logs_threshold_minutes as i64),
            );
            let recent = self
                .query
                .count(&EntryFilter::default().from(since))
                .map_err(|e| e.to_string())?;
            if recent == 0 {
                self.trigger(
                    RULE_NO_LOGS,
                    "warning",
                    serde_json::json!({
                        "thresholdMinutes": policy.no_logs_threshold_minutes,
                    }),
                    &url,
                    &policy,
                    now,
                )
                .await;
            }
        }

        Ok(())
    }

    async fn trigger(
        &self,
        rule: &str,
        severity: &str,
        details: serde_json::Value,
        url: &str,
        policy: &AlertPolicy,
        now: DateTime<Utc>,
    ) {
        {
            let mut state = self.state.lock().unwrap();
            if within_cooldown(
                state.last_trigger_at_by_rule.get(rule),
                now,
                policy.cooldown_ms,
            ) {
                state.suppressed += 1;
                return;
            }
        }

        let payload = WebhookPayload {
            source: "mikroscope",
            rule: rule.to_string(),
            severity: severity.to_string(),
            triggered_at: mikroscope_core::to_canonical(now),
            service_url: self.service_url.lock().unwrap().clone(),
            details,
        };

        let started = std::time::Instant::now();
        let result = self.send_webhook(url, &payload, policy).await;
        let mut state = self.state.lock().unwrap();
        state.last_webhook_ms = Some(started.elapsed().as_millis() as u64);
        match result {
            Ok(()) => {
                state.sent += 1;
                state
                    .last_trigger_at_by_rule
                    .insert(rule.to_string(), mikroscope_core::to_canonical(now));
            }
            Err(e) => {
                tracing::warn!("webhook delivery for rule {} failed: {}", rule, e);
                state.last_error = Some(e);
            }
        }
    }

    /// Deliver one payload with the bounded retry machinery. Timeouts and
    /// transport errors retry, as do 408, 429, and 5xx responses; any
    /// other non-2xx status is terminal.
    async fn send_webhook(
        &self,
        url: &str,
        payload: &WebhookPayload,
        policy: &AlertPolicy,
    ) -> Result<(), String> {
        let mut last_error = String::new();

        for attempt in 1..=policy.webhook_retry_attempts {
            let result = self
                .client
                .post(url)
                .json(payload)
                .timeout(Duration::from_millis(policy.webhook_timeout_ms))
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    last_error = format!("webhook returned status {}", status);
                    let retryable = status == 408 || status == 429 || status >= 500;
                    if !retryable {
                        return Err(last_error);
                    }
                }
                Err(e) => {
                    last_error = format!("webhook request failed: {}", e);
                }
            }

            if attempt < policy.webhook_retry_attempts {
                let backoff = backoff_for_attempt(policy.webhook_backoff_ms, attempt);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
        }

        Err(last_error)
    }

    /// Manual delivery test, honoring the full retry machinery. An
    /// explicit override replaces the configured URL for this one send.
    pub async fn test_webhook(
        &self,
        override_url: Option<String>,
    ) -> Result<WebhookTestResult, String> {
        let policy = self.policy();
        let target = override_url
            .or_else(|| policy.webhook_url.clone())
            .ok_or_else(|| "no webhook URL configured or provided".to_string())?;

        let now = Utc::now();
        let payload = WebhookPayload {
            source: "mikroscope",
            rule: RULE_MANUAL_TEST.to_string(),
            severity: "warning".to_string(),
            triggered_at: mikroscope_core::to_canonical(now),
            service_url: self.service_url.lock().unwrap().clone(),
            details: serde_json::json!({
                "message": "Manual webhook delivery test",
            }),
        };

        self.send_webhook(&target, &payload, &policy).await?;
        Ok(WebhookTestResult {
            ok: true,
            sent_at: mikroscope_core::now_canonical(),
            target_url: target,
        })
    }

    /// Merge a patch into the live policy, validate, persist, and
    /// reschedule the timer.
    pub fn update_policy(self: &Arc<Self>, patch: &PolicyPatch) -> Result<AlertPolicy, String> {
        let merged = {
            let current = self.policy.lock().unwrap();
            patch.apply(&current)
        };
        merged.validate()?;
        self.persist(&merged)?;
        *self.policy.lock().unwrap() = merged.clone();

        self.stop();
        self.start();
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::IndexStore;
    use tempfile::tempdir;

    fn manager_at(dir: &Path, seed: AlertPolicy) -> Arc<AlertManager> {
        let store = Arc::new(IndexStore::open_in_memory().unwrap());
        let query = Arc::new(QueryService::new(store));
        Arc::new(AlertManager::new(
            query,
            dir.join(DEFAULT_CONFIG_FILENAME),
            seed,
        ))
    }

    #[test]
    fn test_default_policy_is_valid_when_disabled() {
        let policy = AlertPolicy::default();
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_enabled_requires_url() {
        let policy = AlertPolicy {
            enabled: true,
            ..AlertPolicy::default()
        };
        assert!(policy.validate().is_err());

        let policy = AlertPolicy {
            enabled: true,
            webhook_url: Some("https://hooks.example/alerts".to_string()),
            ..AlertPolicy::default()
        };
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_bounds_are_validation_errors() {
        let base = AlertPolicy::default();
        for policy in [
            AlertPolicy { interval_ms: 999, ..base.clone() },
            AlertPolicy { window_minutes: 0, ..base.clone() },
            AlertPolicy { error_threshold: 0, ..base.clone() },
            AlertPolicy { cooldown_ms: 500, ..base.clone() },
            AlertPolicy { webhook_timeout_ms: 100, ..base.clone() },
            AlertPolicy { webhook_retry_attempts: 0, ..base.clone() },
            AlertPolicy { webhook_backoff_ms: 10, ..base.clone() },
        ] {
            assert!(policy.validate().is_err(), "{:?} should fail", policy);
        }
    }

    #[test]
    fn test_patch_rejects_unknown_fields() {
        let err = serde_json::from_str::<PolicyPatch>(r#"{ "bogusKnob": 1 }"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_patch_null_clears_url() {
        let patch: PolicyPatch =
            serde_json::from_str(r#"{ "webhookUrl": null, "enabled": false }"#).unwrap();
        let base = AlertPolicy {
            webhook_url: Some("https://hooks.example/x".to_string()),
            ..AlertPolicy::default()
        };
        let merged = patch.apply(&base);
        assert_eq!(merged.webhook_url, None);

        // Absent key leaves the URL untouched
        let patch: PolicyPatch = serde_json::from_str(r#"{ "enabled": false }"#).unwrap();
        let merged = patch.apply(&base);
        assert_eq!(merged.webhook_url, base.webhook_url);
    }

    #[test]
    fn test_masked_policy() {
        let policy = AlertPolicy {
            webhook_url: Some("https://hooks.example/secret-path".to_string()),
            ..AlertPolicy::default()
        };
        let masked = policy.masked();
        assert_eq!(masked["webhookUrl"], "[configured]");

        let masked = AlertPolicy::default().masked();
        assert!(masked.get("webhookUrl").is_none());
    }

    #[test]
    fn test_backoff_doubles_then_saturates() {
        assert_eq!(backoff_for_attempt(250, 1), 250);
        assert_eq!(backoff_for_attempt(250, 2), 500);
        assert_eq!(backoff_for_attempt(250, 3), 1000);
        // Shift amounts at or past the u64 width saturate instead of
        // panicking; a policy with a huge attempt count is still valid.
        assert_eq!(backoff_for_attempt(250, 64), u64::MAX);
        assert_eq!(backoff_for_attempt(250, 65), u64::MAX);
        assert_eq!(backoff_for_attempt(250, 200), u64::MAX);
    }

    #[test]
    fn test_within_cooldown() {
        let now = Utc::now();
        let recent = mikroscope_core::to_canonical(now - ChronoDuration::milliseconds(100));
        let old = mikroscope_core::to_canonical(now - ChronoDuration::milliseconds(5000));

        assert!(within_cooldown(Some(&recent), now, 1000));
        assert!(!within_cooldown(Some(&old), now, 1000));
        assert!(!within_cooldown(None, now, 1000));
        assert!(!within_cooldown(Some(&"garbage".to_string()), now, 1000));
    }

    #[tokio::test]
    async fn test_update_policy_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let manager = manager_at(dir.path(), AlertPolicy::default());

        let patch: PolicyPatch = serde_json::from_str(
            r#"{ "enabled": true, "webhookUrl": "https://hooks.example/a", "errorThreshold": 3 }"#,
        )
        .unwrap();
        let updated = manager.update_policy(&patch).unwrap();
        assert_eq!(updated.error_threshold, 3);
        manager.stop();

        // A fresh manager on the same path sees the persisted policy
        let reloaded = manager_at(dir.path(), AlertPolicy::default());
        let policy = reloaded.policy();
        assert!(policy.enabled);
        assert_eq!(policy.error_threshold, 3);
        assert_eq!(
            policy.webhook_url.as_deref(),
            Some("https://hooks.example/a")
        );
    }

    #[tokio::test]
    async fn test_update_policy_rejects_invalid_merge() {
        let dir = tempdir().unwrap();
        let manager = manager_at(dir.path(), AlertPolicy::default());

        let patch: PolicyPatch = serde_json::from_str(r#"{ "enabled": true }"#).unwrap();
        assert!(manager.update_policy(&patch).is_err());
        // Nothing persisted on failure
        assert!(!dir.path().join(DEFAULT_CONFIG_FILENAME).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_config_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let manager = manager_at(dir.path(), AlertPolicy::default());
        let patch: PolicyPatch =
            serde_json::from_str(r#"{ "webhookUrl": "https://hooks.example/a" }"#).unwrap();
        manager.update_policy(&patch).unwrap();

        let mode = std::fs::metadata(dir.path().join(DEFAULT_CONFIG_FILENAME))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_config_falls_back_to_seed() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILENAME), "{not json").unwrap();
        let seed = AlertPolicy {
            error_threshold: 7,
            ..AlertPolicy::default()
        };
        let manager = manager_at(dir.path(), seed);
        assert_eq!(manager.policy().error_threshold, 7);
    }

    #[tokio::test]
    async fn test_test_webhook_requires_some_url() {
        let dir = tempdir().unwrap();
        let manager = manager_at(dir.path(), AlertPolicy::default());
        let err = manager.test_webhook(None).await.unwrap_err();
        assert!(err.contains("no webhook URL"));
    }
}
