//! Fleet configuration
//!
//! One JSON document, read once at startup. Every section is optional and
//! falls back to the defaults below.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rcc_adapter::{AdapterTiming, CapabilityInfo, RadioId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::Scope;
use crate::error::ConfigError;
use crate::factory::is_known_adapter;

/// Complete fleet configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FleetConfig {
    /// Name of this control container, reported in `radio.ready`
    #[serde(default = "default_container_id")]
    pub container_id: String,
    /// Radios in registry order
    #[serde(default)]
    pub radios: Vec<RadioEntry>,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

fn default_container_id() -> String {
    "rcc".to_string()
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            container_id: default_container_id(),
            radios: Vec::new(),
            timing: TimingConfig::default(),
            recovery: RecoveryConfig::default(),
            dispatch: DispatchConfig::default(),
            telemetry: TelemetryConfig::default(),
            audit: AuditConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

/// One configured radio
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RadioEntry {
    pub id: RadioId,
    /// Adapter type key ("silvus" or "sim")
    pub adapter: String,
    /// Control endpoint, `host:port` for TCP-managed radios
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub description: String,
    /// Overrides the adapter's stock capabilities
    #[serde(default)]
    pub capabilities: Option<CapabilityInfo>,
    /// Simulated answer latency (sim adapter only)
    #[serde(default)]
    pub latency_ms: u64,
}

/// Adapter time budgets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    pub set_power_timeout_ms: u64,
    pub set_channel_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub refresh_timeout_ms: u64,
    /// Telemetry heartbeat period
    pub heartbeat_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            set_power_timeout_ms: 10_000,
            set_channel_timeout_ms: 30_000,
            connect_timeout_ms: 5_000,
            refresh_timeout_ms: 5_000,
            heartbeat_interval_ms: 15_000,
        }
    }
}

/// Probe cadence and the `Recovering` → `Offline` threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Probe period for healthy radios
    pub normal_interval_ms: u64,
    pub recovering_initial_ms: u64,
    pub recovering_backoff: f64,
    pub recovering_max_ms: u64,
    pub offline_initial_ms: u64,
    pub offline_backoff: f64,
    pub offline_max_ms: u64,
    /// Consecutive failed refreshes before a recovering radio goes offline
    pub max_refresh_failures: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            normal_interval_ms: 30_000,
            recovering_initial_ms: 5_000,
            recovering_backoff: 1.5,
            recovering_max_ms: 15_000,
            offline_initial_ms: 10_000,
            offline_backoff: 2.0,
            offline_max_ms: 300_000,
            max_refresh_failures: 3,
        }
    }
}

/// Longest a command may queue behind its radio's lock
pub const MAX_BUSY_WAIT: Duration = Duration::from_secs(60);

/// What a command does when its radio's lock is held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "BusyPolicyRepr", into = "BusyPolicyRepr")]
pub enum BusyPolicy {
    /// Answer `Busy` immediately
    #[default]
    FailFast,
    /// Queue behind the running command for at most this long, then answer `Busy`
    Wait(Duration),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum BusyPolicyRepr {
    Name(String),
    Wait { wait_ms: u64 },
}

impl TryFrom<BusyPolicyRepr> for BusyPolicy {
    type Error = String;

    fn try_from(repr: BusyPolicyRepr) -> Result<Self, Self::Error> {
        match repr {
            BusyPolicyRepr::Name(name) if name == "fail_fast" => Ok(BusyPolicy::FailFast),
            BusyPolicyRepr::Name(name) => Err(format!("unknown busy policy \"{}\"", name)),
            BusyPolicyRepr::Wait { wait_ms } => Ok(BusyPolicy::Wait(Duration::from_millis(wait_ms))),
        }
    }
}

impl From<BusyPolicy> for BusyPolicyRepr {
    fn from(policy: BusyPolicy) -> Self {
        match policy {
            BusyPolicy::FailFast => BusyPolicyRepr::Name("fail_fast".to_string()),
            BusyPolicy::Wait(wait) => BusyPolicyRepr::Wait {
                wait_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            },
        }
    }
}

/// Command dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DispatchConfig {
    pub busy_policy: BusyPolicy,
}

/// Telemetry hub sizing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Events kept per radio for replay
    pub buffer_size: usize,
    /// Buffered events older than this are dropped
    pub retention_secs: u64,
    /// Broadcast channel depth per subscriber
    pub channel_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            buffer_size: 50,
            retention_secs: 3_600,
            channel_capacity: 256,
        }
    }
}

/// Audit log location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    /// Directory holding `audit.jsonl`; platform data dir when unset
    pub directory: Option<PathBuf>,
    /// Records buffered ahead of the writer before new ones are dropped
    pub queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            directory: None,
            queue_capacity: 1_024,
        }
    }
}

impl AuditConfig {
    /// Directory the audit log will be written to
    pub fn resolved_directory(&self) -> Option<PathBuf> {
        self.directory
            .clone()
            .or_else(|| dirs::data_local_dir().map(|d| d.join("rcc")))
    }
}

/// Static credentials
///
/// The daemon logs the configured subjects at startup; embedders enforce them
/// through [`StaticTokenGate`](crate::auth::StaticTokenGate).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// Grant Viewer to callers presenting no credential
    pub allow_unauthenticated_viewer: bool,
    pub tokens: Vec<TokenGrant>,
}

/// One accepted bearer token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenGrant {
    pub token: String,
    pub subject: String,
    pub scope: Scope,
}

impl FleetConfig {
    /// Get the XDG config directory for rcc
    /// Uses $XDG_CONFIG_HOME/rcc, falls back to ~/.config/rcc
    pub fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("rcc"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("rcc"))
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("fleet.json"))
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: FleetConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&json)?;
        debug!(
            "Loaded {} radio(s) from {}",
            config.radios.len(),
            path.display()
        );
        Ok(config)
    }

    /// Load from the default location
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;
        Self::load(&path)
    }

    /// Check everything serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (index, radio) in self.radios.iter().enumerate() {
            if radio.id.as_str().trim().is_empty() {
                return Err(ConfigError::EmptyRadioId { index });
            }
            if !seen.insert(radio.id.clone()) {
                return Err(ConfigError::DuplicateRadio(radio.id.clone()));
            }
            if !is_known_adapter(&radio.adapter) {
                return Err(ConfigError::UnknownAdapter {
                    radio: radio.id.clone(),
                    adapter: radio.adapter.clone(),
                });
            }
            if let Some(caps) = &radio.capabilities {
                validate_capabilities(caps).map_err(|reason| ConfigError::InvalidCapabilities {
                    radio: radio.id.clone(),
                    reason,
                })?;
            }
        }

        let timeouts = [
            ("timing.set_power_timeout_ms", self.timing.set_power_timeout_ms),
            ("timing.set_channel_timeout_ms", self.timing.set_channel_timeout_ms),
            ("timing.connect_timeout_ms", self.timing.connect_timeout_ms),
            ("timing.refresh_timeout_ms", self.timing.refresh_timeout_ms),
            ("timing.heartbeat_interval_ms", self.timing.heartbeat_interval_ms),
            ("recovery.normal_interval_ms", self.recovery.normal_interval_ms),
            ("recovery.recovering_initial_ms", self.recovery.recovering_initial_ms),
            ("recovery.offline_initial_ms", self.recovery.offline_initial_ms),
        ];
        for (field, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::InvalidSetting {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        let backoffs = [
            ("recovery.recovering_backoff", self.recovery.recovering_backoff),
            ("recovery.offline_backoff", self.recovery.offline_backoff),
        ];
        for (field, value) in backoffs {
            if !(value.is_finite() && value >= 1.0) {
                return Err(ConfigError::InvalidSetting {
                    field,
                    reason: format!("backoff factor {} must be at least 1.0", value),
                });
            }
        }

        if self.recovery.recovering_max_ms < self.recovery.recovering_initial_ms {
            return Err(ConfigError::InvalidSetting {
                field: "recovery.recovering_max_ms",
                reason: "must not be below recovering_initial_ms".to_string(),
            });
        }
        if self.recovery.offline_max_ms < self.recovery.offline_initial_ms {
            return Err(ConfigError::InvalidSetting {
                field: "recovery.offline_max_ms",
                reason: "must not be below offline_initial_ms".to_string(),
            });
        }
        if self.recovery.max_refresh_failures == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "recovery.max_refresh_failures",
                reason: "must be at least 1".to_string(),
            });
        }

        if let BusyPolicy::Wait(wait) = self.dispatch.busy_policy {
            if wait > MAX_BUSY_WAIT {
                return Err(ConfigError::InvalidSetting {
                    field: "dispatch.busy_policy",
                    reason: format!(
                        "wait of {:?} exceeds the {:?} ceiling",
                        wait, MAX_BUSY_WAIT
                    ),
                });
            }
        }

        let sizes = [
            ("telemetry.buffer_size", self.telemetry.buffer_size),
            ("telemetry.channel_capacity", self.telemetry.channel_capacity),
            ("audit.queue_capacity", self.audit.queue_capacity),
        ];
        for (field, value) in sizes {
            if value == 0 {
                return Err(ConfigError::InvalidSetting {
                    field,
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Time budgets handed to every adapter
    pub fn adapter_timing(&self) -> AdapterTiming {
        AdapterTiming {
            connect_timeout: Duration::from_millis(self.timing.connect_timeout_ms),
            refresh_timeout: Duration::from_millis(self.timing.refresh_timeout_ms),
            set_power_timeout: Duration::from_millis(self.timing.set_power_timeout_ms),
            set_channel_timeout: Duration::from_millis(self.timing.set_channel_timeout_ms),
            max_refresh_failures: self.recovery.max_refresh_failures,
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.timing.heartbeat_interval_ms)
    }
}

fn validate_capabilities(caps: &CapabilityInfo) -> Result<(), String> {
    let range = caps.power_range_watts();
    if !(range.min_watts.is_finite() && range.max_watts.is_finite()) {
        return Err("power bounds must be finite".to_string());
    }
    if range.min_watts < 0.0 {
        return Err(format!("negative minimum power {}", range.min_watts));
    }
    if range.min_watts > range.max_watts {
        return Err(format!("power range {} is inverted", range));
    }
    if caps.supported_frequencies_mhz().is_empty() {
        return Err("no supported frequencies".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const FULL: &str = r#"{
        "container_id": "rcc-test",
        "radios": [
            {"id": "r1", "adapter": "silvus", "endpoint": "10.0.0.5:80", "description": "mast"},
            {"id": "r2", "adapter": "sim", "latency_ms": 5,
             "capabilities": {"supported_frequencies_mhz": [2462.0, 2412.0],
                              "power_range_watts": {"min_watts": 0.5, "max_watts": 2.0}}}
        ],
        "timing": {"set_power_timeout_ms": 2000},
        "recovery": {"max_refresh_failures": 5},
        "dispatch": {"busy_policy": {"wait_ms": 250}},
        "security": {"allow_unauthenticated_viewer": true,
                     "tokens": [{"token": "abc", "subject": "alice", "scope": "controller"}]}
    }"#;

    #[test]
    fn test_full_document() {
        let config = FleetConfig::from_json(FULL).unwrap();

        assert_eq!(config.container_id, "rcc-test");
        assert_eq!(config.radios.len(), 2);
        assert_eq!(config.radios[1].latency_ms, 5);
        let caps = config.radios[1].capabilities.as_ref().unwrap();
        assert_eq!(caps.supported_frequencies_mhz(), &[2412.0, 2462.0]);

        assert_eq!(config.timing.set_power_timeout_ms, 2000);
        assert_eq!(config.timing.set_channel_timeout_ms, 30_000);
        assert_eq!(config.recovery.max_refresh_failures, 5);
        assert_eq!(
            config.dispatch.busy_policy,
            BusyPolicy::Wait(Duration::from_millis(250))
        );
        assert_eq!(config.security.tokens[0].scope, Scope::Controller);

        let timing = config.adapter_timing();
        assert_eq!(timing.set_power_timeout, Duration::from_secs(2));
        assert_eq!(timing.max_refresh_failures, 5);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = FleetConfig::from_json("{}").unwrap();
        assert_eq!(config, FleetConfig::default());
        assert_eq!(config.dispatch.busy_policy, BusyPolicy::FailFast);
        assert_eq!(config.telemetry.buffer_size, 50);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(15));
    }

    #[test]
    fn test_busy_policy_forms() {
        let fail_fast: DispatchConfig =
            serde_json::from_str(r#"{"busy_policy": "fail_fast"}"#).unwrap();
        assert_eq!(fail_fast.busy_policy, BusyPolicy::FailFast);

        let bad = serde_json::from_str::<DispatchConfig>(r#"{"busy_policy": "queue"}"#);
        assert!(bad.is_err());

        let json = serde_json::to_string(&DispatchConfig {
            busy_policy: BusyPolicy::Wait(Duration::from_millis(40)),
        })
        .unwrap();
        assert_eq!(json, r#"{"busy_policy":{"wait_ms":40}}"#);
    }

    #[test]
    fn test_unbounded_busy_wait_rejected() {
        let json = r#"{"dispatch": {"busy_policy": {"wait_ms": 18446744073709551615}}}"#;
        assert!(matches!(
            FleetConfig::from_json(json),
            Err(ConfigError::InvalidSetting { field: "dispatch.busy_policy", .. })
        ));

        let json = r#"{"dispatch": {"busy_policy": {"wait_ms": 60001}}}"#;
        assert!(FleetConfig::from_json(json).is_err());

        let json = r#"{"dispatch": {"busy_policy": {"wait_ms": 60000}}}"#;
        let config = FleetConfig::from_json(json).unwrap();
        assert_eq!(config.dispatch.busy_policy, BusyPolicy::Wait(MAX_BUSY_WAIT));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"{"radios": [{"id": "a", "adapter": "sim"}, {"id": "a", "adapter": "sim"}]}"#;
        assert!(matches!(
            FleetConfig::from_json(json),
            Err(ConfigError::DuplicateRadio(id)) if id.as_str() == "a"
        ));
    }

    #[test]
    fn test_empty_id_rejected() {
        let json = r#"{"radios": [{"id": " ", "adapter": "sim"}]}"#;
        assert!(matches!(
            FleetConfig::from_json(json),
            Err(ConfigError::EmptyRadioId { index: 0 })
        ));
    }

    #[test]
    fn test_unknown_adapter_rejected() {
        let json = r#"{"radios": [{"id": "a", "adapter": "harris"}]}"#;
        assert!(matches!(
            FleetConfig::from_json(json),
            Err(ConfigError::UnknownAdapter { adapter, .. }) if adapter == "harris"
        ));
    }

    #[test]
    fn test_inverted_power_range_rejected() {
        let json = r#"{"radios": [{"id": "a", "adapter": "sim",
            "capabilities": {"supported_frequencies_mhz": [2412.0],
                             "power_range_watts": {"min_watts": 5.0, "max_watts": 1.0}}}]}"#;
        assert!(matches!(
            FleetConfig::from_json(json),
            Err(ConfigError::InvalidCapabilities { .. })
        ));
    }

    #[test]
    fn test_no_frequencies_rejected() {
        let json = r#"{"radios": [{"id": "a", "adapter": "sim",
            "capabilities": {"supported_frequencies_mhz": [],
                             "power_range_watts": {"min_watts": 0.1, "max_watts": 1.0}}}]}"#;
        assert!(matches!(
            FleetConfig::from_json(json),
            Err(ConfigError::InvalidCapabilities { .. })
        ));
    }

    #[test]
    fn test_bad_recovery_settings_rejected() {
        let json = r#"{"recovery": {"offline_backoff": 0.5}}"#;
        assert!(matches!(
            FleetConfig::from_json(json),
            Err(ConfigError::InvalidSetting { field: "recovery.offline_backoff", .. })
        ));

        let json = r#"{"recovery": {"max_refresh_failures": 0}}"#;
        assert!(matches!(
            FleetConfig::from_json(json),
            Err(ConfigError::InvalidSetting { field: "recovery.max_refresh_failures", .. })
        ));

        let json = r#"{"timing": {"set_channel_timeout_ms": 0}}"#;
        assert!(FleetConfig::from_json(json).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let config = FleetConfig::load(file.path()).unwrap();
        assert_eq!(config.radios[0].id, RadioId::new("r1"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        let err = FleetConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("absent.json"));
    }
}
