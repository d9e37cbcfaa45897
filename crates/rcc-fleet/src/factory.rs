//! Adapter construction from configuration

use std::sync::Arc;
use std::time::Duration;

use rcc_adapter::{silvus_adapter, silvus_capabilities, AdapterTiming, RadioAdapter, SILVUS_ADAPTER_TYPE};
use rcc_sim::{sim_adapter, sim_capabilities, SimControl, SIM_ADAPTER_TYPE};

use crate::config::{FleetConfig, RadioEntry};
use crate::error::{ConfigError, FleetError};
use crate::registry::RadioRegistry;

/// Adapter type keys this build can instantiate
pub const KNOWN_ADAPTERS: &[&str] = &[SILVUS_ADAPTER_TYPE, SIM_ADAPTER_TYPE];

pub fn is_known_adapter(adapter_type: &str) -> bool {
    KNOWN_ADAPTERS.contains(&adapter_type)
}

/// Create the adapter for one configured radio
pub fn create_adapter(
    entry: &RadioEntry,
    timing: AdapterTiming,
) -> Result<Arc<dyn RadioAdapter>, ConfigError> {
    match entry.adapter.as_str() {
        SILVUS_ADAPTER_TYPE => {
            let capabilities = entry
                .capabilities
                .clone()
                .unwrap_or_else(silvus_capabilities);
            Ok(Arc::new(silvus_adapter(
                entry.id.clone(),
                entry.endpoint.clone(),
                capabilities,
                timing,
            )))
        }
        SIM_ADAPTER_TYPE => {
            let capabilities = entry.capabilities.clone().unwrap_or_else(sim_capabilities);
            let control = SimControl::with_latency(Duration::from_millis(entry.latency_ms));
            Ok(Arc::new(sim_adapter(
                entry.id.clone(),
                capabilities,
                timing,
                control,
            )))
        }
        other => Err(ConfigError::UnknownAdapter {
            radio: entry.id.clone(),
            adapter: other.to_string(),
        }),
    }
}

/// Build the registry for a validated configuration
pub fn build_registry(config: &FleetConfig) -> Result<RadioRegistry, FleetError> {
    let timing = config.adapter_timing();
    let mut registry = RadioRegistry::new();
    for entry in &config.radios {
        let adapter = create_adapter(entry, timing)?;
        registry.register(entry.description.clone(), adapter)?;
    }
    Ok(registry)
}
