//! Radio Fleet Library
//!
//! This crate turns operator intents into radio effects for a fixed fleet of
//! radios, keeping an authoritative and observable record of their state:
//!
//! - **RadioRegistry**: the configured radios, their cached state and the
//!   active-radio pointer
//! - **Orchestrator**: authorization, per-radio serialization, validation,
//!   dispatch, state commit, audit and telemetry for every command
//! - **Prober**: background refreshes that bring failed radios back
//! - **AuditLog** / **TelemetryHub**: fire-and-forget sinks for outcomes
//!
//! # Architecture
//!
//! Commands to the same radio are strictly ordered by a per-radio lock;
//! commands to different radios run in parallel. Adapter calls never happen
//! while the registry's own lock is held, so reads stay cheap while radios
//! are busy.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use rcc_adapter::{RadioId, ResultCode};
//! use rcc_fleet::{
//!     build_registry, AuthDecision, CorrelationId, FleetConfig, MemoryAuditSink, Orchestrator,
//!     Scope, TelemetryHub,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = FleetConfig::from_json(r#"{"radios": [{"id": "r1", "adapter": "sim"}]}"#).unwrap();
//! let registry = Arc::new(build_registry(&config).unwrap());
//! let hub = Arc::new(TelemetryHub::from_config(&config.telemetry));
//! let orchestrator = Orchestrator::new(registry, Arc::new(MemoryAuditSink::new()), hub);
//!
//! orchestrator.start().await;
//!
//! let operator = AuthDecision::allow("alice", Scope::Controller);
//! let result = orchestrator
//!     .set_power(&operator, CorrelationId::new(), &RadioId::new("r1"), 2.0)
//!     .await;
//! assert_eq!(result.code, ResultCode::Ok);
//! # }
//! ```

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod factory;
pub mod orchestrator;
pub mod prober;
pub mod registry;
pub mod telemetry;

pub use audit::{AuditLog, AuditRecord, AuditSink, CorrelationId, MemoryAuditSink, AUDIT_FILE_NAME};
pub use auth::{AccessLevel, AuthDecision, AuthorizationGate, Scope, StaticTokenGate};
pub use config::{
    AuditConfig, BusyPolicy, DispatchConfig, FleetConfig, RadioEntry, RecoveryConfig,
    SecurityConfig, TelemetryConfig, TimingConfig, TokenGrant, MAX_BUSY_WAIT,
};
pub use error::{ConfigError, FleetError};
pub use factory::{build_registry, create_adapter, is_known_adapter, KNOWN_ADAPTERS};
pub use orchestrator::{Orchestrator, ACTOR_PROBER, ACTOR_SYSTEM};
pub use prober::{Backoff, ProbeSchedule, Prober};
pub use registry::{AdapterHandle, RadioDescriptor, RadioRegistry};
pub use telemetry::{FleetEvent, TelemetryHub, TelemetryPublisher, TelemetryRecord};
