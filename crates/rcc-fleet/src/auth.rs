//! Authorization gate
//!
//! The gate turns a presented credential into an [`AuthDecision`]. Token
//! cryptography lives outside this crate; [`StaticTokenGate`] checks against
//! the grants in the configuration.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SecurityConfig;

/// Access an operation needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessLevel {
    /// Read state and subscribe to events
    Telemetry,
    /// Change radio settings
    Control,
}

/// Access granted to a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Viewer,
    Controller,
    Admin,
}

impl Scope {
    /// Whether this scope grants `level`
    pub fn permits(&self, level: AccessLevel) -> bool {
        match level {
            AccessLevel::Telemetry => true,
            AccessLevel::Control => matches!(self, Scope::Controller | Scope::Admin),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scope::Viewer => "viewer",
            Scope::Controller => "controller",
            Scope::Admin => "admin",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of an authorization check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthDecision {
    pub allowed: bool,
    /// Who the caller is; used as the audit actor
    pub subject: String,
    pub scope: Option<Scope>,
}

impl AuthDecision {
    pub fn allow(subject: impl Into<String>, scope: Scope) -> Self {
        Self {
            allowed: true,
            subject: subject.into(),
            scope: Some(scope),
        }
    }

    pub fn deny(subject: impl Into<String>) -> Self {
        Self {
            allowed: false,
            subject: subject.into(),
            scope: None,
        }
    }

    /// Whether the caller may perform an operation needing `level`
    pub fn permits(&self, level: AccessLevel) -> bool {
        self.allowed && self.scope.is_some_and(|scope| scope.permits(level))
    }
}

/// Decides whether a credential may perform an operation
pub trait AuthorizationGate: Send + Sync {
    fn authorize(&self, credential: &str, level: AccessLevel) -> AuthDecision;
}

/// Gate backed by a fixed token table
#[derive(Debug, Default)]
pub struct StaticTokenGate {
    grants: HashMap<String, (String, Scope)>,
    allow_unauthenticated_viewer: bool,
}

impl StaticTokenGate {
    pub fn new(allow_unauthenticated_viewer: bool) -> Self {
        Self {
            grants: HashMap::new(),
            allow_unauthenticated_viewer,
        }
    }

    /// Build from the `security` config section
    pub fn from_config(config: &SecurityConfig) -> Self {
        let mut gate = Self::new(config.allow_unauthenticated_viewer);
        for grant in &config.tokens {
            gate.grant(grant.token.clone(), grant.subject.clone(), grant.scope);
        }
        gate
    }

    /// Accept `token` as `subject` with `scope`
    pub fn grant(&mut self, token: impl Into<String>, subject: impl Into<String>, scope: Scope) {
        self.grants.insert(token.into(), (subject.into(), scope));
    }

    /// Subjects with a grant and their scopes, sorted by subject; never the tokens
    pub fn subjects(&self) -> Vec<(String, Scope)> {
        let mut subjects: Vec<(String, Scope)> = self.grants.values().cloned().collect();
        subjects.sort_by(|a, b| a.0.cmp(&b.0));
        subjects
    }

    pub fn allows_unauthenticated_viewer(&self) -> bool {
        self.allow_unauthenticated_viewer
    }
}

impl AuthorizationGate for StaticTokenGate {
    fn authorize(&self, credential: &str, level: AccessLevel) -> AuthDecision {
        let token = credential.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();

        let decision = if token.is_empty() {
            if self.allow_unauthenticated_viewer {
                AuthDecision::allow("anonymous", Scope::Viewer)
            } else {
                AuthDecision::deny("anonymous")
            }
        } else {
            match self.grants.get(token) {
                Some((subject, scope)) => AuthDecision::allow(subject.clone(), *scope),
                None => AuthDecision::deny("unknown"),
            }
        };

        if decision.permits(level) {
            decision
        } else {
            debug!(
                "Denied {:?} access to {} ({:?})",
                level, decision.subject, decision.scope
            );
            AuthDecision {
                allowed: false,
                ..decision
            }
        }
    }
}
