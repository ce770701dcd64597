//! Per-path inspection policies.
//!
//! # Design Decisions
//! - Write-once: the first registration of a path wins for the lifetime of
//!   the process, whether it came from config or from first traffic
//! - Read-and-maybe-insert is a single `DashMap::entry` call, so concurrent
//!   first requests for the same path cannot observe different policies
//! - No delete/update API; the map grows with the distinct paths seen

use dashmap::DashMap;
use serde::Serialize;

use crate::config::schema::PathPolicyConfig;
use crate::observability::metrics;

/// Which inspection phases run for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InspectionPolicy {
    pub enabled: bool,
    pub check_request_headers: bool,
    pub check_request_body: bool,
    pub check_response_headers: bool,
    pub check_response_body: bool,
    /// Set by the store once the policy is in effect.
    pub registered: bool,
}

impl InspectionPolicy {
    pub fn new(
        enabled: bool,
        check_request_headers: bool,
        check_request_body: bool,
        check_response_headers: bool,
        check_response_body: bool,
    ) -> Self {
        Self {
            enabled,
            check_request_headers,
            check_request_body,
            check_response_headers,
            check_response_body,
            registered: false,
        }
    }

    /// A policy that skips inspection entirely.
    pub fn disabled() -> Self {
        Self::new(false, false, false, false, false)
    }

    /// Whether the response needs to pass through the interceptor at all.
    pub fn inspects_response(&self) -> bool {
        self.check_response_headers || self.check_response_body
    }
}

impl Default for InspectionPolicy {
    fn default() -> Self {
        Self::new(true, true, true, true, true)
    }
}

impl From<&PathPolicyConfig> for InspectionPolicy {
    fn from(config: &PathPolicyConfig) -> Self {
        Self::new(
            config.enabled,
            config.check_request_headers,
            config.check_request_body,
            config.check_response_headers,
            config.check_response_body,
        )
    }
}

/// Process-wide path → policy map. Construct once, share via `Arc`.
#[derive(Debug, Default)]
pub struct PathPolicyStore {
    policies: DashMap<String, InspectionPolicy>,
}

impl PathPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store with every configured path pre-registered.
    pub fn from_config(paths: &[PathPolicyConfig]) -> Self {
        let store = Self::new();
        for entry in paths {
            if !store.register(entry.path.clone(), InspectionPolicy::from(entry)) {
                tracing::warn!(path = %entry.path, "Duplicate path policy ignored");
            }
        }
        store
    }

    /// Return the policy for `path`, registering the default one on first sight.
    pub fn ensure_registered(&self, path: &str) -> InspectionPolicy {
        if let Some(existing) = self.policies.get(path) {
            return *existing;
        }

        let policy = *self
            .policies
            .entry(path.to_string())
            .or_insert_with(|| {
                tracing::debug!(path, "Auto-registering default inspection policy");
                InspectionPolicy {
                    registered: true,
                    ..InspectionPolicy::default()
                }
            });
        metrics::record_registered_paths(self.policies.len());
        policy
    }

    /// Pre-register `path`. Returns false if the path already had a policy,
    /// in which case the existing one stays in effect.
    pub fn register(&self, path: impl Into<String>, policy: InspectionPolicy) -> bool {
        let path = path.into();
        let mut inserted = false;
        self.policies.entry(path.clone()).or_insert_with(|| {
            inserted = true;
            InspectionPolicy {
                registered: true,
                ..policy
            }
        });

        if inserted {
            tracing::debug!(path = %path, ?policy, "Registered inspection policy");
            metrics::record_registered_paths(self.policies.len());
        }
        inserted
    }

    pub fn get(&self, path: &str) -> Option<InspectionPolicy> {
        self.policies.get(path).map(|r| *r.value())
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// All registered policies, sorted by path.
    pub fn snapshot(&self) -> Vec<(String, InspectionPolicy)> {
        let mut all: Vec<_> = self
            .policies
            .iter()
            .map(|r| (r.key().clone(), *r.value()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
