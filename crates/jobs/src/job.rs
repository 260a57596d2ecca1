//! Delayed job identity and payload.

use common::OrderId;
use serde::{Deserialize, Serialize};

/// The kind of delayed transition a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Cancel an order still unpaid at its payment deadline.
    AutoCancel,
    /// Confirm a shipped order after the dwell period.
    AutoConfirm,
}

impl JobKind {
    /// Returns the kind name used in job identities.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::AutoCancel => "auto-cancel",
            JobKind::AutoConfirm => "auto-confirm",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Deterministic job identity of the form `<kind>-<order-id>`.
///
/// The identity doubles as a dedup key: scheduling the same kind for the same
/// order twice yields one pending job. This stands in for a distributed lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Builds the identity for a (kind, order) pair.
    pub fn for_order(kind: JobKind, order_id: OrderId) -> Self {
        Self(format!("{}-{}", kind.as_str(), order_id))
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of delayed work. The payload is just the order reference; the
/// handler re-reads all other state so stale payloads cannot corrupt orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub order_id: OrderId,
    /// Execution attempt, starting at 1.
    pub attempt: u32,
}

impl Job {
    /// Creates a first-attempt job for an order transition.
    pub fn new(kind: JobKind, order_id: OrderId) -> Self {
        Self {
            id: JobId::for_order(kind, order_id),
            kind,
            order_id,
            attempt: 1,
        }
    }
}
