//! Actor attribution for audited mutations.

use common::UserId;
use serde::{Deserialize, Serialize};

/// Who performed a stock or order mutation.
///
/// Stored verbatim in the stock journal so the audit trail records whether a
/// movement came from a customer checkout, an admin action, or a scheduled
/// job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    /// A customer acting on their own order.
    User(UserId),
    /// An admin acting through the back office.
    Admin(UserId),
    /// A scheduled job or other automation.
    System,
}

impl Actor {
    /// Returns true for admin actors.
    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin(_))
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user:{id}"),
            Actor::Admin(id) => write!(f, "admin:{id}"),
            Actor::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for Actor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "system" {
            return Ok(Actor::System);
        }
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| format!("malformed actor: {s}"))?;
        let uuid = uuid::Uuid::parse_str(id).map_err(|e| format!("malformed actor id: {e}"))?;
        match kind {
            "user" => Ok(Actor::User(UserId::from_uuid(uuid))),
            "admin" => Ok(Actor::Admin(UserId::from_uuid(uuid))),
            other => Err(format!("unknown actor kind: {other}")),
        }
    }
}
