//! Advisory room lock
//!
//! At most one lock exists per room. It is a UI coordination aid held by a
//! user (not a single connection): any of the holder's connections may
//! release it, and a leave or disconnect by any of them force-releases it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::id::UserId;
use crate::models::user::UserIdentity;

/// Requested strength of the advisory claim
///
/// Both types are mutually exclusive across users; the distinction only
/// changes what other operators are told.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockType {
    View,
    Edit,
}

impl std::fmt::Display for LockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::View => write!(f, "view"),
            Self::Edit => write!(f, "edit"),
        }
    }
}

/// The advisory lock record broadcast to room members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lock {
    pub holder_user_id: UserId,
    pub holder_name: String,
    pub holder_avatar: Option<String>,
    pub lock_type: LockType,
    pub acquired_at: DateTime<Utc>,
    /// Staleness bookkeeping for the sweeper; renewals and holder progress
    /// reports restamp it. Never serialized.
    #[serde(skip, default = "Utc::now")]
    pub refreshed_at: DateTime<Utc>,
}

impl Lock {
    #[must_use]
    pub fn new(holder: &UserIdentity, lock_type: LockType) -> Self {
        let now = Utc::now();
        Self {
            holder_user_id: holder.id.clone(),
            holder_name: holder.name.clone(),
            holder_avatar: holder.avatar.clone(),
            lock_type,
            acquired_at: now,
            refreshed_at: now,
        }
    }

    #[must_use]
    pub fn is_held_by(&self, user_id: &UserId) -> bool {
        &self.holder_user_id == user_id
    }

    pub fn refresh(&mut self) {
        self.refreshed_at = Utc::now();
    }

    #[must_use]
    pub fn expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.refreshed_at > ttl
    }
}
