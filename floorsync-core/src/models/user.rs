//! Operator identity
//!
//! The session service authenticates operators; the coordinator only ever
//! sees the resolved identity attached to a connection.

use serde::{Deserialize, Serialize};

use crate::models::id::UserId;

/// Authenticated operator identity, as resolved by the session service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    pub name: String,
    pub avatar: Option<String>,
}

impl UserIdentity {
    #[must_use]
    pub fn new(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            avatar: None,
        }
    }

    #[must_use]
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}
