//! Room identity and presence models
//!
//! A room scopes presence, the advisory lock, and cached progress for one
//! business entity. Identity is the (kind, entity id) pair; the canonical
//! `"order:42"` form exists only at the serialization boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::id::{ConnectionId, EntityId, UserId};
use crate::models::lock::Lock;
use crate::models::progress::Progress;
use crate::models::user::UserIdentity;

/// Kind of business entity a room coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    Order,
    Shipment,
}

impl std::fmt::Display for RoomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Order => write!(f, "order"),
            Self::Shipment => write!(f, "shipment"),
        }
    }
}

impl std::str::FromStr for RoomType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(Self::Order),
            "shipment" => Ok(Self::Shipment),
            _ => Err(Error::Validation(format!("Invalid room type: {s}"))),
        }
    }
}

/// Room identity: which entity, of which kind
///
/// Serializes as the canonical `"order:42"` / `"shipment:7"` string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomKey {
    Order(EntityId),
    Shipment(EntityId),
}

impl RoomKey {
    #[must_use]
    pub fn new(room_type: RoomType, entity_id: EntityId) -> Self {
        match room_type {
            RoomType::Order => Self::Order(entity_id),
            RoomType::Shipment => Self::Shipment(entity_id),
        }
    }

    #[must_use]
    pub const fn room_type(&self) -> RoomType {
        match self {
            Self::Order(_) => RoomType::Order,
            Self::Shipment(_) => RoomType::Shipment,
        }
    }

    #[must_use]
    pub const fn entity_id(&self) -> &EntityId {
        match self {
            Self::Order(id) | Self::Shipment(id) => id,
        }
    }
}

impl std::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.room_type(), self.entity_id())
    }
}

impl std::str::FromStr for RoomKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| Error::Validation(format!("Invalid room key: {s}")))?;
        if id.is_empty() {
            return Err(Error::Validation(format!("Invalid room key: {s}")));
        }
        let room_type: RoomType = kind.parse()?;
        Ok(Self::new(room_type, EntityId::from(id)))
    }
}

impl Serialize for RoomKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoomKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One joined connection, as shown to other operators
///
/// Keyed by connection id: two tabs of the same user are two viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    pub user_id: UserId,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub connection_id: ConnectionId,
    pub joined_at: DateTime<Utc>,
}

impl Viewer {
    #[must_use]
    pub fn new(identity: &UserIdentity, connection_id: ConnectionId) -> Self {
        Self {
            user_id: identity.id.clone(),
            user_name: identity.name.clone(),
            user_avatar: identity.avatar.clone(),
            connection_id,
            joined_at: Utc::now(),
        }
    }
}

/// Full room snapshot, unicast to a connection when it joins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub room_id: RoomKey,
    pub room_type: RoomType,
    pub viewers: Vec<Viewer>,
    pub lock_info: Option<Lock>,
    pub progress: Option<Progress>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_key_display() {
        let key = RoomKey::new(RoomType::Order, EntityId::from("42"));
        assert_eq!(key.to_string(), "order:42");
        let key = RoomKey::new(RoomType::Shipment, EntityId::from("7"));
        assert_eq!(key.to_string(), "shipment:7");
    }

    #[test]
    fn test_room_key_parse() {
        let key: RoomKey = "order:42".parse().expect("parse");
        assert_eq!(key.room_type(), RoomType::Order);
        assert_eq!(key.entity_id().as_str(), "42");

        assert!("order".parse::<RoomKey>().is_err());
        assert!("order:".parse::<RoomKey>().is_err());
        assert!("ticket:9".parse::<RoomKey>().is_err());
    }

    #[test]
    fn test_room_key_serializes_as_string() {
        let key = RoomKey::new(RoomType::Shipment, EntityId::from("7"));
        let json = serde_json::to_string(&key).expect("serialize");
        assert_eq!(json, "\"shipment:7\"");

        let back: RoomKey = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, key);
    }

    #[test]
    fn test_entity_id_with_colon_survives_round_trip() {
        // split_once keeps everything after the first colon in the id
        let key: RoomKey = "order:ab:cd".parse().expect("parse");
        assert_eq!(key.entity_id().as_str(), "ab:cd");
        assert_eq!(key.to_string(), "order:ab:cd");
    }
}
