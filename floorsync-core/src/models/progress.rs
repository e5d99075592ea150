//! Pick/pack progress summary
//!
//! A room caches one last-write-wins Progress record so that everyone
//! watching an order sees the same scan counts. No history is kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::id::UserId;
use crate::models::user::UserIdentity;

/// What kind of action produced a progress report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Scan,
    ManualUpdate,
    Verify,
    Complete,
}

/// Line item currently being worked on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentItem {
    pub product_id: String,
    pub product_name: String,
    pub scanned_qty: u32,
    pub total_qty: u32,
}

/// Who did what last, stamped server-side from the reporting connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub timestamp: DateTime<Utc>,
    pub user_id: UserId,
    pub user_name: String,
}

/// Cached progress state for a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub items_scanned: u32,
    pub total_items: u32,
    pub current_item: Option<CurrentItem>,
    pub last_action: Option<LastAction>,
}

/// Inbound partial update; absent fields keep their cached values
///
/// The action carries only its kind: timestamp and reporter identity are
/// always stamped server-side, so a client cannot report as someone else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPatch {
    pub items_scanned: Option<u32>,
    pub total_items: Option<u32>,
    pub current_item: Option<CurrentItem>,
    pub last_action: Option<ActionPatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPatch {
    #[serde(rename = "type")]
    pub kind: Option<ActionKind>,
}

impl Progress {
    /// Merge a patch over the cached value: scalars overwrite when present,
    /// `current_item` is replaced wholly, `last_action` is restamped from
    /// the reporter on every update.
    #[must_use]
    pub fn merge(
        previous: Option<&Progress>,
        patch: ProgressPatch,
        reporter: &UserIdentity,
    ) -> Self {
        Self {
            items_scanned: patch
                .items_scanned
                .unwrap_or_else(|| previous.map_or(0, |p| p.items_scanned)),
            total_items: patch
                .total_items
                .unwrap_or_else(|| previous.map_or(0, |p| p.total_items)),
            current_item: patch
                .current_item
                .or_else(|| previous.and_then(|p| p.current_item.clone())),
            last_action: Some(LastAction {
                kind: patch
                    .last_action
                    .and_then(|a| a.kind)
                    .unwrap_or(ActionKind::ManualUpdate),
                timestamp: Utc::now(),
                user_id: reporter.id.clone(),
                user_name: reporter.name.clone(),
            }),
        }
    }
}
