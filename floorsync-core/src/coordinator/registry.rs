//! Connection registry
//!
//! One record per live WebSocket, bound to the operator the session
//! service vouched for. The record carries the outbound queue handle and
//! the joined-room set that drives the disconnect cascade.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{ConnectionId, RoomKey, UserId, UserIdentity};

use super::router::EventSender;

/// Live connection record
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    pub identity: UserIdentity,
    pub sender: EventSender,
    pub connected_at: Instant,
    pub last_activity: Instant,
    pub rooms: HashSet<RoomKey>,
}

impl ConnectionInfo {
    fn new(connection_id: ConnectionId, identity: UserIdentity, sender: EventSender) -> Self {
        let now = Instant::now();
        Self {
            connection_id,
            identity,
            sender,
            connected_at: now,
            last_activity: now,
            rooms: HashSet::new(),
        }
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    #[must_use]
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Connection limits configuration
#[derive(Debug, Clone)]
pub struct ConnectionLimits {
    /// Maximum total connections
    pub max_total: usize,

    /// Maximum connections per user
    pub max_per_user: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_total: 10_000,
            max_per_user: 8,
        }
    }
}

/// Registry of live, authenticated connections
#[derive(Clone)]
pub struct ConnectionRegistry {
    /// All active connections by id
    connections: Arc<DashMap<ConnectionId, ConnectionInfo>>,

    /// Connections by user, for per-user limits and fan-out exclusion
    user_connections: Arc<DashMap<UserId, Vec<ConnectionId>>>,

    limits: Arc<ConnectionLimits>,

    /// Connections ever accepted since process start
    total_connections: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new(limits: ConnectionLimits) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            user_connections: Arc::new(DashMap::new()),
            limits: Arc::new(limits),
            total_connections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a new connection
    ///
    /// Re-registering an id replaces the record. A limit violation fails
    /// the registration and the transport layer closes the socket.
    pub fn register(
        &self,
        connection_id: ConnectionId,
        identity: UserIdentity,
        sender: EventSender,
    ) -> Result<()> {
        let replacing = self.connections.contains_key(&connection_id);
        if !replacing && self.connections.len() >= self.limits.max_total {
            return Err(Error::ConnectionLimit(format!(
                "Server at capacity ({} connections)",
                self.limits.max_total
            )));
        }

        let user_id = identity.id.clone();
        if let Some(user_conns) = self.user_connections.get(&user_id) {
            let already_indexed = user_conns.iter().any(|id| id == &connection_id);
            if !already_indexed && user_conns.len() >= self.limits.max_per_user {
                return Err(Error::ConnectionLimit(format!(
                    "Too many connections for this user (max {})",
                    self.limits.max_per_user
                )));
            }
        }

        let record = ConnectionInfo::new(connection_id.clone(), identity, sender);
        if let Some(previous) = self.connections.insert(connection_id.clone(), record) {
            // replaced a stale record; keep the user index consistent
            if previous.identity.id != user_id {
                self.remove_user_index(&previous.identity.id, &connection_id);
            }
        }

        let mut user_conns = self.user_connections.entry(user_id.clone()).or_default();
        if !user_conns.iter().any(|id| id == &connection_id) {
            user_conns.push(connection_id.clone());
        }
        drop(user_conns);

        self.total_connections.fetch_add(1, Ordering::Relaxed);

        info!(
            connection_id = %connection_id,
            user = %user_id,
            active = self.connections.len(),
            "Connection registered"
        );

        Ok(())
    }

    /// Remove a connection and hand back its record, joined rooms included,
    /// so the caller can run the room cascade
    pub fn unregister(&self, connection_id: &ConnectionId) -> Option<ConnectionInfo> {
        let (_, info) = self.connections.remove(connection_id)?;
        self.remove_user_index(&info.identity.id, connection_id);

        info!(
            connection_id = %connection_id,
            user = %info.identity.id,
            rooms = info.rooms.len(),
            duration = ?info.duration(),
            "Connection unregistered"
        );

        Some(info)
    }

    fn remove_user_index(&self, user_id: &UserId, connection_id: &ConnectionId) {
        if let Some(mut user_conns) = self.user_connections.get_mut(user_id) {
            user_conns.retain(|id| id != connection_id);
        }
        self.user_connections
            .remove_if(user_id, |_, conns| conns.is_empty());
    }

    /// Stamp activity; called for every inbound frame, pongs included
    pub fn touch(&self, connection_id: &ConnectionId) {
        if let Some(mut conn) = self.connections.get_mut(connection_id) {
            conn.last_activity = Instant::now();
        }
    }

    /// Record that a connection joined a room
    ///
    /// Returns false if the connection is no longer registered, in which
    /// case the caller undoes the membership it just created.
    pub fn track_room(&self, connection_id: &ConnectionId, room: RoomKey) -> bool {
        match self.connections.get_mut(connection_id) {
            Some(mut conn) => {
                conn.rooms.insert(room);
                true
            }
            None => false,
        }
    }

    /// Forget a room membership after an explicit leave
    pub fn untrack_room(&self, connection_id: &ConnectionId, room: &RoomKey) {
        if let Some(mut conn) = self.connections.get_mut(connection_id) {
            conn.rooms.remove(room);
        }
    }

    /// Connections with no inbound traffic for longer than `max_idle`
    #[must_use]
    pub fn idle_connections(&self, max_idle: Duration) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|entry| entry.value().idle_duration() > max_idle)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Identity and outbound queue for a live connection
    #[must_use]
    pub fn lookup(&self, connection_id: &ConnectionId) -> Option<(UserIdentity, EventSender)> {
        self.connections
            .get(connection_id)
            .map(|conn| (conn.identity.clone(), conn.sender.clone()))
    }

    /// Full connection record
    #[must_use]
    pub fn get(&self, connection_id: &ConnectionId) -> Option<ConnectionInfo> {
        self.connections.get(connection_id).map(|c| c.clone())
    }

    /// Sender handles for every live connection, minus every connection of
    /// `excluded` when set (the action fan-out skips the actor)
    #[must_use]
    pub fn senders_excluding(&self, excluded: Option<&UserId>) -> Vec<(ConnectionId, EventSender)> {
        self.connections
            .iter()
            .filter(|entry| excluded.map_or(true, |user| entry.value().identity.id != *user))
            .map(|entry| (entry.key().clone(), entry.value().sender.clone()))
            .collect()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn user_connection_count(&self, user_id: &UserId) -> usize {
        self.user_connections
            .get(user_id)
            .map_or(0, |conns| conns.len())
    }

    /// Get metrics summary
    #[must_use]
    pub fn metrics(&self) -> RegistryMetrics {
        RegistryMetrics {
            active_connections: self.connections.len(),
            active_users: self.user_connections.len(),
            total_connections: self.total_connections.load(Ordering::Relaxed),
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(ConnectionLimits::default())
    }
}

/// Registry counters
#[derive(Debug, Clone)]
pub struct RegistryMetrics {
    pub active_connections: usize,
    pub active_users: usize,
    pub total_connections: u64,
}
