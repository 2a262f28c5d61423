pub mod persist;
pub mod resolve;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::sensors::{
    models::{normalize_feed, SensorFeed},
    SensorRecord,
};

use self::{
    persist::{KeyValueStore, MemoryStore, SENSORS_KEY, TOKEN_KEY, USER_KEY},
    resolve::Resolver,
};

/// Name shown when neither the session nor the persisted store knows the user.
pub const DEFAULT_USER_NAME: &str = "User";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            name: DEFAULT_USER_NAME.to_owned(),
            email: String::new(),
        }
    }
}

/// Body of a successful upstream login, as forwarded by the front end.
///
/// `ok: false` marks a rejected login; `msg` then carries the reason.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LoginPayload {
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub user: UserProfile,
    /// One sensor object or an array of them, in upstream wire format.
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub sensors: SensorFeed,
}

/// Everything known about the logged-in user. Replaced wholesale on login,
/// dropped on logout, never patched.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub token: String,
    pub user: UserProfile,
    /// Normalised feed in arrival order, duplicates included.
    pub sensors: Arc<[SensorRecord]>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("login rejected: {0}")]
    Rejected(String),

    #[error("login payload carries no token")]
    MissingToken,
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Live session plus a persisted fallback.
///
/// Cheap to clone; clones share state. The live session sits behind a
/// `tokio::sync::RwLock` so concurrent readers never block each other. The
/// sensor snapshot is an `Arc<[_]>`, so readers hold it without copying.
#[derive(Debug, Clone)]
pub struct SessionStore {
    live: Arc<RwLock<Option<Session>>>,
    persisted: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(persisted: Arc<dyn KeyValueStore>) -> Self {
        Self {
            live: Arc::new(RwLock::new(None)),
            persisted,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Replace the current session with the one described by `payload` and
    /// write it through to the persisted store.
    pub async fn login(&self, payload: LoginPayload) -> Result<Session, SessionError> {
        if payload.ok == Some(false) {
            let reason = payload
                .msg
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "invalid credentials".to_owned());
            warn!(reason = %reason, "Upstream login rejected");
            return Err(SessionError::Rejected(reason));
        }
        if payload.token.trim().is_empty() {
            return Err(SessionError::MissingToken);
        }

        let sensors = normalize_feed(payload.sensors.into_vec());
        let session = Session {
            id: Uuid::new_v4(),
            token: payload.token,
            user: payload.user,
            sensors: Arc::from(sensors),
            started_at: Utc::now(),
        };

        // Held across the write-through so live and persisted never disagree.
        let mut live = self.live.write().await;
        self.persist(&session).await;
        *live = Some(session.clone());
        drop(live);

        info!(
            session_id = %session.id,
            user = %session.user.name,
            sensor_count = session.sensors.len(),
            "Session started"
        );
        Ok(session)
    }

    /// Drop the live session and every persisted key.
    pub async fn logout(&self) {
        let mut live = self.live.write().await;
        for key in [TOKEN_KEY, USER_KEY, SENSORS_KEY] {
            self.persisted.remove(key).await;
        }
        let previous = live.take();
        drop(live);
        match previous {
            Some(s) => info!(session_id = %s.id, "Session ended"),
            None => info!("Logout without live session; persisted keys cleared"),
        }
    }

    /// Rebuild the live session from the persisted store, as after a restart.
    ///
    /// Requires both a token and a readable user; sensors default to empty
    /// when missing or unreadable.
    pub async fn restore(&self) -> Option<Session> {
        let mut live = self.live.write().await;
        let token = self
            .persisted
            .get(TOKEN_KEY)
            .await
            .filter(|t| !t.trim().is_empty())?;
        let user = self.persisted_user().await?;

        let session = Session {
            id: Uuid::new_v4(),
            token,
            user,
            sensors: Arc::from(self.persisted_sensors().await.unwrap_or_default()),
            started_at: Utc::now(),
        };
        *live = Some(session.clone());
        drop(live);

        info!(
            session_id = %session.id,
            sensor_count = session.sensors.len(),
            "Session restored from persisted store"
        );
        Some(session)
    }

    /// The live session, if any.
    pub async fn current(&self) -> Option<Session> {
        self.live.read().await.clone()
    }

    /// Sensor snapshot: live session if it has sensors, else the persisted
    /// copy, else empty.
    pub async fn current_sensors(&self) -> Arc<[SensorRecord]> {
        let live = self.live.read().await.as_ref().map(|s| s.sensors.clone());

        Resolver::new()
            .then("session", async move { live.filter(|s| !s.is_empty()) })
            .then("persisted", async { self.persisted_sensors().await.map(Arc::from) })
            .resolve_or("default", Arc::from(Vec::new()))
            .await
            .value
    }

    /// Logged-in user: live session, else persisted, else a placeholder.
    pub async fn current_user(&self) -> UserProfile {
        let live = self.live.read().await.as_ref().map(|s| s.user.clone());

        Resolver::new()
            .then("session", async move { live })
            .then("persisted", self.persisted_user())
            .resolve_or("default", UserProfile::default())
            .await
            .value
    }

    async fn persist(&self, session: &Session) {
        self.persisted.set(TOKEN_KEY, &session.token).await;

        match serde_json::to_string(&session.user) {
            Ok(json) => self.persisted.set(USER_KEY, &json).await,
            Err(e) => warn!(error = %e, "Failed to serialise user for persistence"),
        }
        match serde_json::to_string(&*session.sensors) {
            Ok(json) => self.persisted.set(SENSORS_KEY, &json).await,
            Err(e) => warn!(error = %e, "Failed to serialise sensors for persistence"),
        }
    }

    async fn persisted_user(&self) -> Option<UserProfile> {
        let raw = self.persisted.get(USER_KEY).await?;
        serde_json::from_str(&raw)
            .inspect_err(|e| warn!(error = %e, "Persisted user is unreadable"))
            .ok()
    }

    /// Persisted snapshot, or `None` when missing, unreadable, or empty.
    async fn persisted_sensors(&self) -> Option<Vec<SensorRecord>> {
        let raw = self.persisted.get(SENSORS_KEY).await?;
        let feed: SensorFeed = serde_json::from_str(&raw)
            .inspect_err(|e| warn!(error = %e, "Persisted sensors are unreadable"))
            .ok()?;
        Some(normalize_feed(feed.into_vec())).filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
