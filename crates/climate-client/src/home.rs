//! Home resolution and backend generation detection

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::dispatch::RequestDispatcher;
use crate::error::{Error, Result};
use crate::model::{Generation, HomeId, UserProfile};

pub const DEFAULT_LEGACY_BASE_URL: &str = "https://my.tado.com/api/v2";
pub const DEFAULT_ROOM_BASE_URL: &str = "https://hops.tado.com";

/// Base URLs of the two API generations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiHosts {
    pub legacy_base_url: String,
    pub room_base_url: String,
}

impl Default for ApiHosts {
    fn default() -> Self {
        Self {
            legacy_base_url: DEFAULT_LEGACY_BASE_URL.to_string(),
            room_base_url: DEFAULT_ROOM_BASE_URL.to_string(),
        }
    }
}

impl ApiHosts {
    /// URL on the legacy host outside any home (`/me`, `/devices/..`).
    pub fn legacy(&self, path: &str) -> String {
        format!("{}/{}", self.legacy_base_url.trim_end_matches('/'), path)
    }

    pub fn legacy_home(&self, home: HomeId, path: &str) -> String {
        home_url(&self.legacy_base_url, home, path)
    }

    pub fn room_home(&self, home: HomeId, path: &str) -> String {
        home_url(&self.room_base_url, home, path)
    }
}

fn home_url(base: &str, home: HomeId, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        format!("{base}/homes/{home}")
    } else {
        format!("{base}/homes/{home}/{path}")
    }
}

/// Picks the account's home and works out which backend serves it.
///
/// Detection results are cached per resolver, keyed by home.
pub struct HomeResolver {
    dispatcher: RequestDispatcher,
    hosts: ApiHosts,
    generations: RwLock<HashMap<HomeId, Generation>>,
}

impl HomeResolver {
    pub fn new(dispatcher: RequestDispatcher, hosts: ApiHosts) -> Self {
        Self {
            dispatcher,
            hosts,
            generations: RwLock::new(HashMap::new()),
        }
    }

    /// `GET /me` on the legacy host.
    pub async fn fetch_profile(&self) -> Result<UserProfile> {
        self.dispatcher.get_as(&self.hosts.legacy("me")).await
    }

    /// First home of the profile.
    pub fn resolve(&self, profile: &UserProfile) -> Result<HomeId> {
        let home = profile.homes.first().ok_or(Error::NoHomes)?;
        debug!(home_id = %home.id, homes = profile.homes.len(), "resolved home");
        Ok(home.id)
    }

    /// Probe the room backend's room listing for `home`.
    ///
    /// A non-empty list means the room generation. An empty or non-list
    /// body, or an API error, means legacy; those answers are cached. Auth
    /// and connection failures also fall back to legacy but are not cached,
    /// so the next call probes again.
    pub async fn detect_generation(&self, home: HomeId) -> Generation {
        if let Some(generation) = self.cached_generation(home).await {
            return generation;
        }

        let url = self.hosts.room_home(home, "rooms");
        let (generation, cacheable) = match self.dispatcher.get(&url).await {
            Ok(Value::Array(rooms)) if !rooms.is_empty() => (Generation::Room, true),
            Ok(_) => (Generation::Legacy, true),
            Err(Error::Api { status, .. }) => {
                debug!(home_id = %home, status, "room listing rejected");
                (Generation::Legacy, true)
            }
            Err(e) => {
                warn!(home_id = %home, error = %e, "generation probe failed, assuming legacy");
                (Generation::Legacy, false)
            }
        };

        if cacheable {
            self.generations.write().await.insert(home, generation);
        }
        info!(home_id = %home, ?generation, "detected backend generation");
        generation
    }

    pub async fn cached_generation(&self, home: HomeId) -> Option<Generation> {
        self.generations.read().await.get(&home).copied()
    }
}
