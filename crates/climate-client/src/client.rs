//! Home-scoped client façade
//!
//! `ThermostatClient` binds a dispatcher to one resolved home. Reads and
//! writes that differ by backend generation go through the `Backend` picked
//! at connect time; everything else targets the legacy host, which serves
//! both generations for home-level resources.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::backend::{self, Backend, ManualControl};
use crate::dispatch::RequestDispatcher;
use crate::error::Result;
use crate::home::{ApiHosts, HomeResolver};
use crate::model::{
    CanonicalZoneState, DefaultOverlay, Generation, HomeId, HomeState, UserProfile, Zone,
};
use crate::token_manager::TokenManager;

/// Home presence as set by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Presence {
    Home,
    Away,
    /// Drop the lock and follow geofencing
    Auto,
}

pub struct ThermostatClient {
    dispatcher: RequestDispatcher,
    hosts: ApiHosts,
    home: HomeId,
    backend: Arc<dyn Backend>,
}

impl ThermostatClient {
    /// Resolve the account's home, detect its generation and bind to it.
    #[instrument(skip_all)]
    pub async fn connect(dispatcher: RequestDispatcher, hosts: ApiHosts) -> Result<Self> {
        let resolver = HomeResolver::new(dispatcher.clone(), hosts.clone());
        let profile = resolver.fetch_profile().await?;
        let home = resolver.resolve(&profile)?;
        let generation = resolver.detect_generation(home).await;
        info!(home_id = %home, ?generation, "connected");
        Ok(Self::with_home(dispatcher, hosts, home, generation))
    }

    /// Bind to a known home without any discovery requests.
    pub fn with_home(
        dispatcher: RequestDispatcher,
        hosts: ApiHosts,
        home: HomeId,
        generation: Generation,
    ) -> Self {
        let backend = backend::for_generation(generation, dispatcher.clone(), hosts.clone(), home);
        Self {
            dispatcher,
            hosts,
            home,
            backend,
        }
    }

    pub fn home_id(&self) -> HomeId {
        self.home
    }

    pub fn generation(&self) -> Generation {
        self.backend.generation()
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        self.dispatcher.tokens()
    }

    pub async fn me(&self) -> Result<UserProfile> {
        self.dispatcher.get_as(&self.hosts.legacy("me")).await
    }

    /// Canonical state of every zone, keyed by zone (or room) id.
    pub async fn zone_states(&self) -> Result<BTreeMap<u64, CanonicalZoneState>> {
        self.backend.zone_states().await
    }

    pub async fn devices(&self) -> Result<Vec<Value>> {
        self.backend.devices().await
    }

    pub async fn set_manual_control(&self, zone: u64, control: &ManualControl) -> Result<Value> {
        self.backend.set_manual_control(zone, control).await
    }

    pub async fn resume_schedule(&self, zone: u64) -> Result<Value> {
        self.backend.resume_schedule(zone).await
    }

    pub async fn zones(&self) -> Result<Vec<Zone>> {
        self.dispatcher.get_as(&self.home_url("zones")).await
    }

    pub async fn zone_state(&self, zone: u64) -> Result<CanonicalZoneState> {
        self.dispatcher
            .get_as(&self.home_url(&format!("zones/{zone}/state")))
            .await
    }

    pub async fn capabilities(&self, zone: u64) -> Result<Value> {
        self.dispatcher
            .get(&self.home_url(&format!("zones/{zone}/capabilities")))
            .await
    }

    pub async fn default_overlay(&self, zone: u64) -> Result<DefaultOverlay> {
        self.dispatcher
            .get_as(&self.home_url(&format!("zones/{zone}/defaultOverlay")))
            .await
    }

    pub async fn weather(&self) -> Result<Value> {
        self.dispatcher.get(&self.home_url("weather")).await
    }

    pub async fn home_state(&self) -> Result<HomeState> {
        self.dispatcher.get_as(&self.home_url("state")).await
    }

    /// One device property, e.g. `temperatureOffset`.
    pub async fn device_info(&self, device: &str, key: &str) -> Result<Value> {
        self.dispatcher
            .get(&self.hosts.legacy(&format!("devices/{device}/{key}")))
            .await
    }

    pub async fn set_presence(&self, presence: Presence) -> Result<Value> {
        let url = self.home_url("presenceLock");
        match presence {
            Presence::Auto => self.dispatcher.delete(&url).await,
            locked => {
                self.dispatcher
                    .put(&url, &json!({ "homePresence": locked }))
                    .await
            }
        }
    }

    pub async fn set_temperature_offset(&self, device: &str, celsius: f64) -> Result<Value> {
        let url = self
            .hosts
            .legacy(&format!("devices/{device}/temperatureOffset"));
        self.dispatcher.put(&url, &json!({ "celsius": celsius })).await
    }

    pub async fn set_child_lock(&self, device: &str, enabled: bool) -> Result<Value> {
        let url = self.hosts.legacy(&format!("devices/{device}/childLock"));
        self.dispatcher
            .put(&url, &json!({ "childLockEnabled": enabled }))
            .await
    }

    /// Submit a meter reading; `date` is `YYYY-MM-DD`.
    pub async fn add_meter_reading(&self, date: &str, reading: u64) -> Result<Value> {
        self.dispatcher
            .post(
                &self.home_url("meterReadings"),
                &json!({ "date": date, "reading": reading }),
            )
            .await
    }

    fn home_url(&self, path: &str) -> String {
        self.hosts.legacy_home(self.home, path)
    }
}
