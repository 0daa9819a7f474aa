//! Generation-specific request construction
//!
//! Defines the `Backend` trait so the client façade never branches on
//! backend generation. `LegacyBackend` talks to the zone API,
//! `RoomBackend` to the room API and normalizes its rooms on the way out.
//! Both return the same canonical shapes.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn Backend>`).

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::warn;

use crate::dispatch::RequestDispatcher;
use crate::error::Result;
use crate::home::ApiHosts;
use crate::model::{CanonicalZoneState, Generation, HomeId, Power, RawRoom, ZoneStates};
use crate::normalize::normalize_room;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// When a manual setting ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayTermination {
    /// Until changed by the user
    Manual,
    /// Until the next schedule block starts
    NextTimeBlock,
    /// For this many seconds
    Timer(u64),
}

impl OverlayTermination {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::NextTimeBlock => "NEXT_TIME_BLOCK",
            Self::Timer(_) => "TIMER",
        }
    }

    pub fn duration_secs(&self) -> Option<u64> {
        match self {
            Self::Timer(secs) => Some(*secs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fan {
    /// Legacy speed: LOW, MIDDLE, HIGH, AUTO
    Speed(String),
    /// LEVEL1..LEVEL5, AUTO, SILENT
    Level(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Swing {
    /// Legacy ON/OFF swing
    Legacy(String),
    Axes {
        vertical: Option<String>,
        horizontal: Option<String>,
    },
}

/// A manual (schedule-overriding) setting for one zone or room.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualControl {
    pub power: Power,
    pub temperature: Option<f64>,
    pub termination: OverlayTermination,
    pub device_type: String,
    pub mode: Option<String>,
    pub fan: Option<Fan>,
    pub swing: Option<Swing>,
}

impl ManualControl {
    /// Heat to `celsius` until changed.
    pub fn heat_to(celsius: f64) -> Self {
        Self {
            power: Power::On,
            temperature: Some(celsius),
            termination: OverlayTermination::Manual,
            device_type: "HEATING".to_string(),
            mode: None,
            fan: None,
            swing: None,
        }
    }

    /// Switch off until changed.
    pub fn off() -> Self {
        Self {
            power: Power::Off,
            temperature: None,
            ..Self::heat_to(0.0)
        }
    }

    pub fn with_termination(mut self, termination: OverlayTermination) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_fan(mut self, fan: Fan) -> Self {
        self.fan = Some(fan);
        self
    }

    pub fn with_swing(mut self, swing: Swing) -> Self {
        self.swing = Some(swing);
        self
    }

    /// Body for `PUT /homes/{id}/zones/{id}/overlay`.
    pub fn legacy_payload(&self) -> Value {
        let mut setting = Map::new();
        setting.insert("type".into(), json!(self.device_type));
        setting.insert("power".into(), json!(self.power));
        if let Some(celsius) = self.temperature {
            setting.insert("temperature".into(), json!({ "celsius": celsius }));
        }
        if let Some(mode) = &self.mode {
            setting.insert("mode".into(), json!(mode));
        }
        match &self.fan {
            Some(Fan::Speed(speed)) => {
                setting.insert("fanSpeed".into(), json!(speed));
            }
            Some(Fan::Level(level)) => {
                setting.insert("fanLevel".into(), json!(level));
            }
            None => {}
        }
        match &self.swing {
            Some(Swing::Legacy(swing)) => {
                setting.insert("swing".into(), json!(swing));
            }
            Some(Swing::Axes {
                vertical,
                horizontal,
            }) => {
                if let Some(v) = vertical {
                    setting.insert("verticalSwing".into(), json!(v));
                }
                if let Some(h) = horizontal {
                    setting.insert("horizontalSwing".into(), json!(h));
                }
            }
            None => {}
        }

        let mut termination = Map::new();
        termination.insert(
            "typeSkillBasedApp".into(),
            json!(self.termination.type_name()),
        );
        if let Some(secs) = self.termination.duration_secs() {
            termination.insert("durationInSeconds".into(), json!(secs));
        }

        json!({ "setting": setting, "termination": termination })
    }

    /// Body for `POST /homes/{id}/rooms/{id}/manualControl`.
    pub fn room_payload(&self) -> Value {
        let mut setting = Map::new();
        setting.insert("power".into(), json!(self.power));
        if let Some(celsius) = self.temperature {
            setting.insert("temperature".into(), json!({ "value": celsius }));
        }

        let mut termination = Map::new();
        termination.insert("type".into(), json!(self.termination.type_name()));
        if let Some(secs) = self.termination.duration_secs() {
            termination.insert("durationInSeconds".into(), json!(secs));
        }

        json!({ "setting": setting, "termination": termination })
    }
}

/// Operations whose requests differ by backend generation.
pub trait Backend: Send + Sync {
    fn generation(&self) -> Generation;

    /// Canonical state of every zone (or room), keyed by id.
    fn zone_states(&self) -> BoxFuture<'_, Result<BTreeMap<u64, CanonicalZoneState>>>;

    fn devices(&self) -> BoxFuture<'_, Result<Vec<Value>>>;

    fn set_manual_control<'a>(
        &'a self,
        zone: u64,
        control: &'a ManualControl,
    ) -> BoxFuture<'a, Result<Value>>;

    /// Drop any manual setting and follow the schedule again.
    fn resume_schedule(&self, zone: u64) -> BoxFuture<'_, Result<Value>>;
}

pub struct LegacyBackend {
    dispatcher: RequestDispatcher,
    hosts: ApiHosts,
    home: HomeId,
}

impl LegacyBackend {
    pub fn new(dispatcher: RequestDispatcher, hosts: ApiHosts, home: HomeId) -> Self {
        Self {
            dispatcher,
            hosts,
            home,
        }
    }
}

impl Backend for LegacyBackend {
    fn generation(&self) -> Generation {
        Generation::Legacy
    }

    fn zone_states(&self) -> BoxFuture<'_, Result<BTreeMap<u64, CanonicalZoneState>>> {
        Box::pin(async move {
            let url = self.hosts.legacy_home(self.home, "zoneStates");
            let states: ZoneStates = self.dispatcher.get_as(&url).await?;
            Ok(states.zone_states)
        })
    }

    fn devices(&self) -> BoxFuture<'_, Result<Vec<Value>>> {
        Box::pin(async move {
            let url = self.hosts.legacy_home(self.home, "devices");
            self.dispatcher.get_as(&url).await
        })
    }

    fn set_manual_control<'a>(
        &'a self,
        zone: u64,
        control: &'a ManualControl,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let url = self
                .hosts
                .legacy_home(self.home, &format!("zones/{zone}/overlay"));
            self.dispatcher.put(&url, &control.legacy_payload()).await
        })
    }

    fn resume_schedule(&self, zone: u64) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let url = self
                .hosts
                .legacy_home(self.home, &format!("zones/{zone}/overlay"));
            self.dispatcher.delete(&url).await
        })
    }
}

pub struct RoomBackend {
    dispatcher: RequestDispatcher,
    hosts: ApiHosts,
    home: HomeId,
}

impl RoomBackend {
    pub fn new(dispatcher: RequestDispatcher, hosts: ApiHosts, home: HomeId) -> Self {
        Self {
            dispatcher,
            hosts,
            home,
        }
    }
}

impl Backend for RoomBackend {
    fn generation(&self) -> Generation {
        Generation::Room
    }

    fn zone_states(&self) -> BoxFuture<'_, Result<BTreeMap<u64, CanonicalZoneState>>> {
        Box::pin(async move {
            let url = self.hosts.room_home(self.home, "rooms");
            let rooms: Vec<RawRoom> = self.dispatcher.get_as(&url).await?;
            let mut states = BTreeMap::new();
            for room in &rooms {
                match room.id {
                    Some(id) => {
                        states.insert(id, normalize_room(room));
                    }
                    None => warn!(name = ?room.name, "room without id skipped"),
                }
            }
            Ok(states)
        })
    }

    fn devices(&self) -> BoxFuture<'_, Result<Vec<Value>>> {
        Box::pin(async move {
            let url = self.hosts.room_home(self.home, "actionableDevices");
            self.dispatcher.get_as(&url).await
        })
    }

    fn set_manual_control<'a>(
        &'a self,
        zone: u64,
        control: &'a ManualControl,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let url = self
                .hosts
                .room_home(self.home, &format!("rooms/{zone}/manualControl"));
            self.dispatcher.post(&url, &control.room_payload()).await
        })
    }

    fn resume_schedule(&self, zone: u64) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let url = self
                .hosts
                .room_home(self.home, &format!("rooms/{zone}/resumeSchedule"));
            self.dispatcher.post(&url, &json!({})).await
        })
    }
}

/// The backend implementation for a detected generation.
pub fn for_generation(
    generation: Generation,
    dispatcher: RequestDispatcher,
    hosts: ApiHosts,
    home: HomeId,
) -> Arc<dyn Backend> {
    match generation {
        Generation::Legacy => Arc::new(LegacyBackend::new(dispatcher, hosts, home)),
        Generation::Room => Arc::new(RoomBackend::new(dispatcher, hosts, home)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_manager::TokenManager;
    use climate_auth::{Credentials, OAuthEndpoints, now_millis};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dispatcher() -> RequestDispatcher {
        let creds = Credentials {
            access_token: Some("at".into()),
            refresh_token: "rt".into(),
            expires_at: now_millis() + 3_600_000,
            client_id: "client".into(),
        };
        let http = reqwest::Client::new();
        let tokens = Arc::new(TokenManager::new(
            http.clone(),
            &OAuthEndpoints::new("http://127.0.0.1:1"),
            creds,
        ));
        RequestDispatcher::new(http, tokens)
    }

    fn backend(server: &MockServer, generation: Generation) -> Arc<dyn Backend> {
        let hosts = ApiHosts {
            legacy_base_url: format!("{}/api/v2", server.uri()),
            room_base_url: server.uri(),
        };
        for_generation(generation, dispatcher(), hosts, HomeId(1))
    }

    #[test]
    fn legacy_payload_for_timed_heating() {
        let control = ManualControl::heat_to(21.5).with_termination(OverlayTermination::Timer(1800));
        assert_eq!(
            control.legacy_payload(),
            json!({
                "setting": {"type": "HEATING", "power": "ON", "temperature": {"celsius": 21.5}},
                "termination": {"typeSkillBasedApp": "TIMER", "durationInSeconds": 1800}
            })
        );
    }

    #[test]
    fn legacy_payload_for_air_conditioning() {
        let control = ManualControl::heat_to(24.0)
            .with_device_type("AIR_CONDITIONING")
            .with_mode("COOL")
            .with_fan(Fan::Level("LEVEL3".into()))
            .with_swing(Swing::Axes {
                vertical: Some("MID".into()),
                horizontal: None,
            })
            .with_termination(OverlayTermination::NextTimeBlock);
        let payload = control.legacy_payload();
        assert_eq!(payload["setting"]["type"], "AIR_CONDITIONING");
        assert_eq!(payload["setting"]["mode"], "COOL");
        assert_eq!(payload["setting"]["fanLevel"], "LEVEL3");
        assert!(payload["setting"].get("fanSpeed").is_none());
        assert_eq!(payload["setting"]["verticalSwing"], "MID");
        assert!(payload["setting"].get("horizontalSwing").is_none());
        assert_eq!(payload["termination"]["typeSkillBasedApp"], "NEXT_TIME_BLOCK");
        assert!(payload["termination"].get("durationInSeconds").is_none());
    }

    #[test]
    fn off_payloads_have_no_temperature() {
        let control = ManualControl::off();
        assert_eq!(
            control.legacy_payload(),
            json!({
                "setting": {"type": "HEATING", "power": "OFF"},
                "termination": {"typeSkillBasedApp": "MANUAL"}
            })
        );
        assert_eq!(
            control.room_payload(),
            json!({"setting": {"power": "OFF"}, "termination": {"type": "MANUAL"}})
        );
    }

    #[test]
    fn room_payload_uses_value() {
        let control = ManualControl::heat_to(19.0).with_termination(OverlayTermination::Timer(600));
        assert_eq!(
            control.room_payload(),
            json!({
                "setting": {"power": "ON", "temperature": {"value": 19.0}},
                "termination": {"type": "TIMER", "durationInSeconds": 600}
            })
        );
    }

    #[tokio::test]
    async fn legacy_zone_states() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/homes/1/zoneStates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "zoneStates": {
                    "1": {"setting": {"type": "HEATING", "power": "ON"}, "link": {"state": "ONLINE"}},
                    "3": {"setting": {"type": "HOT_WATER", "power": "OFF"}}
                }
            })))
            .mount(&server)
            .await;

        let states = backend(&server, Generation::Legacy).zone_states().await.unwrap();
        assert_eq!(states.len(), 2);
        assert!(states[&1].available());
        assert_eq!(states[&3].setting.kind.as_deref(), Some("HOT_WATER"));
    }

    #[tokio::test]
    async fn room_zone_states_are_normalized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/homes/1/rooms"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 4, "name": "Bedroom", "setting": {"temperature": {"value": 18}}, "connection": {"state": "CONNECTED"}},
                {"name": "Ghost"}
            ])))
            .mount(&server)
            .await;

        let backend = backend(&server, Generation::Room);
        assert_eq!(backend.generation(), Generation::Room);
        let states = backend.zone_states().await.unwrap();
        assert_eq!(states.len(), 1);
        let bedroom = &states[&4];
        assert_eq!(bedroom.setting.power, Some(Power::On));
        assert_eq!(bedroom.target_temperature(), Some(18.0));
        assert!(bedroom.available());
    }

    #[tokio::test]
    async fn legacy_manual_control_and_resume() {
        let server = MockServer::start().await;
        let control = ManualControl::heat_to(22.0);
        Mock::given(method("PUT"))
            .and(path("/api/v2/homes/1/zones/2/overlay"))
            .and(body_json(control.legacy_payload()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"type": "MANUAL"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/v2/homes/1/zones/2/overlay"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server, Generation::Legacy);
        backend.set_manual_control(2, &control).await.unwrap();
        assert_eq!(backend.resume_schedule(2).await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn room_manual_control_and_resume() {
        let server = MockServer::start().await;
        let control = ManualControl::off();
        Mock::given(method("POST"))
            .and(path("/homes/1/rooms/4/manualControl"))
            .and(body_json(control.room_payload()))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/homes/1/rooms/4/resumeSchedule"))
            .and(body_json(json!({})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/homes/1/actionableDevices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"serialNumber": "VA1"}])))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server, Generation::Room);
        backend.set_manual_control(4, &control).await.unwrap();
        backend.resume_schedule(4).await.unwrap();
        let devices = backend.devices().await.unwrap();
        assert_eq!(devices[0]["serialNumber"], "VA1");
    }
}
