//! Wire and canonical data shapes
//!
//! `CanonicalZoneState` is the one shape every consumer reads, whichever
//! backend generation produced it. It mirrors the legacy zone-state JSON:
//! known fields are typed, everything else is carried in `extra` maps so a
//! legacy payload round-trips without loss.
//!
//! `RawRoom` is the newer room-based backend's shape. It only ever flows
//! into `normalize::normalize_room`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Power {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkState {
    Online,
    Offline,
}

/// Numeric home identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HomeId(pub u64);

impl fmt::Display for HomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Backend generation serving a home.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    /// Zone-based v2 API
    Legacy,
    /// Newer room-based API on its own host
    Room,
}

/// Temperature reading or target. The room backend uses `value`, the
/// legacy backend `celsius`/`fahrenheit`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Temperature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub celsius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fahrenheit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Temperature {
    pub fn celsius(celsius: f64) -> Self {
        Self {
            celsius: Some(celsius),
            ..Self::default()
        }
    }

    fn has_reading(&self) -> bool {
        self.celsius.is_some() || self.fahrenheit.is_some() || self.value.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSetting {
    /// HEATING, HOT_WATER or AIR_CONDITIONING
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<Power>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<Temperature>,
    /// AC mode: COOL, HEAT, DRY, FAN, AUTO
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_speed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_swing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal_swing: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ZoneSetting {
    pub(crate) fn has_target(&self) -> bool {
        self.temperature.as_ref().is_some_and(Temperature::has_reading)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub state: LinkState,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Overlay or manual-control termination condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Termination {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_skill_based_app: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_in_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_time_in_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projected_expiry: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Termination {
    /// App-facing type, falling back to the raw type.
    pub fn effective_type(&self) -> Option<&str> {
        self.type_skill_based_app
            .as_deref()
            .or(self.kind.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting: Option<ZoneSetting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<Termination>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_in_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_time_in_seconds: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reading expressed as a percentage (humidity, heating power).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentageReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PercentageReading {
    pub fn zero() -> Self {
        Self {
            percentage: Some(0.0),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcPower {
    /// ON or OFF
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorDataPoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inside_temperature: Option<Temperature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<PercentageReading>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDataPoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heating_power: Option<PercentageReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ac_power: Option<AcPower>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Normalized zone state, identical in shape for both generations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalZoneState {
    #[serde(default)]
    pub setting: ZoneSetting,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<Overlay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_window: Option<OpenWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_window_detected: Option<bool>,
    /// Early-start block; presence alone means preheating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preparation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_data_points: Option<SensorDataPoints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_data_points: Option<ActivityDataPoints>,
    /// HOME or AWAY
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tado_mode: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `GET /homes/{id}/zoneStates` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneStates {
    #[serde(default)]
    pub zone_states: BTreeMap<u64, CanonicalZoneState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomConnection {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomOpenWindow {
    #[serde(default)]
    pub activated: Option<bool>,
    #[serde(default)]
    pub expiry_in_seconds: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RoomOpenWindow {
    /// `{}` carries no window information and reads the same as absent.
    pub fn is_empty(&self) -> bool {
        self.activated.is_none() && self.expiry_in_seconds.is_none() && self.extra.is_empty()
    }
}

/// Room as returned by the room backend's `GET /homes/{id}/rooms`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRoom {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub setting: ZoneSetting,
    #[serde(default)]
    pub connection: Option<RoomConnection>,
    #[serde(default)]
    pub sensor_data_points: Option<SensorDataPoints>,
    #[serde(default)]
    pub heating_power: Option<PercentageReading>,
    #[serde(default)]
    pub manual_control_termination: Option<Termination>,
    #[serde(default)]
    pub boost_mode: Option<Termination>,
    #[serde(default)]
    pub open_window: Option<RoomOpenWindow>,
    /// Object (possibly with `preheating`) while the room is in away mode
    #[serde(default)]
    pub away_mode: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Home reference inside the `/me` profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeRef {
    pub id: HomeId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `GET /me` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub homes: Vec<HomeRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Legacy zone list entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `GET /homes/{id}/state` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeState {
    /// HOME or AWAY
    #[serde(default)]
    pub presence: Option<String>,
    #[serde(default)]
    pub presence_locked: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HomeState {
    /// Homes that report a presence lock support automatic geofencing.
    pub fn auto_geofencing_supported(&self) -> bool {
        self.presence_locked.is_some()
    }
}

/// `GET /zones/{id}/defaultOverlay` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultOverlay {
    #[serde(default)]
    pub termination_condition: Option<Termination>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DefaultOverlay {
    pub fn termination_type(&self) -> Option<&str> {
        self.termination_condition.as_ref()?.kind.as_deref()
    }

    pub fn termination_duration(&self) -> Option<u64> {
        let condition = self.termination_condition.as_ref()?;
        condition
            .duration_in_seconds
            .or(condition.remaining_time_in_seconds)
    }
}
