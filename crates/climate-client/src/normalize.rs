//! Room-to-zone schema normalization
//!
//! Maps a room from the room-based backend onto `CanonicalZoneState` so
//! consumers never branch on backend generation. The mapping is pure and
//! total over any deserialized `RawRoom`, and only ever adds fields: values
//! already present in legacy form are kept as they are.

use serde_json::Value;

use crate::model::{
    ActivityDataPoints, CanonicalZoneState, Link, LinkState, OpenWindow, Overlay,
    PercentageReading, Power, RawRoom, Temperature, Termination,
};

const CONNECTED: &str = "CONNECTED";
const DEFAULT_DEVICE_TYPE: &str = "HEATING";

/// Convert one room into the canonical zone-state shape.
pub fn normalize_room(room: &RawRoom) -> CanonicalZoneState {
    let mut setting = room.setting.clone();
    if setting.power.is_none() {
        setting.power = Some(if setting.has_target() {
            Power::On
        } else {
            Power::Off
        });
    }
    if setting.kind.is_none() {
        setting.kind = Some(DEFAULT_DEVICE_TYPE.to_string());
    }
    if let Some(temperature) = setting.temperature.as_mut() {
        copy_value_to_celsius(temperature);
    }

    let mut sensor_data_points = room.sensor_data_points.clone().unwrap_or_default();
    if let Some(inside) = sensor_data_points.inside_temperature.as_mut() {
        copy_value_to_celsius(inside);
    }

    let link_state = match room.connection.as_ref().and_then(|c| c.state.as_deref()) {
        Some(CONNECTED) => LinkState::Online,
        _ => LinkState::Offline,
    };

    let overlay = room
        .manual_control_termination
        .as_ref()
        .map(manual_termination)
        .or_else(|| room.boost_mode.as_ref().map(boost_termination))
        .map(|termination| Overlay {
            setting: Some(setting.clone()),
            termination: Some(termination),
            ..Overlay::default()
        });

    let window = room.open_window.as_ref().filter(|w| !w.is_empty());
    let (open_window, open_window_detected) = match window {
        Some(window) if window.activated == Some(true) => (
            Some(OpenWindow {
                remaining_time_in_seconds: window.expiry_in_seconds,
                ..OpenWindow::default()
            }),
            None,
        ),
        Some(_) => (None, Some(true)),
        None => (None, None),
    };

    let away = room.away_mode.as_ref().filter(|v| truthy(v));
    let preheating = away
        .and_then(|v| v.get("preheating"))
        .is_some_and(truthy);

    CanonicalZoneState {
        setting,
        link: Some(Link {
            state: link_state,
            extra: Default::default(),
        }),
        overlay,
        open_window,
        open_window_detected,
        preparation: preheating.then_some(Value::Bool(true)),
        sensor_data_points: Some(sensor_data_points),
        activity_data_points: Some(ActivityDataPoints {
            heating_power: Some(
                room.heating_power
                    .clone()
                    .unwrap_or_else(PercentageReading::zero),
            ),
            ..ActivityDataPoints::default()
        }),
        tado_mode: Some(if away.is_some() { "AWAY" } else { "HOME" }.to_string()),
        extra: Default::default(),
    }
}

/// Legacy consumers read `celsius`; the room backend only sends `value`.
fn copy_value_to_celsius(temperature: &mut Temperature) {
    if temperature.celsius.is_none() {
        temperature.celsius = temperature.value;
    }
}

fn manual_termination(mct: &Termination) -> Termination {
    Termination {
        type_skill_based_app: mct.kind.clone().or_else(|| mct.type_skill_based_app.clone()),
        duration_in_seconds: mct.duration_in_seconds,
        remaining_time_in_seconds: mct.remaining_time_in_seconds,
        projected_expiry: mct.projected_expiry.clone(),
        ..Termination::default()
    }
}

fn boost_termination(boost: &Termination) -> Termination {
    Termination {
        type_skill_based_app: boost.kind.clone().or_else(|| boost.type_skill_based_app.clone()),
        duration_in_seconds: boost.duration_in_seconds,
        ..Termination::default()
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
