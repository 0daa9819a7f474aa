//! Derived read-side view of a canonical zone state
//!
//! Every consumer (climate entity, sensors, diagnostics) asks the same
//! questions of a zone; the answers live here so they are computed the same
//! way for both backend generations.

use serde::Serialize;

use crate::model::{CanonicalZoneState, LinkState, OpenWindow, Power};

/// Operating mode as presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HvacMode {
    Off,
    /// Powered and following the schedule, no overlay
    SmartSchedule,
    Heat,
    Cool,
    Auto,
    Dry,
    Fan,
}

impl HvacMode {
    fn from_ac_mode(mode: &str) -> Option<Self> {
        match mode {
            "HEAT" => Some(Self::Heat),
            "COOL" => Some(Self::Cool),
            "AUTO" => Some(Self::Auto),
            "DRY" => Some(Self::Dry),
            "FAN" => Some(Self::Fan),
            _ => None,
        }
    }
}

/// What the zone is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HvacAction {
    Off,
    Heat,
    Cool,
    Dry,
    Fan,
    Idle,
}

impl CanonicalZoneState {
    pub fn power(&self) -> Power {
        self.setting.power.unwrap_or(Power::Off)
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.sensor_data_points
            .as_ref()?
            .inside_temperature
            .as_ref()?
            .celsius
    }

    pub fn current_temperature_timestamp(&self) -> Option<&str> {
        self.sensor_data_points
            .as_ref()?
            .inside_temperature
            .as_ref()?
            .timestamp
            .as_deref()
    }

    pub fn current_humidity(&self) -> Option<f64> {
        self.sensor_data_points.as_ref()?.humidity.as_ref()?.percentage
    }

    pub fn current_humidity_timestamp(&self) -> Option<&str> {
        self.sensor_data_points
            .as_ref()?
            .humidity
            .as_ref()?
            .timestamp
            .as_deref()
    }

    /// Setting target, else the overlay's target.
    pub fn target_temperature(&self) -> Option<f64> {
        if let Some(temperature) = &self.setting.temperature {
            return temperature.celsius;
        }
        self.overlay
            .as_ref()?
            .setting
            .as_ref()?
            .temperature
            .as_ref()?
            .celsius
    }

    pub fn hvac_mode(&self) -> HvacMode {
        if self.power() != Power::On {
            return HvacMode::Off;
        }
        let Some(overlay) = &self.overlay else {
            return HvacMode::SmartSchedule;
        };
        let setting = overlay.setting.as_ref();
        match setting.and_then(|s| s.kind.as_deref()) {
            Some("HEATING" | "HOT_WATER") => HvacMode::Heat,
            _ => setting
                .and_then(|s| s.mode.as_deref())
                .and_then(HvacMode::from_ac_mode)
                .unwrap_or(HvacMode::Off),
        }
    }

    pub fn hvac_action(&self) -> HvacAction {
        if self.power() != Power::On {
            return HvacAction::Off;
        }
        let activity = self.activity_data_points.as_ref();
        let heating = activity
            .and_then(|a| a.heating_power.as_ref())
            .and_then(|h| h.percentage)
            .unwrap_or(0.0);
        if heating > 0.0 {
            return HvacAction::Heat;
        }
        let ac_on = activity
            .and_then(|a| a.ac_power.as_ref())
            .and_then(|ac| ac.value.as_deref())
            == Some("ON");
        if ac_on {
            return match self.setting.mode.as_deref() {
                Some("HEAT") => HvacAction::Heat,
                Some("DRY") => HvacAction::Dry,
                Some("FAN") => HvacAction::Fan,
                _ => HvacAction::Cool,
            };
        }
        HvacAction::Idle
    }

    pub fn fan_speed(&self) -> Option<&str> {
        self.setting.fan_speed.as_deref()
    }

    /// Fan level, translating the legacy fan speed when only that is set.
    pub fn fan_level(&self) -> Option<&str> {
        if let Some(level) = self.setting.fan_level.as_deref() {
            return Some(level);
        }
        match self.setting.fan_speed.as_deref()? {
            "LOW" => Some("LEVEL1"),
            "MIDDLE" => Some("LEVEL2"),
            "HIGH" => Some("LEVEL3"),
            "AUTO" => Some("AUTO"),
            _ => None,
        }
    }

    pub fn swing(&self) -> &str {
        self.setting.swing.as_deref().unwrap_or("OFF")
    }

    pub fn vertical_swing(&self) -> Option<&str> {
        self.setting.vertical_swing.as_deref()
    }

    pub fn horizontal_swing(&self) -> Option<&str> {
        self.setting.horizontal_swing.as_deref()
    }

    pub fn overlay_active(&self) -> bool {
        self.overlay.is_some()
    }

    pub fn overlay_termination_type(&self) -> Option<&str> {
        self.overlay.as_ref()?.termination.as_ref()?.effective_type()
    }

    pub fn open_window(&self) -> Option<&OpenWindow> {
        self.open_window.as_ref()
    }

    pub fn open_window_detected(&self) -> bool {
        self.open_window_detected.unwrap_or(false)
    }

    pub fn preparation(&self) -> bool {
        self.preparation.is_some()
    }

    pub fn is_away(&self) -> bool {
        self.tado_mode.as_deref() == Some("AWAY")
    }

    pub fn link_state(&self) -> LinkState {
        self.link
            .as_ref()
            .map(|l| l.state)
            .unwrap_or(LinkState::Offline)
    }

    pub fn available(&self) -> bool {
        self.link_state() == LinkState::Online
    }

    pub fn heating_power_percentage(&self) -> Option<f64> {
        self.activity_data_points
            .as_ref()?
            .heating_power
            .as_ref()?
            .percentage
    }

    pub fn heating_power_timestamp(&self) -> Option<&str> {
        self.activity_data_points
            .as_ref()?
            .heating_power
            .as_ref()?
            .timestamp
            .as_deref()
    }

    /// AC power, ON or OFF.
    pub fn ac_power(&self) -> Option<&str> {
        self.activity_data_points
            .as_ref()?
            .ac_power
            .as_ref()?
            .value
            .as_deref()
    }

    pub fn ac_power_timestamp(&self) -> Option<&str> {
        self.activity_data_points
            .as_ref()?
            .ac_power
            .as_ref()?
            .timestamp
            .as_deref()
    }
}
