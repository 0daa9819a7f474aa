//! Thermostat cloud API client
//!
//! Sits on top of `climate-auth`: keeps one set of credentials fresh,
//! dispatches authenticated requests with bounded retries, and presents both
//! backend generations through a single canonical zone-state shape.
//!
//! Request lifecycle:
//! 1. `ThermostatClient` builds a generation-specific URL and body
//! 2. `RequestDispatcher` asks the `TokenManager` for a valid access token,
//!    refreshing it first when it is within the buffer of expiry
//! 3. A 401 invalidates the token and retries once; a 429 waits and retries
//! 4. Room-backend responses pass through `normalize_room` before returning
//!
//! Hosts persist the refresh token by watching `TokenManager::subscribe()`.

pub mod backend;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod home;
pub mod model;
pub mod normalize;
pub mod token_manager;
pub mod zone;

pub use backend::{Backend, Fan, LegacyBackend, ManualControl, OverlayTermination, RoomBackend, Swing};
pub use client::{Presence, ThermostatClient};
pub use dispatch::{RequestDispatcher, RetryPolicy, StatusClass, classify_status};
pub use error::{Error, Result};
pub use home::{ApiHosts, HomeResolver};
pub use model::{
    CanonicalZoneState, DefaultOverlay, Generation, HomeId, HomeState, LinkState, Power, RawRoom,
    UserProfile, Zone,
};
pub use normalize::normalize_room;
pub use token_manager::TokenManager;
pub use zone::{HvacAction, HvacMode};
