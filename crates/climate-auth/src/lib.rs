//! OAuth authentication for the thermostat cloud API
//!
//! Provides the three login flows (device code, PKCE authorization code,
//! password), the token endpoint exchanges they share, and the in-memory
//! credential holder. This crate has no dependency on the API client and
//! can be used on its own to obtain a refresh token.
//!
//! Credential flow:
//! 1. Host runs one of `DeviceAuthFlow`, `PkceFlow` or `PasswordFlow`
//! 2. The flow returns `Credentials` tied to the client identity that issued them
//! 3. The client crate's token manager keeps them fresh via `token::refresh_token()`
//! 4. The host persists each rotated refresh token it is handed

pub mod config;
pub mod constants;
pub mod credentials;
pub mod device;
pub mod error;
pub mod password;
pub mod pkce;
pub mod token;

pub use config::{ClientIdentity, OAuthConfig, OAuthEndpoints, PkceConfig};
pub use constants::*;
pub use credentials::{CredentialStore, Credentials, now_millis};
pub use device::{DeviceAuthFlow, DeviceAuthHandle, DeviceAuthSession, DeviceAuthState, DevicePoll};
pub use error::{Error, Result};
pub use password::PasswordFlow;
pub use pkce::{PkceFlow, PkceSession, compute_challenge, generate_verifier, parse_redirect};
pub use token::{TokenResponse, refresh_token};
