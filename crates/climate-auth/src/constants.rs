//! OAuth defaults for the thermostat vendor
//!
//! Public client identities used by the vendor's own apps. These values are
//! not secrets: they identify public OAuth clients. Access and refresh tokens
//! are held in memory by the credential store and persisted by the host.

use std::time::Duration;

/// Login host serving the OAuth2 endpoints
pub const DEFAULT_OAUTH_BASE_URL: &str = "https://login.tado.com";

/// First-party web app client (preferred for device authorization)
pub const WEBAPP_CLIENT_ID: &str = "af44f89e-ae86-4ebe-905f-6bf759cf6473";

/// Scopes requested with the web app client
pub const WEBAPP_SCOPE: &str = "home.user offline_access";

/// Fixed secondary client accepted for device authorization
pub const DEVICE_CLIENT_ID: &str = "1bb50063-6b0c-4d11-bd99-387f4a91cc46";

/// Scopes requested with the secondary device client
pub const DEVICE_SCOPE: &str = "offline_access";

/// RFC 8628 grant type used when polling the token endpoint
pub const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Access tokens are treated as expired this long before their real expiry.
pub const TOKEN_REFRESH_BUFFER: Duration = Duration::from_secs(30);

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 600;

/// Poll interval used when the device authorize response omits `interval`.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Added to the poll interval every time the server answers `slow_down`.
pub const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(1);

/// How long a user gets to approve a device authorization in practice.
pub const DEVICE_AUTH_DEADLINE: Duration = Duration::from_secs(300);
