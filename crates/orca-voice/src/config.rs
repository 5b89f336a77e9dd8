use serde::{Deserialize, Serialize};
use std::fmt;

/// Local LiveKit dev server started with `livekit-server --dev`.
pub const DEV_LIVEKIT_URL: &str = "ws://localhost:7880";
pub const DEV_LIVEKIT_API_KEY: &str = "devkey";
pub const DEV_LIVEKIT_API_SECRET: &str = "secret";

fn default_token_ttl_seconds() -> u64 {
    4 * 60 * 60
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LiveKitConfig {
    /// Endpoint handed to clients alongside their credential.
    pub url: String,
    pub api_key: String,
    #[serde(skip_serializing)]
    pub api_secret: String,
    /// Credential lifetime in seconds. Default: 14400 (4 hours).
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
}

/// Unconfigured: no endpoint and no signing key, so issuance fails until
/// `[livekit]` or the `LIVEKIT_*` variables are set.
impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            token_ttl_seconds: default_token_ttl_seconds(),
        }
    }
}

impl fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .finish()
    }
}

impl LiveKitConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            token_ttl_seconds: default_token_ttl_seconds(),
        }
    }

    /// The well-known `livekit-server --dev` credentials. Never use outside
    /// local development and tests.
    pub fn dev() -> Self {
        Self::new(DEV_LIVEKIT_URL, DEV_LIVEKIT_API_KEY, DEV_LIVEKIT_API_SECRET)
    }

    /// Whether credentials can be signed with this configuration.
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }

    /// HTTP(S) base for server-side room service calls.
    ///
    /// Clients connect over `ws(s)://`; the room service API lives on the same
    /// host over `http(s)://`.
    pub fn api_host(&self) -> String {
        if let Some(rest) = self.url.strip_prefix("wss://") {
            format!("https://{rest}")
        } else if let Some(rest) = self.url.strip_prefix("ws://") {
            format!("http://{rest}")
        } else {
            self.url.clone()
        }
    }
}
