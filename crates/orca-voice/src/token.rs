//! Transport credential issuance.

use crate::config::LiveKitConfig;
use crate::error::VoiceError;
use livekit_api::access_token::{AccessToken, VideoGrants};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Name of the transport room backing a room.
///
/// `scope` is the room's topic id when known, otherwise the room id itself.
pub fn transport_room_name(scope: &str, room_id: &str) -> String {
    format!("meet_{scope}_{room_id}")
}

/// What a client asks a credential for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest {
    pub room_id: String,
    pub topic_id: Option<String>,
    pub user_id: String,
    pub user_name: String,
    /// Opaque participant metadata, forwarded to the transport untouched.
    pub metadata: Option<String>,
}

impl CredentialRequest {
    pub fn room_name(&self) -> String {
        let scope = self
            .topic_id
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.room_id);
        transport_room_name(scope, &self.room_id)
    }

    fn validate(&self) -> Result<(), VoiceError> {
        if self.room_id.trim().is_empty() {
            return Err(VoiceError::MissingField("roomId"));
        }
        if self.user_id.trim().is_empty() {
            return Err(VoiceError::MissingField("userId"));
        }
        if self.user_name.trim().is_empty() {
            return Err(VoiceError::MissingField("userName"));
        }
        Ok(())
    }
}

/// A signed, time-limited credential for one transport room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub endpoint: String,
    pub token: String,
    pub room_name: String,
}

/// Mints join credentials. Stateless apart from its configuration.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    config: LiveKitConfig,
}

impl TokenIssuer {
    pub fn new(config: LiveKitConfig) -> Self {
        Self { config }
    }

    pub fn endpoint(&self) -> &str {
        &self.config.url
    }

    /// Issues a credential granting join, publish, subscribe and data publish
    /// on the request's transport room.
    ///
    /// # Errors
    ///
    /// `MissingField` for an empty identifier, `Config` when no signing key is
    /// configured, `LiveKit` when signing fails.
    pub fn issue(&self, request: &CredentialRequest) -> Result<Credential, VoiceError> {
        request.validate()?;

        if !self.config.has_credentials() {
            return Err(VoiceError::Config(
                "LiveKit API key and secret are not set".to_string(),
            ));
        }

        let room_name = request.room_name();

        let mut token = AccessToken::with_api_key(&self.config.api_key, &self.config.api_secret)
            .with_identity(&request.user_id)
            .with_name(&request.user_name)
            .with_grants(VideoGrants {
                room_join: true,
                room: room_name.clone(),
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                ..Default::default()
            })
            .with_ttl(Duration::from_secs(self.config.token_ttl_seconds));

        if let Some(metadata) = request.metadata.as_deref().filter(|m| !m.is_empty()) {
            token = token.with_metadata(metadata);
        }

        let token = token.to_jwt()?;

        tracing::debug!(
            room_name = %room_name,
            user_id = %request.user_id,
            has_metadata = request.metadata.is_some(),
            "issued transport credential"
        );

        Ok(Credential {
            endpoint: self.config.url.clone(),
            token,
            room_name,
        })
    }
}
