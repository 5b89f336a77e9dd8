use crate::config::LiveKitConfig;
use crate::error::VoiceError;
use crate::token::{Credential, CredentialRequest, TokenIssuer};
use livekit_api::services::room::RoomClient;

/// Server-side access to the media transport: credential minting plus the
/// room service calls needed to keep live rooms in step with persisted ones.
#[derive(Debug)]
pub struct VoiceService {
    issuer: TokenIssuer,
    room_client: Option<RoomClient>,
}

impl VoiceService {
    pub fn new(config: LiveKitConfig) -> Self {
        let room_client = config.has_credentials().then(|| {
            RoomClient::with_api_key(&config.api_host(), &config.api_key, &config.api_secret)
        });
        Self {
            issuer: TokenIssuer::new(config),
            room_client,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.issuer.endpoint().is_empty()
    }

    pub fn endpoint(&self) -> &str {
        self.issuer.endpoint()
    }

    pub fn issue(&self, request: &CredentialRequest) -> Result<Credential, VoiceError> {
        self.issuer.issue(request)
    }

    /// Disconnects `identity` from the live transport room.
    pub async fn remove_participant(&self, room: &str, identity: &str) -> Result<(), VoiceError> {
        let client = self.room_client()?;
        client
            .remove_participant(room, identity)
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))
    }

    /// Closes a transport room and disconnects everyone still in it.
    pub async fn delete_room(&self, room: &str) -> Result<(), VoiceError> {
        let client = self.room_client()?;
        client
            .delete_room(room)
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))
    }

    fn room_client(&self) -> Result<&RoomClient, VoiceError> {
        self.room_client
            .as_ref()
            .ok_or_else(|| VoiceError::Config("LiveKit API key and secret are not set".to_string()))
    }
}
