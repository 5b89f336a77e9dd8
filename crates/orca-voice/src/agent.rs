use crate::bootstrap::{AgentTransport, RemoteParticipant};
use crate::error::VoiceError;
use crate::token::Credential;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::watch;
use tracing::info;

/// Identity the moderator agent joins transport rooms with.
pub const AGENT_IDENTITY: &str = "orca-agent";

/// Display name of the moderator agent.
pub const AGENT_NAME: &str = "Orca";

/// The participants of one transport room, as seen by the agent.
///
/// The server announces a participant when it hands out their credential;
/// the agent only ever reads the list.
#[derive(Debug, Clone)]
pub struct RoomRoster {
    participants: watch::Sender<Vec<RemoteParticipant>>,
}

impl Default for RoomRoster {
    fn default() -> Self {
        Self {
            participants: watch::Sender::new(Vec::new()),
        }
    }
}

impl RoomRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a joining participant. Repeat announcements for the same
    /// identity are ignored, and so is the agent itself.
    pub fn announce(&self, participant: RemoteParticipant) {
        self.participants.send_if_modified(|list| {
            if participant.identity == AGENT_IDENTITY
                || list.iter().any(|p| p.identity == participant.identity)
            {
                return false;
            }
            list.push(participant);
            true
        });
    }

    pub fn depart(&self, identity: &str) {
        self.participants.send_if_modified(|list| {
            let before = list.len();
            list.retain(|p| p.identity != identity);
            list.len() != before
        });
    }

    pub fn participants(&self) -> Vec<RemoteParticipant> {
        self.participants.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Vec<RemoteParticipant>> {
        self.participants.subscribe()
    }
}

/// The moderator agent's endpoint in one transport room.
///
/// Media flows through the transport; this client tracks the agent's view of
/// the room (connection, roster) and accounts for the audio it publishes.
#[derive(Debug)]
pub struct AgentVoiceClient {
    credential: Credential,
    roster: RoomRoster,
    connected: watch::Sender<bool>,
    closed: watch::Sender<bool>,
    published_bytes: AtomicU64,
    utterances: AtomicUsize,
}

impl AgentVoiceClient {
    pub fn new(credential: Credential, roster: RoomRoster) -> Self {
        Self {
            credential,
            roster,
            connected: watch::Sender::new(false),
            closed: watch::Sender::new(false),
            published_bytes: AtomicU64::new(0),
            utterances: AtomicUsize::new(0),
        }
    }

    pub fn room_name(&self) -> &str {
        &self.credential.room_name
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Publishes one utterance of PCM audio to the room.
    pub async fn publish_audio(&self, pcm_data: &[u8]) -> Result<(), VoiceError> {
        if !self.is_connected() {
            return Err(VoiceError::Transport(
                "agent is not connected to a room".to_string(),
            ));
        }

        info!(
            room_name = %self.credential.room_name,
            bytes = pcm_data.len(),
            "agent publishing audio"
        );

        self.published_bytes
            .fetch_add(pcm_data.len() as u64, Ordering::Relaxed);
        self.utterances.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Number of utterances published so far.
    pub fn utterances(&self) -> usize {
        self.utterances.load(Ordering::Relaxed)
    }

    pub fn published_bytes(&self) -> u64 {
        self.published_bytes.load(Ordering::Relaxed)
    }

    /// Leaves the room. Pending `wait_for_participant` calls fail.
    pub fn disconnect(&self) {
        self.closed.send_replace(true);
        if self.connected.send_replace(false) {
            info!(room_name = %self.credential.room_name, "agent disconnected");
        }
    }
}

#[async_trait]
impl AgentTransport for AgentVoiceClient {
    async fn connect(&self) -> Result<(), VoiceError> {
        if *self.closed.borrow() {
            return Err(VoiceError::Transport("client was disconnected".to_string()));
        }
        if self.credential.token.is_empty() {
            return Err(VoiceError::Transport("empty agent credential".to_string()));
        }

        info!(
            room_name = %self.credential.room_name,
            endpoint = %self.credential.endpoint,
            "agent connecting"
        );
        self.connected.send_replace(true);
        Ok(())
    }

    async fn wait_for_participant(&self) -> Result<RemoteParticipant, VoiceError> {
        let mut roster = self.roster.subscribe();
        let mut closed = self.closed.subscribe();

        tokio::select! {
            list = roster.wait_for(|list| !list.is_empty()) => {
                let list = list.map_err(|_| VoiceError::Transport("roster closed".to_string()))?;
                list.first()
                    .cloned()
                    .ok_or_else(|| VoiceError::Transport("roster emptied".to_string()))
            }
            _ = closed.wait_for(|closed| *closed) => {
                Err(VoiceError::Transport("disconnected while waiting for a participant".to_string()))
            }
        }
    }
}
