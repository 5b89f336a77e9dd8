//! Supervision of the moderator agent, one per live transport room.
//!
//! The agent for a room is spawned when the first credential for that room is
//! handed out, so it is already connected and waiting by the time the first
//! human arrives. Every credential afterwards only announces its participant.
//! The agent is torn down when the room is deleted.

use orca_types::voice::VoiceProfile;
use orca_voice::{
    AgentBootstrap, AgentVoiceClient, BootstrapState, Credential, CredentialRequest,
    ModerationSession, RemoteParticipant, ReplyModel, RoomRoster, SpeechSynthesizer,
    VoiceModerationSession, VoiceService, AGENT_IDENTITY, AGENT_NAME,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Builds the moderation session an agent runs.
pub trait SessionFactory: Send + Sync {
    fn create(&self, client: Arc<AgentVoiceClient>) -> Box<dyn ModerationSession>;
}

/// Sessions backed by a chat model and a TTS voice.
pub struct VoiceSessionFactory {
    model: Arc<dyn ReplyModel>,
    tts: Arc<dyn SpeechSynthesizer>,
    voice: VoiceProfile,
}

impl VoiceSessionFactory {
    pub fn new(
        model: Arc<dyn ReplyModel>,
        tts: Arc<dyn SpeechSynthesizer>,
        voice: VoiceProfile,
    ) -> Self {
        Self { model, tts, voice }
    }
}

impl SessionFactory for VoiceSessionFactory {
    fn create(&self, client: Arc<AgentVoiceClient>) -> Box<dyn ModerationSession> {
        Box::new(VoiceModerationSession::new(
            Arc::clone(&self.model),
            Arc::clone(&self.tts),
            self.voice.id.clone(),
            client,
        ))
    }
}

struct RoomAgent {
    roster: RoomRoster,
    client: Arc<AgentVoiceClient>,
    state: watch::Receiver<BootstrapState>,
    task: JoinHandle<()>,
}

/// Tracks the moderator agent of every live transport room.
///
/// Uses `std::sync::RwLock`: every critical section is a short map operation
/// and never spans an `.await`.
#[derive(Clone)]
pub struct AgentSupervisor {
    voice: Arc<VoiceService>,
    sessions: Option<Arc<dyn SessionFactory>>,
    agents: Arc<RwLock<HashMap<String, RoomAgent>>>,
}

impl AgentSupervisor {
    pub fn new(voice: Arc<VoiceService>, sessions: Arc<dyn SessionFactory>) -> Self {
        Self {
            voice,
            sessions: Some(sessions),
            agents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// A supervisor that never spawns agents.
    pub fn disabled(voice: Arc<VoiceService>) -> Self {
        Self {
            voice,
            sessions: None,
            agents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sessions.is_some()
    }

    /// Records that `request`'s participant received `credential`, spawning
    /// the room's agent first if it has none yet.
    pub fn participant_joined(&self, request: &CredentialRequest, credential: &Credential) {
        let Some(sessions) = &self.sessions else {
            return;
        };

        let mut agents = match self.agents.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("agent registry lock poisoned, recovering");
                poisoned.into_inner()
            }
        };

        if !agents.contains_key(&credential.room_name) {
            match self.spawn_agent(request, &credential.room_name, sessions.as_ref()) {
                Ok(agent) => {
                    agents.insert(credential.room_name.clone(), agent);
                }
                Err(e) => {
                    tracing::warn!(
                        room_name = %credential.room_name,
                        error = %e,
                        "could not start moderator agent"
                    );
                    return;
                }
            }
        }

        if let Some(agent) = agents.get(&credential.room_name) {
            agent.roster.announce(RemoteParticipant {
                identity: request.user_id.clone(),
                name: request.user_name.clone(),
                metadata: request.metadata.clone().unwrap_or_default(),
            });
        }
    }

    fn spawn_agent(
        &self,
        request: &CredentialRequest,
        room_name: &str,
        sessions: &dyn SessionFactory,
    ) -> Result<RoomAgent, orca_voice::VoiceError> {
        let credential = self.voice.issue(&CredentialRequest {
            room_id: request.room_id.clone(),
            topic_id: request.topic_id.clone(),
            user_id: AGENT_IDENTITY.to_string(),
            user_name: AGENT_NAME.to_string(),
            metadata: None,
        })?;

        let roster = RoomRoster::new();
        let client = Arc::new(AgentVoiceClient::new(credential, roster.clone()));
        let mut session = sessions.create(Arc::clone(&client));
        let bootstrap = AgentBootstrap::new();
        let state = bootstrap.subscribe();

        let task = tokio::spawn({
            let client = Arc::clone(&client);
            let room_name = room_name.to_string();
            async move {
                match bootstrap.run(client.as_ref(), session.as_mut()).await {
                    Ok(config) => tracing::info!(
                        room_name = %room_name,
                        learning_language = %config.learning_language,
                        "moderator agent configured"
                    ),
                    Err(e) => tracing::warn!(
                        room_name = %room_name,
                        error = %e,
                        "moderator agent stopped before becoming active"
                    ),
                }
            }
        });

        tracing::info!(room_name, "moderator agent spawned");
        Ok(RoomAgent {
            roster,
            client,
            state,
            task,
        })
    }

    /// Removes a participant from the agent's view of the room.
    pub fn participant_left(&self, room_name: &str, identity: &str) {
        if let Ok(agents) = self.agents.read() {
            if let Some(agent) = agents.get(room_name) {
                agent.roster.depart(identity);
            }
        }
    }

    /// Disconnects and forgets the agent of a deleted room.
    pub fn stop(&self, room_name: &str) -> bool {
        let removed = match self.agents.write() {
            Ok(mut agents) => agents.remove(room_name),
            Err(poisoned) => poisoned.into_inner().remove(room_name),
        };
        match removed {
            Some(agent) => {
                agent.client.disconnect();
                agent.task.abort();
                tracing::info!(room_name, "moderator agent stopped");
                true
            }
            None => false,
        }
    }

    /// Stops every agent. Used on shutdown.
    pub fn stop_all(&self) {
        for room_name in self.rooms() {
            self.stop(&room_name);
        }
    }

    /// Transport rooms that currently have an agent.
    pub fn rooms(&self) -> Vec<String> {
        self.agents
            .read()
            .map(|agents| agents.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Bootstrap progress of a room's agent.
    pub fn watch_state(&self, room_name: &str) -> Option<watch::Receiver<BootstrapState>> {
        self.agents
            .read()
            .ok()?
            .get(room_name)
            .map(|agent| agent.state.clone())
    }

    pub fn client(&self, room_name: &str) -> Option<Arc<AgentVoiceClient>> {
        self.agents
            .read()
            .ok()?
            .get(room_name)
            .map(|agent| Arc::clone(&agent.client))
    }
}
