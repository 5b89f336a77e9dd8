//! One-shot configuration of the moderator agent.
//!
//! The agent joins the transport room before any human, waits for the first
//! human participant, reads that participant's metadata once, starts its
//! moderation session from it and speaks a single greeting. Later joiners'
//! metadata is never read, so the session's instructions cannot change after
//! bootstrap.

use crate::error::VoiceError;
use async_trait::async_trait;
use orca_types::{AgentConfig, AgentMetadata};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};

/// A human participant as the transport reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteParticipant {
    pub identity: String,
    pub name: String,
    /// Opaque metadata attached to the participant's credential.
    pub metadata: String,
}

/// Where the agent is in its bootstrap sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapState {
    AwaitingConnection,
    AwaitingFirstParticipant,
    Configuring,
    Active,
    Failed,
}

/// The agent's connection to a transport room.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn connect(&self) -> Result<(), VoiceError>;

    /// Resolves with the first human participant in the room.
    async fn wait_for_participant(&self) -> Result<RemoteParticipant, VoiceError>;
}

/// A conversational voice session driven by instructions.
#[async_trait]
pub trait ModerationSession: Send {
    /// Starts the session with persistent moderation instructions.
    async fn start(&mut self, instructions: &str) -> Result<(), VoiceError>;

    /// Produces one spoken reply for the given per-turn instructions.
    async fn generate_reply(&mut self, instructions: &str) -> Result<PlayoutHandle, VoiceError>;
}

/// Completes when a generated reply has finished playing out.
#[derive(Debug)]
pub struct PlayoutHandle {
    done: oneshot::Receiver<Result<(), VoiceError>>,
}

impl PlayoutHandle {
    /// A handle plus the sender its producer completes it with.
    pub fn channel() -> (oneshot::Sender<Result<(), VoiceError>>, Self) {
        let (tx, done) = oneshot::channel();
        (tx, Self { done })
    }

    /// A handle for a reply that already finished.
    pub fn finished() -> Self {
        let (tx, handle) = Self::channel();
        let _ = tx.send(Ok(()));
        handle
    }

    pub async fn wait_for_playout(self) -> Result<(), VoiceError> {
        self.done
            .await
            .map_err(|_| VoiceError::Session("playout was abandoned".to_string()))?
    }
}

/// Drives one agent through its bootstrap and publishes its progress.
#[derive(Debug)]
pub struct AgentBootstrap {
    state: watch::Sender<BootstrapState>,
}

impl Default for AgentBootstrap {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBootstrap {
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(BootstrapState::AwaitingConnection),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<BootstrapState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> BootstrapState {
        *self.state.borrow()
    }

    /// Runs the bootstrap to completion and returns the configuration the
    /// session was started with.
    ///
    /// Unreadable metadata is not an error: the defaults are used instead.
    ///
    /// # Errors
    ///
    /// Transport or session failures; the state moves to `Failed`.
    pub async fn run<T, S>(&self, transport: &T, session: &mut S) -> Result<AgentConfig, VoiceError>
    where
        T: AgentTransport + ?Sized,
        S: ModerationSession + ?Sized,
    {
        let result = self.run_inner(transport, session).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "agent bootstrap failed");
            self.state.send_replace(BootstrapState::Failed);
        }
        result
    }

    async fn run_inner<T, S>(
        &self,
        transport: &T,
        session: &mut S,
    ) -> Result<AgentConfig, VoiceError>
    where
        T: AgentTransport + ?Sized,
        S: ModerationSession + ?Sized,
    {
        transport.connect().await?;
        self.state.send_replace(BootstrapState::AwaitingFirstParticipant);

        let participant = transport.wait_for_participant().await?;
        self.state.send_replace(BootstrapState::Configuring);
        tracing::info!(identity = %participant.identity, "first participant joined");

        let config = match AgentMetadata::parse(&participant.metadata) {
            Ok(meta) => AgentConfig::from(meta),
            Err(e) => {
                tracing::warn!(
                    identity = %participant.identity,
                    error = %e,
                    "unreadable participant metadata, using defaults"
                );
                AgentConfig::default()
            }
        };

        session.start(&config.room_instructions).await?;
        session
            .generate_reply(&config.greeting_instructions)
            .await?
            .wait_for_playout()
            .await?;

        self.state.send_replace(BootstrapState::Active);
        tracing::info!(
            learning_language = %config.learning_language,
            topic_title = config.topic_title.as_deref().unwrap_or(""),
            "agent active"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orca_types::agent::{DEFAULT_GREETING_INSTRUCTIONS, DEFAULT_ROOM_INSTRUCTIONS};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedTransport {
        participants: Mutex<Vec<RemoteParticipant>>,
        waits: AtomicUsize,
        fail_connect: bool,
    }

    impl ScriptedTransport {
        fn with_metadata(metadata: &[&str]) -> Self {
            Self {
                participants: Mutex::new(
                    metadata
                        .iter()
                        .enumerate()
                        .map(|(i, m)| RemoteParticipant {
                            identity: format!("user{i}"),
                            name: format!("User {i}"),
                            metadata: m.to_string(),
                        })
                        .collect(),
                ),
                waits: AtomicUsize::new(0),
                fail_connect: false,
            }
        }
    }

    #[async_trait]
    impl AgentTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), VoiceError> {
            if self.fail_connect {
                return Err(VoiceError::Transport("refused".to_string()));
            }
            Ok(())
        }

        async fn wait_for_participant(&self) -> Result<RemoteParticipant, VoiceError> {
            self.waits.fetch_add(1, Ordering::SeqCst);
            let mut participants = self.participants.lock().unwrap();
            if participants.is_empty() {
                return Err(VoiceError::Transport("nobody came".to_string()));
            }
            Ok(participants.remove(0))
        }
    }

    #[derive(Default)]
    struct RecordingSession {
        started_with: Vec<String>,
        replies: Vec<String>,
    }

    #[async_trait]
    impl ModerationSession for RecordingSession {
        async fn start(&mut self, instructions: &str) -> Result<(), VoiceError> {
            self.started_with.push(instructions.to_string());
            Ok(())
        }

        async fn generate_reply(
            &mut self,
            instructions: &str,
        ) -> Result<PlayoutHandle, VoiceError> {
            self.replies.push(instructions.to_string());
            Ok(PlayoutHandle::finished())
        }
    }

    #[tokio::test]
    async fn first_participant_metadata_configures_session() {
        let transport = ScriptedTransport::with_metadata(&[
            r#"{"roomInstructions":"X","greetingInstructions":"Y","learningLanguage":"French"}"#,
            r#"{"roomInstructions":"LATE"}"#,
        ]);
        let mut session = RecordingSession::default();
        let bootstrap = AgentBootstrap::new();

        let config = bootstrap.run(&transport, &mut session).await.unwrap();

        assert_eq!(session.started_with, vec!["X"]);
        assert_eq!(session.replies, vec!["Y"]);
        assert_eq!(config.learning_language, "French");
        assert_eq!(config.native_language, "English");
        assert_eq!(bootstrap.state(), BootstrapState::Active);
        assert_eq!(transport.waits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bad_metadata_falls_back_to_defaults() {
        for raw in ["", "not json", "[1,2]", r#"{"roomInstructions":42}"#] {
            let transport = ScriptedTransport::with_metadata(&[raw]);
            let mut session = RecordingSession::default();
            let bootstrap = AgentBootstrap::new();

            let config = bootstrap.run(&transport, &mut session).await.unwrap();

            assert_eq!(config, AgentConfig::default(), "metadata {raw:?}");
            assert_eq!(session.started_with, vec![DEFAULT_ROOM_INSTRUCTIONS]);
            assert_eq!(session.replies, vec![DEFAULT_GREETING_INSTRUCTIONS]);
        }
    }

    #[tokio::test]
    async fn transport_failure_marks_failed() {
        let transport = ScriptedTransport {
            fail_connect: true,
            ..ScriptedTransport::with_metadata(&["{}"])
        };
        let mut session = RecordingSession::default();
        let bootstrap = AgentBootstrap::new();

        assert!(bootstrap.run(&transport, &mut session).await.is_err());
        assert_eq!(bootstrap.state(), BootstrapState::Failed);
        assert!(session.started_with.is_empty());
    }

    #[tokio::test]
    async fn active_only_after_greeting_playout() {
        type Slot = std::sync::Arc<Mutex<Option<oneshot::Sender<Result<(), VoiceError>>>>>;

        struct SlowSession {
            playout: Slot,
        }

        #[async_trait]
        impl ModerationSession for SlowSession {
            async fn start(&mut self, _: &str) -> Result<(), VoiceError> {
                Ok(())
            }

            async fn generate_reply(&mut self, _: &str) -> Result<PlayoutHandle, VoiceError> {
                let (tx, handle) = PlayoutHandle::channel();
                *self.playout.lock().unwrap() = Some(tx);
                Ok(handle)
            }
        }

        let slot: Slot = Default::default();
        let transport = ScriptedTransport::with_metadata(&["{}"]);
        let bootstrap = std::sync::Arc::new(AgentBootstrap::new());
        let mut states = bootstrap.subscribe();

        let run = {
            let bootstrap = std::sync::Arc::clone(&bootstrap);
            let mut session = SlowSession {
                playout: slot.clone(),
            };
            tokio::spawn(async move { bootstrap.run(&transport, &mut session).await })
        };

        states
            .wait_for(|s| *s == BootstrapState::Configuring)
            .await
            .unwrap();
        while slot.lock().unwrap().is_none() {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(bootstrap.state(), BootstrapState::Configuring);

        let tx = slot.lock().unwrap().take().unwrap();
        tx.send(Ok(())).unwrap();

        run.await.unwrap().unwrap();
        assert_eq!(bootstrap.state(), BootstrapState::Active);
    }

    #[tokio::test]
    async fn abandoned_playout_fails_bootstrap() {
        struct DroppingSession;

        #[async_trait]
        impl ModerationSession for DroppingSession {
            async fn start(&mut self, _: &str) -> Result<(), VoiceError> {
                Ok(())
            }

            async fn generate_reply(&mut self, _: &str) -> Result<PlayoutHandle, VoiceError> {
                let (_tx, handle) = PlayoutHandle::channel();
                Ok(handle)
            }
        }

        let transport = ScriptedTransport::with_metadata(&["{}"]);
        let bootstrap = AgentBootstrap::new();
        let err = bootstrap
            .run(&transport, &mut DroppingSession)
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::Session(_)));
        assert_eq!(bootstrap.state(), BootstrapState::Failed);
    }
}
