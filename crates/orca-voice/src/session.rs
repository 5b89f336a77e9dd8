use crate::agent::AgentVoiceClient;
use crate::bootstrap::{ModerationSession, PlayoutHandle};
use crate::error::VoiceError;
use crate::llm::{ChatMessage, ReplyModel};
use crate::tts::SpeechSynthesizer;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// The moderator's voice session in one room.
///
/// The moderation instructions become the system prompt when the session
/// starts. Each reply is generated from the running conversation plus the
/// turn's instructions, synthesized, and published to the room in the
/// background; the returned [`PlayoutHandle`] resolves once publishing is
/// done.
pub struct VoiceModerationSession {
    model: Arc<dyn ReplyModel>,
    tts: Arc<dyn SpeechSynthesizer>,
    voice_profile: String,
    client: Arc<AgentVoiceClient>,
    history: Vec<ChatMessage>,
}

impl VoiceModerationSession {
    pub fn new(
        model: Arc<dyn ReplyModel>,
        tts: Arc<dyn SpeechSynthesizer>,
        voice_profile: impl Into<String>,
        client: Arc<AgentVoiceClient>,
    ) -> Self {
        Self {
            model,
            tts,
            voice_profile: voice_profile.into(),
            client,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }
}

#[async_trait]
impl ModerationSession for VoiceModerationSession {
    async fn start(&mut self, instructions: &str) -> Result<(), VoiceError> {
        if !self.history.is_empty() {
            return Err(VoiceError::Session("session already started".to_string()));
        }
        self.history.push(ChatMessage::system(instructions));
        debug!(room_name = %self.client.room_name(), "moderation session started");
        Ok(())
    }

    async fn generate_reply(&mut self, instructions: &str) -> Result<PlayoutHandle, VoiceError> {
        if self.history.is_empty() {
            return Err(VoiceError::Session("session not started".to_string()));
        }

        let mut turn = self.history.clone();
        turn.push(ChatMessage::user(instructions));
        let reply = self.model.complete(&turn).await?;
        self.history.push(ChatMessage::assistant(reply.clone()));

        let pcm = self.tts.synthesize(&reply, &self.voice_profile).await?;

        let (done, handle) = PlayoutHandle::channel();
        let client = Arc::clone(&self.client);
        tokio::spawn(async move {
            let result = client.publish_audio(&pcm).await;
            if let Err(e) = &result {
                warn!(room_name = %client.room_name(), error = %e, "failed to publish reply");
            }
            let _ = done.send(result);
        });

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::RoomRoster;
    use crate::bootstrap::AgentTransport;
    use crate::llm::Role;
    use crate::token::Credential;
    use std::sync::Mutex;

    #[derive(Default)]
    struct EchoModel {
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl ReplyModel for EchoModel {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, VoiceError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
            Ok(format!("reply to {last}"))
        }
    }

    struct ToneSynth;

    #[async_trait]
    impl SpeechSynthesizer for ToneSynth {
        async fn synthesize(&self, text: &str, _profile_id: &str) -> Result<Vec<u8>, VoiceError> {
            Ok(vec![0; text.len() * 2])
        }
    }

    fn client() -> Arc<AgentVoiceClient> {
        Arc::new(AgentVoiceClient::new(
            Credential {
                endpoint: "ws://localhost:7880".to_string(),
                token: "t".to_string(),
                room_name: "meet_music_r1".to_string(),
            },
            RoomRoster::new(),
        ))
    }

    #[tokio::test]
    async fn reply_uses_system_prompt_and_turn_instructions() {
        let model = Arc::new(EchoModel::default());
        let client = client();
        client.connect().await.unwrap();
        let mut session =
            VoiceModerationSession::new(model.clone(), Arc::new(ToneSynth), "orca", client.clone());

        session.start("moderate kindly").await.unwrap();
        session
            .generate_reply("say hello")
            .await
            .unwrap()
            .wait_for_playout()
            .await
            .unwrap();

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][0], ChatMessage::system("moderate kindly"));
        assert_eq!(seen[0][1], ChatMessage::user("say hello"));

        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[1].role, Role::Assistant);
        assert_eq!(client.utterances(), 1);
        assert_eq!(client.published_bytes(), "reply to say hello".len() as u64 * 2);
    }

    #[tokio::test]
    async fn reply_before_start_is_rejected() {
        let mut session = VoiceModerationSession::new(
            Arc::new(EchoModel::default()),
            Arc::new(ToneSynth),
            "orca",
            client(),
        );
        assert!(matches!(
            session.generate_reply("hi").await,
            Err(VoiceError::Session(_))
        ));
    }

    #[tokio::test]
    async fn playout_reports_publish_failure() {
        let mut session = VoiceModerationSession::new(
            Arc::new(EchoModel::default()),
            Arc::new(ToneSynth),
            "orca",
            client(),
        );
        session.start("x").await.unwrap();
        // Never connected, so publishing fails.
        let err = session
            .generate_reply("hi")
            .await
            .unwrap()
            .wait_for_playout()
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::Transport(_)));
    }
}
