//! Voice plumbing for Orca rooms.
//!
//! Covers everything between a persisted room and its live media session:
//! minting transport credentials, keeping a client's microphone aligned with
//! its persisted mute intent, and bootstrapping the AI moderator that joins
//! every room. The moderator speaks through a local TTS engine and generates
//! its turns with an OpenAI-compatible chat model.

pub mod agent;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod llm;
pub mod mute;
pub mod service;
pub mod session;
pub mod token;
pub mod tts;

pub use agent::{AgentVoiceClient, RoomRoster, AGENT_IDENTITY, AGENT_NAME};
pub use bootstrap::{
    AgentBootstrap, AgentTransport, BootstrapState, ModerationSession, PlayoutHandle,
    RemoteParticipant,
};
pub use config::{LiveKitConfig, DEV_LIVEKIT_API_KEY, DEV_LIVEKIT_API_SECRET, DEV_LIVEKIT_URL};
pub use error::VoiceError;
pub use llm::{ChatMessage, ModelConfig, OpenAiChatModel, ReplyModel};
pub use mute::{
    ConnectionState, LocalAudio, MicrophoneState, MuteReconciler, ReconcilePhase, TransportSignal,
};
pub use service::VoiceService;
pub use session::VoiceModerationSession;
pub use token::{transport_room_name, Credential, CredentialRequest, TokenIssuer};
pub use tts::{SpeechSynthesizer, TtsService};
