use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("LiveKit API error: {0}")]
    LiveKit(#[from] livekit_api::access_token::AccessTokenError),

    /// A required credential request field was empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("reply model error: {0}")]
    Model(String),

    #[error("moderation session error: {0}")]
    Session(String),
}
