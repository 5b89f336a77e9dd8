//! Voice profile definitions for the moderator agent.
//!
//! A `VoiceProfile` maps a logical id to a TTS engine and its parameters.

use serde::{Deserialize, Serialize};

/// Supported speech synthesis engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceModel {
    /// Piper TTS (ONNX-based, local).
    #[default]
    Piper,
    /// The operating system's speech synthesizer.
    System,
}

/// How the moderator sounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub id: String,
    pub model: VoiceModel,
    /// Model file, relative to the voices directory unless absolute.
    pub model_path: String,
    /// Speech speed multiplier (1.0 is normal).
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// Speaker index within a multi-speaker model.
    #[serde(default)]
    pub speaker_id: Option<u32>,
}

fn default_speed() -> f32 {
    1.0
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            id: "orca".to_string(),
            model: VoiceModel::Piper,
            model_path: "en_US-lessac-medium.onnx".to_string(),
            speed: default_speed(),
            speaker_id: None,
        }
    }
}
