use crate::error::VoiceError;
use async_trait::async_trait;
use orca_types::voice::{VoiceModel, VoiceProfile};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::RwLock;

/// Maximum text input size for TTS (64 KiB).
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Timeout for TTS process execution.
const TTS_TIMEOUT: Duration = Duration::from_secs(60);

/// Size of the RIFF header `espeak-ng --stdout` prepends.
const WAV_HEADER_BYTES: usize = 44;

/// Turns reply text into raw PCM audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, profile_id: &str) -> Result<Vec<u8>, VoiceError>;
}

/// Service for generating speech from text with local engines.
#[derive(Debug, Clone)]
pub struct TtsService {
    profiles: Arc<RwLock<HashMap<String, VoiceProfile>>>,
    voices_dir: PathBuf,
    piper_binary: PathBuf,
}

impl TtsService {
    pub fn new(voices_dir: impl AsRef<Path>, piper_binary: impl AsRef<Path>) -> Self {
        Self {
            profiles: Arc::new(RwLock::new(HashMap::new())),
            voices_dir: voices_dir.as_ref().to_path_buf(),
            piper_binary: piper_binary.as_ref().to_path_buf(),
        }
    }

    pub async fn add_profile(&self, profile: VoiceProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile);
    }

    pub async fn get_profile(&self, id: &str) -> Option<VoiceProfile> {
        self.profiles.read().await.get(id).cloned()
    }

    fn check_input(text: &str) -> Result<(), VoiceError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }
        Ok(())
    }

    async fn synthesize_piper(
        &self,
        text: &str,
        profile: &VoiceProfile,
    ) -> Result<Vec<u8>, VoiceError> {
        Self::check_input(text)?;

        let model_path = if Path::new(&profile.model_path).is_absolute() {
            PathBuf::from(&profile.model_path)
        } else {
            self.voices_dir.join(&profile.model_path)
        };

        if !model_path.exists() {
            return Err(VoiceError::Tts(format!(
                "Model file not found: {model_path:?}"
            )));
        }

        if profile.speed < 0.1 || profile.speed > 10.0 {
            return Err(VoiceError::Config(
                "Speed must be between 0.1 and 10.0".to_string(),
            ));
        }

        let mut command = Command::new(&self.piper_binary);
        command
            .arg("--model")
            .arg(&model_path)
            .arg("--output_raw")
            // Piper's length scale is the inverse of speed.
            .arg("--length_scale")
            .arg((1.0 / profile.speed).to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(speaker) = profile.speaker_id {
            command.arg("--speaker").arg(speaker.to_string());
        }

        let mut child = command
            .spawn()
            .map_err(|e| VoiceError::Tts(format!("Failed to spawn piper: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Tts("Failed to open stdin".to_string()))?;
        let text_owned = text.to_string();

        // Write from a separate task so a full stdout pipe cannot deadlock us.
        let write_task = tokio::spawn(async move { stdin.write_all(text_owned.as_bytes()).await });

        let output = tokio::time::timeout(TTS_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::Tts(format!(
                    "TTS process timed out after {} seconds",
                    TTS_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::Tts(format!("Failed to wait for piper: {e}")))?;

        match write_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(VoiceError::Tts(format!(
                    "Failed to write to piper stdin: {e}"
                )))
            }
            Err(e) => return Err(VoiceError::Tts(format!("Stdin task failed: {e}"))),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Tts(format!("Piper failed: {stderr}")));
        }

        Ok(output.stdout)
    }

    /// Falls back to `espeak-ng`, stripping the WAV header from its output.
    async fn synthesize_system(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        Self::check_input(text)?;

        let mut command = Command::new("espeak-ng");
        command
            .arg("--stdout")
            .arg(text)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = command
            .spawn()
            .map_err(|e| VoiceError::Tts(format!("Failed to spawn espeak-ng: {e}")))?;

        let output = tokio::time::timeout(TTS_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::Tts(format!(
                    "System TTS process timed out after {} seconds",
                    TTS_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::Tts(format!("Failed to wait for espeak-ng: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Tts(format!("espeak-ng failed: {stderr}")));
        }

        let wav_data = output.stdout;
        if wav_data.len() > WAV_HEADER_BYTES {
            Ok(wav_data[WAV_HEADER_BYTES..].to_vec())
        } else {
            Ok(wav_data)
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for TtsService {
    /// Returns raw PCM audio (s16le, sample rate per model).
    async fn synthesize(&self, text: &str, profile_id: &str) -> Result<Vec<u8>, VoiceError> {
        let profile = self
            .get_profile(profile_id)
            .await
            .ok_or_else(|| VoiceError::Tts(format!("voice profile not found: {profile_id}")))?;

        match profile.model {
            VoiceModel::Piper => self.synthesize_piper(text, &profile).await,
            VoiceModel::System => self.synthesize_system(text).await,
        }
    }
}
