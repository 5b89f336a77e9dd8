//! Agent metadata contract.
//!
//! The first client to receive a credential for a room embeds a JSON object in
//! its participant metadata. The moderator agent reads that object exactly
//! once, when the first participant joins, and never again. Every field is
//! optional; missing or malformed values fall back to the defaults below.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Greeting used when the metadata carries no `greetingInstructions`.
pub const DEFAULT_GREETING_INSTRUCTIONS: &str =
    "Greet the group warmly and introduce yourself as Orca, the AI language coach.";

/// Moderation behavior used when the metadata carries no `roomInstructions`.
pub const DEFAULT_ROOM_INSTRUCTIONS: &str = "You are Orca, an expert language coach moderating a group discussion. Be encouraging, correct mistakes gently, and keep the conversation flowing.";

/// Language used for both sides of the pair when none is given.
pub const DEFAULT_LANGUAGE: &str = "English";

/// Errors produced while reading participant metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("metadata must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// The raw, per-field-optional view of the metadata payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting_instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_language: Option<String>,
}

impl AgentMetadata {
    /// Parses a metadata string.
    ///
    /// Blank input is treated as an empty object. Fields that are present but
    /// not strings are ignored individually rather than failing the whole
    /// payload.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError` if the input is not JSON or not a JSON object.
    pub fn parse(raw: &str) -> Result<Self, MetadataError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let value: Value = serde_json::from_str(raw)?;
        let object = match value {
            Value::Object(map) => map,
            Value::Array(_) => return Err(MetadataError::NotAnObject("array")),
            Value::String(_) => return Err(MetadataError::NotAnObject("string")),
            Value::Number(_) => return Err(MetadataError::NotAnObject("number")),
            Value::Bool(_) => return Err(MetadataError::NotAnObject("bool")),
            Value::Null => return Err(MetadataError::NotAnObject("null")),
        };

        Ok(Self {
            room_instructions: string_field(&object, "roomInstructions"),
            greeting_instructions: string_field(&object, "greetingInstructions"),
            topic_title: string_field(&object, "topicTitle"),
            learning_language: string_field(&object, "learningLanguage"),
            native_language: string_field(&object, "nativeLanguage"),
        })
    }
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

/// The resolved, immutable configuration an agent runs a session with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Persistent moderation behavior for the whole session.
    pub room_instructions: String,
    /// Drives the single greeting utterance after session start.
    pub greeting_instructions: String,
    pub topic_title: Option<String>,
    pub learning_language: String,
    pub native_language: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from(AgentMetadata::default())
    }
}

impl From<AgentMetadata> for AgentConfig {
    fn from(meta: AgentMetadata) -> Self {
        Self {
            room_instructions: meta
                .room_instructions
                .unwrap_or_else(|| DEFAULT_ROOM_INSTRUCTIONS.to_string()),
            greeting_instructions: meta
                .greeting_instructions
                .unwrap_or_else(|| DEFAULT_GREETING_INSTRUCTIONS.to_string()),
            topic_title: meta.topic_title,
            learning_language: meta
                .learning_language
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            native_language: meta
                .native_language
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        }
    }
}

impl AgentConfig {
    /// Builds the instructions a client sends for a room session.
    ///
    /// `learning_language` and `native_language` are display names
    /// ("French", "Spanish"), not language codes. An empty topic title is
    /// treated as absent.
    pub fn for_session(
        learning_language: &str,
        native_language: &str,
        topic_title: Option<&str>,
    ) -> Self {
        let topic_title = topic_title.filter(|t| !t.trim().is_empty());
        let about = topic_title
            .map(|t| format!(" about \"{t}\""))
            .unwrap_or_default();

        let greeting_instructions = format!(
            "Speak in {learning_language}.\n\
             Greet the group warmly. Introduce yourself as \"Orca\", their AI language coach and room host for this session.\n\
             Mention that you will guide the discussion{about}.\n\
             Invite everyone to introduce themselves in {learning_language}.\n\
             Keep it brief, two to three sentences max."
        );

        let room_instructions = format!(
            "ROLE\n\
             You are \"Orca\", an expert and encouraging {learning_language} language coach hosting and moderating a group audio discussion.\n\
             You are the room HOST. You keep the conversation structured, on-topic, and productive.\n\
             \n\
             SPEAKER AWARENESS\n\
             - Pay close attention to WHO is speaking (you can see their names).\n\
             - When someone finishes speaking, address them by name in your response.\n\
             - Track who has spoken and who hasn't. Invite quieter participants to contribute.\n\
             \n\
             LANGUAGE RULES\n\
             - Conduct the session primarily in {learning_language}.\n\
             - Use {native_language} ONLY to explain grammar mistakes or for brief clarifications.\n\
             - Never mix languages in a single sentence.\n\
             \n\
             MODERATION FLOW\n\
             1. Warm-up: ask each participant to introduce themselves in {learning_language}.\n\
             2. Propose a discussion topic or question for the group.\n\
             3. Call on participants by name to respond.\n\
             4. Give brief, encouraging feedback after each response.\n\
             5. Correct mistakes gently: say the correct form once, then ask them to repeat.\n\
             6. Summarise key points periodically to keep the group aligned.\n\
             \n\
             BEHAVIOR CONSTRAINTS\n\
             - Stay focused on language practice and group discussion.\n\
             - Keep individual responses concise. You are in a live audio session.\n\
             - Do not lecture; prioritise interactive back-and-forth."
        );

        Self {
            room_instructions,
            greeting_instructions,
            topic_title: topic_title.map(str::to_string),
            learning_language: learning_language.to_string(),
            native_language: native_language.to_string(),
        }
    }

    /// Serializes this configuration as the participant metadata string.
    pub fn to_metadata(&self) -> String {
        let meta = AgentMetadata {
            room_instructions: Some(self.room_instructions.clone()),
            greeting_instructions: Some(self.greeting_instructions.clone()),
            topic_title: self.topic_title.clone(),
            learning_language: Some(self.learning_language.clone()),
            native_language: Some(self.native_language.clone()),
        };
        // A struct of strings always serializes.
        serde_json::to_string(&meta).unwrap_or_else(|_| "{}".to_string())
    }
}
