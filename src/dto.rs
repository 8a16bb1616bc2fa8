//! Request and response bodies of the HTTP API.
use serde::{Deserialize, Serialize};

use crate::core::error::{AppError, AppResult};
use crate::core::state::{DialogueLine, SceneConfig};

pub const DEFAULT_MOOD: &str = "normal";

/// Scene fields shared by every dialogue request. Accepts both naming schemes.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SceneRequest {
    #[serde(alias = "character1")]
    pub participant1: Option<String>,
    #[serde(alias = "character2")]
    pub participant2: Option<String>,
    pub location: Option<String>,
    pub theme: Option<String>,
    pub language: Option<String>,
    #[serde(alias = "character1Mood")]
    pub mood1: Option<String>,
    #[serde(alias = "character2Mood")]
    pub mood2: Option<String>,
}

fn required(value: Option<String>, field: &'static str) -> AppResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(AppError::Validation { field }),
    }
}

fn or_default(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl SceneRequest {
    /// Participants, location and theme are required; the rest defaults.
    pub fn into_scene(self, default_language: &str) -> AppResult<SceneConfig> {
        Ok(SceneConfig {
            participant1: required(self.participant1, "participant1")?,
            participant2: required(self.participant2, "participant2")?,
            location: required(self.location, "location")?,
            theme: required(self.theme, "theme")?,
            language: or_default(self.language, default_language),
            mood1: or_default(self.mood1, DEFAULT_MOOD),
            mood2: or_default(self.mood2, DEFAULT_MOOD),
        })
    }

    /// Only the participants are required.
    pub fn into_lenient_scene(self, default_language: &str) -> AppResult<SceneConfig> {
        Ok(SceneConfig {
            participant1: required(self.participant1, "participant1")?,
            participant2: required(self.participant2, "participant2")?,
            location: self.location.unwrap_or_default(),
            theme: self.theme.unwrap_or_default(),
            language: or_default(self.language, default_language),
            mood1: or_default(self.mood1, DEFAULT_MOOD),
            mood2: or_default(self.mood2, DEFAULT_MOOD),
        })
    }
}

fn non_empty(dialogue: Option<Vec<DialogueLine>>) -> AppResult<Vec<DialogueLine>> {
    match dialogue {
        Some(d) if !d.is_empty() => Ok(d),
        _ => Err(AppError::Validation { field: "dialogue" }),
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GenerateDialogueRequest {
    #[serde(flatten)]
    pub scene: SceneRequest,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct AddPlotTwistRequest {
    #[serde(flatten)]
    pub scene: SceneRequest,
    pub dialogue: Option<Vec<DialogueLine>>,
}

impl AddPlotTwistRequest {
    pub fn validate(self, default_language: &str) -> AppResult<(SceneConfig, Vec<DialogueLine>)> {
        let scene = self.scene.into_scene(default_language)?;
        Ok((scene, non_empty(self.dialogue)?))
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateLineRequest {
    #[serde(flatten)]
    pub scene: SceneRequest,
    pub dialogue: Option<Vec<DialogueLine>>,
    pub line_id: Option<String>,
    pub new_text: Option<String>,
}

pub struct EditLine {
    pub scene: SceneConfig,
    pub dialogue: Vec<DialogueLine>,
    pub line_id: String,
    pub new_text: String,
}

impl RegenerateLineRequest {
    /// An empty dialogue passes here and surfaces as a missing line.
    pub fn validate(self, default_language: &str) -> AppResult<EditLine> {
        let scene = self.scene.into_scene(default_language)?;
        let dialogue = self
            .dialogue
            .ok_or(AppError::Validation { field: "dialogue" })?;
        let line_id = required(self.line_id, "lineId")?;
        let new_text = required(self.new_text, "newText")?;
        Ok(EditLine {
            scene,
            dialogue,
            line_id,
            new_text,
        })
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct TextToSpeechRequest {
    pub text: Option<String>,
    pub character: Option<String>,
    pub language: Option<String>,
}

pub struct SpeechJob {
    pub text: String,
    pub character: String,
    pub language: String,
}

impl TextToSpeechRequest {
    pub fn validate(self, default_language: &str) -> AppResult<SpeechJob> {
        Ok(SpeechJob {
            text: required(self.text, "text")?,
            character: required(self.character, "character")?,
            language: or_default(self.language, default_language),
        })
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GenerateVideoRequest {
    #[serde(flatten)]
    pub scene: SceneRequest,
    pub dialogue: Option<Vec<DialogueLine>>,
}

impl GenerateVideoRequest {
    pub fn validate(self, default_language: &str) -> AppResult<(SceneConfig, Vec<DialogueLine>)> {
        let scene = self.scene.into_lenient_scene(default_language)?;
        Ok((scene, non_empty(self.dialogue)?))
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct DialogueResponse {
    pub dialogue: Vec<DialogueLine>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum TextToSpeechResponse {
    #[serde(rename_all = "camelCase")]
    Audio {
        audio_data: String,
        voice_id: String,
        character: String,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Local {
        use_local_fallback: bool,
        text: String,
        character: String,
        language: String,
    },
}
