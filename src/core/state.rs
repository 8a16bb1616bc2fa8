use serde::{Deserialize, Serialize};

/// One spoken line of the script.
#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq, Eq)]
pub struct DialogueLine {
    /// Empty when the client omitted it; assigned before the line is used.
    #[serde(default)]
    pub id: String,
    pub character: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
}

impl DialogueLine {
    pub fn new(id: impl Into<String>, character: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            character: character.into(),
            text: text.into(),
            mood: None,
        }
    }
}

/// Insertion order is performance order.
pub type DialogueSequence = Vec<DialogueLine>;

/// The two participants and the setting of one generation/edit cycle.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SceneConfig {
    pub participant1: String,
    pub participant2: String,
    pub location: String,
    pub theme: String,
    pub language: String,
    pub mood1: String,
    pub mood2: String,
}

impl SceneConfig {
    /// Canonical participant name for `speaker`, matched case-insensitively.
    pub fn resolve_participant(&self, speaker: &str) -> Option<&str> {
        let speaker = speaker.trim();
        if speaker.eq_ignore_ascii_case(self.participant1.trim()) {
            Some(&self.participant1)
        } else if speaker.eq_ignore_ascii_case(self.participant2.trim()) {
            Some(&self.participant2)
        } else {
            None
        }
    }

    pub fn mood_of(&self, speaker: &str) -> Option<&str> {
        let canonical = self.resolve_participant(speaker)?;
        if canonical == self.participant1 {
            Some(&self.mood1)
        } else {
            Some(&self.mood2)
        }
    }

    /// The participant who is not `speaker`. Unknown speakers get participant1.
    pub fn other_participant(&self, speaker: &str) -> &str {
        match self.resolve_participant(speaker) {
            Some(p) if p == self.participant1 => &self.participant2,
            Some(_) => &self.participant1,
            None => &self.participant1,
        }
    }

    pub fn participants(&self) -> [&str; 2] {
        [&self.participant1, &self.participant2]
    }
}
