use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::catalog::Catalog;
use crate::core::state::{DialogueLine, SceneConfig};
use crate::services::llm::ChatOptions;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComedyIntensity {
    Plain,
    #[default]
    Maximum,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default)]
    pub comedy: ComedyIntensity,
    #[serde(default = "default_language")]
    pub default_language: String,
    /// Extra or overridden mood id → description entries.
    #[serde(default)]
    pub moods: HashMap<String, String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            comedy: ComedyIntensity::default(),
            default_language: default_language(),
            moods: HashMap::new(),
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

/// What the model is asked to do.
#[derive(Debug, Clone, Copy)]
pub enum PromptMode<'a> {
    Generate,
    /// Append 2-3 absurd lines and return the complete sequence.
    Twist { dialogue: &'a [DialogueLine] },
    /// `dialogue` already carries the user's edit at `line_index`.
    EditContinuation {
        dialogue: &'a [DialogueLine],
        line_index: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub options: ChatOptions,
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    catalog: Arc<Catalog>,
    comedy: ComedyIntensity,
    default_language: String,
}

const GENERATE_OPTIONS: ChatOptions = ChatOptions {
    temperature: 0.8,
    max_tokens: 1000,
};
const TWIST_OPTIONS: ChatOptions = ChatOptions {
    temperature: 0.95,
    max_tokens: 1200,
};
const EDIT_OPTIONS: ChatOptions = ChatOptions {
    temperature: 0.7,
    max_tokens: 1000,
};

fn render_context(dialogue: &[DialogueLine]) -> String {
    dialogue
        .iter()
        .map(|line| format!("{}: {}", line.character, line.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Like [`render_context`] but prefixes every line with its id, e.g. `[line-2] Shrek: ...`.
fn render_context_with_ids(dialogue: &[DialogueLine]) -> String {
    dialogue
        .iter()
        .map(|line| format!("[{}] {}: {}", line.id, line.character, line.text))
        .collect::<Vec<_>>()
        .join("\n")
}

impl PromptBuilder {
    pub fn new(catalog: Arc<Catalog>, config: &PromptConfig) -> Self {
        Self {
            catalog,
            comedy: config.comedy,
            default_language: config.default_language.clone(),
        }
    }

    pub fn build(&self, scene: &SceneConfig, mode: PromptMode<'_>) -> Prompt {
        match mode {
            PromptMode::Generate => self.generate(scene),
            PromptMode::Twist { dialogue } => self.twist(scene, dialogue),
            PromptMode::EditContinuation {
                dialogue,
                line_index,
            } => self.edit_continuation(scene, dialogue, line_index),
        }
    }

    fn is_foreign(&self, scene: &SceneConfig) -> bool {
        scene.language != self.default_language
    }

    fn language_instruction(&self, scene: &SceneConfig, what: &str) -> String {
        if !self.is_foreign(scene) {
            return String::new();
        }
        let name = self.catalog.language_name(&scene.language);
        format!(
            "\n\nIMPORTANT: {} entirely in {name}. All character speech must be in {name}, staying true to their personalities and established voices but speaking in {name}.",
            what
        )
    }

    fn fluency(&self, scene: &SceneConfig, goal: &str) -> String {
        if !self.is_foreign(scene) {
            return String::new();
        }
        format!(
            " You are fluent in {} and can create natural dialogue in that language while {}.",
            self.catalog.language_name(&scene.language),
            goal
        )
    }

    fn generate(&self, scene: &SceneConfig) -> Prompt {
        let p1 = &scene.participant1;
        let p2 = &scene.participant2;
        let mood1 = self.catalog.mood_description(&scene.mood1);
        let mood2 = self.catalog.mood_description(&scene.mood2);

        let comedy = match self.comedy {
            ComedyIntensity::Plain => "",
            ComedyIntensity::Maximum => {
                "\n\nCOMEDY REQUIREMENTS:\n\
                 - Make it ABSOLUTELY HILARIOUS, with unexpected punchlines\n\
                 - Exaggerate each character's quirks and catchphrases\n\
                 - Let the characters react in over-the-top, funny ways"
            }
        };

        let user = format!(
            "Create a funny dialogue between {p1} and {p2} {location}. The situation is: {theme}\n\n\
             Character moods:\n\
             - {p1} is {mood1}\n\
             - {p2} is {mood2}\n\n\
             Please generate exactly 6-8 lines of dialogue that captures their unique personalities, speaking styles, and current moods. \
             The dialogue should be engaging, funny, and true to their characters while reflecting their emotional states.{comedy}{language}\n\n\
             Format your response as a JSON array with objects containing \"character\" and \"text\" fields. Each line should have a unique id field as well.\n\n\
             Example format:\n\
             [\n  {{\"id\": \"1\", \"character\": \"{p1}\", \"text\": \"dialogue line here\"}},\n  {{\"id\": \"2\", \"character\": \"{p2}\", \"text\": \"dialogue line here\"}}\n]\n\n\
             Make sure the dialogue flows naturally and is entertaining while showing their moods!",
            location = scene.location,
            theme = scene.theme,
            language = self.language_instruction(scene, "Generate the dialogue"),
        );

        let persona = match self.comedy {
            ComedyIntensity::Plain => "You are a creative writer who specializes in character dialogue.",
            ComedyIntensity::Maximum => "You are a COMEDY GENIUS and a creative writer who specializes in character dialogue.",
        };
        let system = format!(
            "{persona} You understand different character personalities and can write authentic, funny dialogue that captures their essence and emotional states.{}",
            self.fluency(scene, "maintaining character authenticity")
        );

        Prompt {
            system,
            user,
            options: GENERATE_OPTIONS,
        }
    }

    fn twist(&self, scene: &SceneConfig, dialogue: &[DialogueLine]) -> Prompt {
        let p1 = &scene.participant1;
        let p2 = &scene.participant2;

        let (headline, requirements, closing) = match self.comedy {
            ComedyIntensity::Plain => (
                "Add a funny and unexpected plot twist to this conversation! Create 2-3 additional dialogue lines that introduce a surprising, absurd element that changes everything.",
                "",
                "Keep the characters true to themselves while they react to the twist.",
            ),
            ComedyIntensity::Maximum => (
                "Add a HILARIOUS and ABSOLUTELY ABSURD plot twist to this conversation! Create 2-3 additional dialogue lines that introduce the most ridiculous, unexpected element that changes everything. The plot twist should be COMPLETELY RIDICULOUS and could be:\n\
                 - A BONKERS revelation about one of the characters (like they're secretly a robot, alien, or time traveler)\n\
                 - An ABSURD event that happens (like a dinosaur walks by, or gravity stops working)\n\
                 - A RIDICULOUS third party intervention (like their mom shows up, or a talking animal appears)\n\
                 - A SILLY misunderstanding gets revealed (like they've been talking about completely different things)\n\
                 - Something CRAZY from their past comes up (like they used to be circus performers or pirates)",
                "\n\nCOMEDY REQUIREMENTS:\n\
                 - Make the plot twist ABSOLUTELY HILARIOUS and completely unexpected\n\
                 - Characters should react in over-the-top, funny ways\n\
                 - Don't be afraid to make it completely nonsensical - comedy first!",
                "Remember: MAXIMUM COMEDY AND ABSURDITY!",
            ),
        };

        let user = format!(
            "Given this existing dialogue between {p1} and {p2} {location} where {theme}:\n\n\
             {context}\n\n\
             {headline}{requirements}{language}\n\n\
             Please provide the COMPLETE updated dialogue (including the original lines + the new plot twist lines) as a JSON array.\n\n\
             Format:\n\
             [\n  {{\"id\": \"1\", \"character\": \"character name\", \"text\": \"dialogue text\"}},\n  ...\n  {{\"id\": \"new1\", \"character\": \"character name\", \"text\": \"plot twist line 1\"}}\n]\n\n\
             {closing}",
            location = scene.location,
            theme = scene.theme,
            context = render_context(dialogue),
            language = self.language_instruction(scene, "Continue the dialogue"),
        );

        let persona = match self.comedy {
            ComedyIntensity::Plain => "You are a comedy writer who creates surprising and funny plot twists for character dialogues.",
            ComedyIntensity::Maximum => "You are a COMEDY GENIUS who specializes in creating the most HILARIOUS and ABSURD plot twists! Your goal is to create the most RIDICULOUS plot twist possible - the more ridiculous, the better!",
        };
        let system = format!(
            "{persona}{}",
            self.fluency(scene, "maintaining maximum comedy")
        );

        Prompt {
            system,
            user,
            options: TWIST_OPTIONS,
        }
    }

    fn edit_continuation(
        &self,
        scene: &SceneConfig,
        dialogue: &[DialogueLine],
        line_index: usize,
    ) -> Prompt {
        let p1 = &scene.participant1;
        let p2 = &scene.participant2;
        let edited = dialogue.get(line_index);
        let speaker = edited.map(|l| l.character.as_str()).unwrap_or(p1.as_str());
        let edited_text = edited.map(|l| l.text.as_str()).unwrap_or_default();

        let other = scene.other_participant(speaker);
        let other_mood = if other == scene.participant1 {
            &scene.mood1
        } else {
            &scene.mood2
        };
        let other_mood = self.catalog.mood_description(other_mood);

        let user = format!(
            "Given this dialogue context between {p1} and {p2} {location} where {theme}:\n\n\
             {context}\n\n\
             The line \"{speaker}: {edited_text}\" has been changed by the user. Please generate a natural response from {other} that would make sense as the next line in this conversation.\n\n\
             {other} is currently {other_mood}, so the response should reflect this mood.\n\n\
             The response should:\n\
             1. Stay true to {other}'s character and personality\n\
             2. Reflect their current emotional state ({other_mood})\n\
             3. React naturally to the changed line\n\
             4. Continue the comedic flow of the conversation\n\
             5. Fit the overall theme and setting{language}\n\n\
             Please provide the complete updated dialogue as a JSON array, incorporating the user's change and the new response. Keep the id shown in brackets for every existing line and give new lines new ids.\n\n\
             Format:\n\
             [\n  {{\"id\": \"1\", \"character\": \"character name\", \"text\": \"dialogue text\"}},\n  ...\n]",
            location = scene.location,
            theme = scene.theme,
            context = render_context_with_ids(dialogue),
            language = self.language_instruction(scene, "Generate all dialogue"),
        );

        let system = format!(
            "You are a creative dialogue writer who can adapt conversations naturally based on changes. You understand character personalities and can create believable reactions that match their emotional states.{}",
            self.fluency(scene, "maintaining character authenticity")
        );

        Prompt {
            system,
            user,
            options: EDIT_OPTIONS,
        }
    }
}
