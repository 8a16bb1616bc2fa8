use std::collections::HashMap;

use crate::core::config::Config;

pub const DEFAULT_LANGUAGE_NAME: &str = "English";
pub const DEFAULT_MOOD_DESCRIPTION: &str = "speaking normally";
pub const DEFAULT_AVATAR: &str = "🎭";

const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("ro", "Romanian"),
    ("en", "English"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("zh", "Chinese"),
    ("ar", "Arabic"),
    ("hi", "Hindi"),
];

const MOOD_DESCRIPTIONS: &[(&str, &str)] = &[
    ("normal", "speaking normally"),
    ("happy", "in a very happy and cheerful mood"),
    ("angry", "angry and frustrated"),
    ("sarcastic", "being sarcastic and witty"),
    ("dramatic", "being overly dramatic and theatrical"),
    ("confused", "confused and puzzled"),
    ("flirty", "being flirtatious and charming"),
    ("sleepy", "tired and sleepy"),
];

pub const FALLBACK_MALE_VOICE: &str = "pNInz6obpgDQGcFmaJgB";
pub const FALLBACK_FEMALE_VOICE: &str = "ThT5KcBeYPX3keUQqHPh";

const CHARACTER_VOICES: &[(&str, &str)] = &[
    ("Shrek", "pNInz6obpgDQGcFmaJgB"),
    ("Iron Man", "VR6AewLTigWG4xSOukaG"),
    ("Batman", "EXAVITQu4vr4xnSDxMaL"),
    ("Darth Vader", "29vD33N1CtxCmqQRPOHJ"),
    ("Yoda", "CYw3kZ02Hs0563khs1Fj"),
    ("Sherlock Holmes", "onwK4e9ZLuTAKqWW03F9"),
    ("Harry Potter", "g5CIjZEefAph4nQFvHAz"),
    ("Spider-Man", "pFZP5JQG7iQjIQuC4Bku"),
    ("Captain America", "VR6AewLTigWG4xSOukaG"),
    ("Thor", "29vD33N1CtxCmqQRPOHJ"),
    ("Hulk", "pNInz6obpgDQGcFmaJgB"),
    ("Deadpool", "TxGEqnHWrfWFTfGW9XjX"),
    ("Wolverine", "EXAVITQu4vr4xnSDxMaL"),
    ("Luke Skywalker", "g5CIjZEefAph4nQFvHAz"),
    ("Gandalf", "CYw3kZ02Hs0563khs1Fj"),
    ("Frodo", "g5CIjZEefAph4nQFvHAz"),
    ("Aragorn", "onwK4e9ZLuTAKqWW03F9"),
    ("Legolas", "pFZP5JQG7iQjIQuC4Bku"),
    ("Jack Sparrow", "TxGEqnHWrfWFTfGW9XjX"),
    ("Indiana Jones", "VR6AewLTigWG4xSOukaG"),
    ("James Bond", "onwK4e9ZLuTAKqWW03F9"),
    ("John Wick", "EXAVITQu4vr4xnSDxMaL"),
    ("The Joker", "TxGEqnHWrfWFTfGW9XjX"),
    ("Buzz Lightyear", "VR6AewLTigWG4xSOukaG"),
    ("Mickey Mouse", "pFZP5JQG7iQjIQuC4Bku"),
    ("Goku", "g5CIjZEefAph4nQFvHAz"),
    ("Naruto", "pFZP5JQG7iQjIQuC4Bku"),
    ("Pikachu", "pFZP5JQG7iQjIQuC4Bku"),
    ("Wonder Woman", "ThT5KcBeYPX3keUQqHPh"),
    ("Hermione Granger", "AZnzlk1XvdvUeBnXmlld"),
    ("Black Widow", "oWAxZDx7w5VEj9dCyTzz"),
    ("Princess Leia", "ThT5KcBeYPX3keUQqHPh"),
    ("Elsa", "AZnzlk1XvdvUeBnXmlld"),
];

const FEMALE_KEYWORDS: &[&str] = &[
    "woman", "girl", "princess", "queen", "lady", "witch", "goddess", "elsa", "hermione",
    "widow", "leia",
];

const CHARACTER_AVATARS: &[(&str, &str)] = &[
    ("Shrek", "👹"),
    ("Iron Man", "🤖"),
    ("Batman", "🦇"),
    ("Wonder Woman", "👸"),
    ("Darth Vader", "👤"),
    ("Yoda", "👽"),
    ("Sherlock Holmes", "🕵️"),
    ("Harry Potter", "⚡"),
    ("Hermione Granger", "📚"),
    ("Spider-Man", "🕷️"),
    ("Captain America", "🛡️"),
    ("Black Widow", "🕸️"),
    ("Thor", "⚡"),
    ("Hulk", "💚"),
    ("Deadpool", "🔴"),
    ("Wolverine", "🐺"),
    ("Princess Leia", "👑"),
    ("Luke Skywalker", "⚔️"),
    ("Gandalf", "🧙"),
    ("Frodo", "💍"),
    ("Aragorn", "👑"),
    ("Legolas", "🏹"),
    ("Jack Sparrow", "🏴‍☠️"),
    ("Indiana Jones", "🤠"),
    ("James Bond", "🕴️"),
    ("John Wick", "🔫"),
    ("The Joker", "🃏"),
    ("Elsa", "❄️"),
    ("Buzz Lightyear", "🚀"),
    ("Mickey Mouse", "🐭"),
    ("Goku", "🐒"),
    ("Naruto", "🍜"),
    ("Pikachu", "⚡"),
];

const TWIST_LINES_EN: &[&str] = &[
    "Wait a minute... I just realized I'm actually a robot from the future!",
    "OH NO! I just remembered I'm actually an undercover secret agent!",
    "Surprise! We're actually on a TV show and everyone's watching us!",
    "Hold on... I think I just saw a dinosaur walk by over there!",
    "ATTENTION! I just got a message that aliens have landed in the parking lot!",
    "You won't believe this - I just realized we've been speaking different languages for 10 minutes!",
];

const TWIST_LINES_RO: &[&str] = &[
    "Stai puțin... tocmai am realizat că sunt de fapt un robot din viitor!",
    "OH NU! Tocmai mi-am amintit că sunt de fapt un agent secret în acoperire!",
    "Surpriză! Suntem de fapt într-un show TV și toată lumea ne privește!",
    "Moment... cred că tocmai am văzut un dinozaur trecând pe acolo!",
    "ATENȚIE! Tocmai am primit un mesaj că extratereștrii au aterizat în parcare!",
    "Nu o să crezi - tocmai mi-am dat seama că vorbim limbi diferite de 10 minute!",
];

const REACTION_LINES_EN: &[&str] = &[
    "Wait, what did you just say?",
    "That's not what I expected to hear.",
    "Okay, that changes things...",
    "Well, that's interesting.",
    "I wasn't ready for that response.",
];

const REACTION_LINES_RO: &[&str] = &[
    "Stai, ce ai spus?",
    "Nu mă așteptam la asta.",
    "Hmm, interesant...",
    "Bine, asta schimbă lucrurile.",
    "Nu eram pregătit pentru răspunsul ăsta.",
];

/// Which canned pool a fallback line is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CannedPool {
    Twist,
    Reaction,
}

/// Immutable lookup tables, built once at startup.
///
/// Every lookup has a defined fallback value; a missing key is never an error.
#[derive(Debug, Clone)]
pub struct Catalog {
    languages: HashMap<String, String>,
    moods: HashMap<String, String>,
    voices: HashMap<String, String>,
    avatars: HashMap<String, String>,
    female_keywords: Vec<String>,
    fallback_male_voice: String,
    fallback_female_voice: String,
}

fn to_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            languages: to_map(LANGUAGE_NAMES),
            moods: to_map(MOOD_DESCRIPTIONS),
            voices: to_map(CHARACTER_VOICES),
            avatars: to_map(CHARACTER_AVATARS),
            female_keywords: FEMALE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            fallback_male_voice: FALLBACK_MALE_VOICE.to_string(),
            fallback_female_voice: FALLBACK_FEMALE_VOICE.to_string(),
        }
    }
}

impl Catalog {
    /// Built-in tables with the configured moods, voices and fallback voices merged on top.
    pub fn from_config(config: &Config) -> Self {
        let mut catalog = Self::default();
        for (id, description) in &config.prompt.moods {
            catalog.moods.insert(id.clone(), description.clone());
        }
        for (character, voice) in &config.speech.voices {
            catalog.voices.insert(character.clone(), voice.clone());
        }
        if let Some(v) = &config.speech.fallback_male_voice {
            catalog.fallback_male_voice = v.clone();
        }
        if let Some(v) = &config.speech.fallback_female_voice {
            catalog.fallback_female_voice = v.clone();
        }
        catalog
    }

    pub fn language_name(&self, code: &str) -> &str {
        self.languages
            .get(code)
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_LANGUAGE_NAME)
    }

    pub fn mood_description(&self, mood: &str) -> &str {
        self.moods
            .get(mood)
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_MOOD_DESCRIPTION)
    }

    pub fn avatar(&self, character: &str) -> &str {
        self.avatars
            .get(character)
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_AVATAR)
    }

    pub fn known_voice(&self, character: &str) -> Option<&str> {
        self.voices.get(character).map(|s| s.as_str())
    }

    pub fn is_female_name(&self, character: &str) -> bool {
        let lower = character.to_lowercase();
        self.female_keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    /// Voice for `character`: table entry first, then the gendered fallback.
    pub fn voice_for(&self, character: &str) -> &str {
        if let Some(v) = self.known_voice(character) {
            return v;
        }
        if self.is_female_name(character) {
            &self.fallback_female_voice
        } else {
            &self.fallback_male_voice
        }
    }

    pub fn canned_lines(&self, pool: CannedPool, language: &str) -> &'static [&'static str] {
        match (pool, language) {
            (CannedPool::Twist, "ro") => TWIST_LINES_RO,
            (CannedPool::Twist, _) => TWIST_LINES_EN,
            (CannedPool::Reaction, "ro") => REACTION_LINES_RO,
            (CannedPool::Reaction, _) => REACTION_LINES_EN,
        }
    }
}
