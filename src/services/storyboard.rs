use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::catalog::Catalog;
use crate::core::state::{DialogueLine, SceneConfig};
use crate::utils::data_uri::json_data_uri;

pub const SECONDS_PER_SCENE: u64 = 4;
pub const STORYBOARD_FORMAT: &str = "script-improv-v1";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub timestamp: u64,
    pub character: String,
    pub text: String,
    pub mood: String,
    pub avatar: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CastMember {
    pub name: String,
    pub mood: String,
    pub avatar: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cast {
    pub character1: CastMember,
    pub character2: CastMember,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Setting {
    pub location: String,
    pub theme: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub duration: u64,
    pub created: DateTime<Utc>,
    pub format: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Storyboard {
    pub title: String,
    pub characters: Cast,
    pub setting: Setting,
    pub scenes: Vec<Scene>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryboardExport {
    pub video_data: Storyboard,
    pub download_url: String,
}

fn cast_member(catalog: &Catalog, name: &str, mood: &str) -> CastMember {
    CastMember {
        name: name.to_string(),
        mood: mood.to_string(),
        avatar: catalog.avatar(name).to_string(),
    }
}

/// Lays the dialogue out on a fixed timeline.
pub fn build(
    scene: &SceneConfig,
    dialogue: &[DialogueLine],
    catalog: &Catalog,
    created: DateTime<Utc>,
) -> Storyboard {
    let scenes = dialogue
        .iter()
        .zip(0u64..)
        .map(|(line, i)| Scene {
            timestamp: i * SECONDS_PER_SCENE,
            character: line.character.clone(),
            text: line.text.clone(),
            mood: scene
                .mood_of(&line.character)
                .unwrap_or(&scene.mood2)
                .to_string(),
            avatar: catalog.avatar(&line.character).to_string(),
        })
        .collect();

    Storyboard {
        title: format!(
            "{} vs {} - {}",
            scene.participant1, scene.participant2, scene.theme
        ),
        characters: Cast {
            character1: cast_member(catalog, &scene.participant1, &scene.mood1),
            character2: cast_member(catalog, &scene.participant2, &scene.mood2),
        },
        setting: Setting {
            location: scene.location.clone(),
            theme: scene.theme.clone(),
            language: scene.language.clone(),
        },
        scenes,
        metadata: Metadata {
            duration: dialogue.len() as u64 * SECONDS_PER_SCENE,
            created,
            format: STORYBOARD_FORMAT,
        },
    }
}

/// Builds the storyboard and its downloadable `data:` URI.
pub fn export(
    scene: &SceneConfig,
    dialogue: &[DialogueLine],
    catalog: &Catalog,
) -> Result<StoryboardExport> {
    let storyboard = build(scene, dialogue, catalog, Utc::now());
    let pretty =
        serde_json::to_string_pretty(&storyboard).context("Failed to serialize storyboard")?;
    Ok(StoryboardExport {
        download_url: json_data_uri(&pretty),
        video_data: storyboard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scene() -> SceneConfig {
        SceneConfig {
            participant1: "Shrek".to_string(),
            participant2: "Iron Man".to_string(),
            location: "in a coffee shop".to_string(),
            theme: "parking".to_string(),
            language: "en".to_string(),
            mood1: "angry".to_string(),
            mood2: "sarcastic".to_string(),
        }
    }

    fn dialogue() -> Vec<DialogueLine> {
        vec![
            DialogueLine::new("line-1", "Shrek", "Mine."),
            DialogueLine::new("line-2", "Iron Man", "Nope."),
            DialogueLine::new("line-3", "Donkey", "Can I park?"),
        ]
    }

    #[test]
    fn test_timeline_and_metadata() {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let sb = build(&scene(), &dialogue(), &Catalog::default(), created);

        assert_eq!(sb.title, "Shrek vs Iron Man - parking");
        assert_eq!(sb.metadata.duration, 12);
        assert_eq!(sb.metadata.format, "script-improv-v1");
        let stamps: Vec<u64> = sb.scenes.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![0, 4, 8]);
        assert_eq!(sb.scenes[0].mood, "angry");
        assert_eq!(sb.scenes[1].mood, "sarcastic");
        assert_eq!(sb.scenes[2].avatar, "🎭");
        assert_eq!(sb.characters.character1.avatar, "👹");
    }

    #[test]
    fn test_export_download_url_embeds_pretty_json() {
        let out = export(&scene(), &dialogue(), &Catalog::default()).unwrap();
        assert!(out.download_url.starts_with("data:application/json,%7B%0A"));
        assert!(!out.download_url.contains(' '));
    }
}
