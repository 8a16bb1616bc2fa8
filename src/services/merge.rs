use crate::core::error::{AppError, AppResult};
use crate::core::state::{DialogueLine, SceneConfig};

/// Index of `line_id` in `dialogue`.
pub fn locate(dialogue: &[DialogueLine], line_id: &str) -> AppResult<usize> {
    dialogue
        .iter()
        .position(|l| l.id == line_id)
        .ok_or_else(|| AppError::LineNotFound(line_id.to_string()))
}

/// Copy of `dialogue` with the text at `index` replaced.
pub fn apply_edit(dialogue: &[DialogueLine], index: usize, new_text: &str) -> Vec<DialogueLine> {
    let mut edited = dialogue.to_vec();
    if let Some(line) = edited.get_mut(index) {
        line.text = new_text.to_string();
    }
    edited
}

fn tag_mood(line: &mut DialogueLine, scene: &SceneConfig) {
    line.mood = scene.mood_of(&line.character).map(str::to_string);
}

/// Reconciles a regenerated dialogue with the user's edit.
///
/// The recovered sequence wins everywhere except the edited index, where the
/// user's literal text and the line's original id are forced back. A regeneration too short to contain the
/// edited index is discarded in favour of the edited previous sequence.
pub fn merge(
    previous: &[DialogueLine],
    line_id: &str,
    new_text: &str,
    recovered: Vec<DialogueLine>,
    scene: &SceneConfig,
) -> AppResult<Vec<DialogueLine>> {
    let index = locate(previous, line_id)?;
    let original = &previous[index];

    let mut merged = if recovered.len() > index {
        recovered
    } else {
        log::warn!(
            "Regenerated dialogue has {} lines, edited index is {}; keeping previous dialogue",
            recovered.len(),
            index
        );
        apply_edit(previous, index, new_text)
    };

    let edited = &mut merged[index];
    edited.text = new_text.to_string();
    edited.id = original.id.clone();

    for line in merged.iter_mut() {
        tag_mood(line, scene);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> SceneConfig {
        SceneConfig {
            participant1: "Shrek".to_string(),
            participant2: "Iron Man".to_string(),
            location: "in a coffee shop".to_string(),
            theme: "They fight over a parking space".to_string(),
            language: "en".to_string(),
            mood1: "angry".to_string(),
            mood2: "sarcastic".to_string(),
        }
    }

    fn five_lines(prefix: &str) -> Vec<DialogueLine> {
        (1..=5)
            .map(|i| {
                DialogueLine::new(
                    format!("line-{}", i),
                    if i % 2 == 1 { "Shrek" } else { "Iron Man" },
                    format!("{} {}", prefix, i),
                )
            })
            .collect()
    }

    #[test]
    fn test_locate_missing_line_is_not_found() {
        let err = locate(&five_lines("old"), "line-99").unwrap_err();
        assert!(matches!(err, AppError::LineNotFound(id) if id == "line-99"));
    }

    #[test]
    fn test_edit_always_wins_at_edited_index() {
        let previous = five_lines("old");
        let recovered = five_lines("model");

        let merged = merge(&previous, "line-3", "Actually, wait...", recovered, &scene()).unwrap();
        assert_eq!(merged.len(), 5);
        assert_eq!(merged[2].text, "Actually, wait...");
        for i in [0, 1, 3, 4] {
            assert_eq!(merged[i].text, format!("model {}", i + 1));
        }
        assert_eq!(merged[0].mood.as_deref(), Some("angry"));
        assert_eq!(merged[1].mood.as_deref(), Some("sarcastic"));
    }

    #[test]
    fn test_longer_regeneration_keeps_reaction_line() {
        let previous = five_lines("old");
        let mut recovered = five_lines("model");
        recovered.push(DialogueLine::new("line-6", "Iron Man", "Did you just say wait?"));

        let merged = merge(&previous, "line-5", "Fine, take it.", recovered, &scene()).unwrap();
        assert_eq!(merged.len(), 6);
        assert_eq!(merged[4].text, "Fine, take it.");
        assert_eq!(merged[5].text, "Did you just say wait?");
    }

    #[test]
    fn test_short_regeneration_falls_back_to_previous() {
        let previous = five_lines("old");
        let recovered = five_lines("model").into_iter().take(2).collect();

        let merged = merge(&previous, "line-4", "New text", recovered, &scene()).unwrap();
        assert_eq!(merged.len(), 5);
        assert_eq!(merged[3].text, "New text");
        assert_eq!(merged[0].text, "old 1");
    }

    #[test]
    fn test_edited_line_keeps_its_id() {
        let previous = five_lines("old");
        let mut recovered = five_lines("model");
        recovered[2].id = "x-3".to_string();

        let merged = merge(&previous, "line-3", "Actually, wait...", recovered, &scene()).unwrap();
        assert_eq!(merged[2].id, "line-3");
        assert_eq!(merged[2].text, "Actually, wait...");
    }

    #[test]
    fn test_missing_id_is_never_a_silent_noop() {
        let previous = five_lines("old");
        let result = merge(&previous, "nope", "x", five_lines("model"), &scene());
        assert!(matches!(result, Err(AppError::LineNotFound(_))));
    }
}
