//! Turns free-text model output into a validated dialogue.
//!
//! The cascade runs strictly in order and every strategy is total: it either
//! yields lines or tells the pipeline to move on. Only when all parsers give up
//! and a prior dialogue exists is a canned line appended instead.

use log::{debug, warn};
use rand::seq::IndexedRandom;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;

use crate::core::catalog::{CannedPool, Catalog};
use crate::core::state::{DialogueLine, SceneConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    Bracketed,
    Scraped,
    Fallback,
}

const CASCADE: [Strategy; 3] = [Strategy::Direct, Strategy::Bracketed, Strategy::Scraped];

/// Outcome of one parser.
#[derive(Debug)]
pub enum Attempt {
    Parsed(Vec<DialogueLine>),
    Retry(String),
}

#[derive(Debug, Clone, Copy)]
pub enum FallbackSpeaker<'a> {
    Random,
    Fixed(&'a str),
}

/// How to extend `prior` when nothing could be parsed.
#[derive(Debug, Clone, Copy)]
pub struct FallbackPlan<'a> {
    pub prior: &'a [DialogueLine],
    pub pool: CannedPool,
    pub speaker: FallbackSpeaker<'a>,
    pub id_prefix: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct RecoveryContext<'a> {
    pub scene: &'a SceneConfig,
    pub catalog: &'a Catalog,
    /// Prefix for positional ids, e.g. `line` → `line-1`.
    pub id_prefix: &'a str,
    /// Dialogue the model was shown. A line returned without an id takes the
    /// id of the prior line at the same position.
    pub prior: &'a [DialogueLine],
    pub fallback: Option<FallbackPlan<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryReport {
    pub dialogue: Vec<DialogueLine>,
    pub strategy: Strategy,
    pub warnings: Vec<String>,
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("model response could not be parsed: {reason}")]
    Exhausted { reason: String },
}

#[derive(Deserialize)]
struct RawLine {
    #[serde(default, deserialize_with = "lenient_id")]
    id: Option<String>,
    #[serde(default, alias = "speaker")]
    character: String,
    #[serde(default, alias = "line")]
    text: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawResponse {
    Lines(Vec<RawLine>),
    Wrapped {
        #[serde(alias = "lines")]
        dialogue: Vec<RawLine>,
    },
}

impl RawResponse {
    fn into_lines(self) -> Vec<RawLine> {
        match self {
            RawResponse::Lines(lines) => lines,
            RawResponse::Wrapped { dialogue } => dialogue,
        }
    }
}

/// Models emit ids as strings, numbers or not at all.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    if s.starts_with("```json") {
        s.trim_start_matches("```json").trim_end_matches("```").trim().to_string()
    } else if s.starts_with("```") {
        s.trim_start_matches("```").trim_end_matches("```").trim().to_string()
    } else {
        s.to_string()
    }
}

/// First `[` through last `]`, if both exist in that order.
pub fn extract_brackets(s: &str) -> Option<&str> {
    let start = s.find('[')?;
    let end = s.rfind(']')?;
    (end > start).then(|| &s[start..=end])
}

/// Repairs common JSON damage in one string-aware pass.
///
/// Outside strings: trailing commas before `]`/`}` and control characters are
/// dropped. Inside strings: raw newlines, carriage returns and tabs are escaped
/// and any other control character is dropped.
pub fn sanitize_json(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {}
                c => out.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..]
                    .iter()
                    .find(|n| !n.is_whitespace() && !n.is_control());
                if !matches!(next, Some(']') | Some('}')) {
                    out.push(c);
                }
            }
            c if c.is_whitespace() => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

static FIELD_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#""(?:character|speaker)"\s*:\s*"((?:[^"\\]|\\.)*)"\s*,\s*"(?:text|line)"\s*:\s*"((?:[^"\\]|\\.)*)""#,
    )
    .expect("field pair pattern is valid")
});

fn unescape(fragment: &str) -> String {
    let quoted = format!("\"{}\"", sanitize_json_string_body(fragment));
    serde_json::from_str::<String>(&quoted)
        .unwrap_or_else(|_| fragment.replace("\\\"", "\"").replace("\\n", "\n"))
}

fn sanitize_json_string_body(fragment: &str) -> String {
    fragment
        .chars()
        .filter_map(|c| match c {
            '\n' => Some("\\n".to_string()),
            '\r' => Some("\\r".to_string()),
            '\t' => Some("\\t".to_string()),
            c if c.is_control() => None,
            c => Some(c.to_string()),
        })
        .collect()
}

fn to_lines(raw: Vec<RawLine>) -> Vec<DialogueLine> {
    raw.into_iter()
        .map(|l| DialogueLine {
            id: l.id.unwrap_or_default(),
            character: l.character,
            text: l.text,
            mood: None,
        })
        .collect()
}

fn validate(lines: Vec<DialogueLine>) -> Attempt {
    if lines.is_empty() {
        return Attempt::Retry("no dialogue lines".to_string());
    }
    if let Some(pos) = lines
        .iter()
        .position(|l| l.character.trim().is_empty() || l.text.trim().is_empty())
    {
        return Attempt::Retry(format!("line {} has an empty character or text", pos + 1));
    }
    Attempt::Parsed(lines)
}

fn parse_json(text: &str) -> Attempt {
    match serde_json::from_str::<RawResponse>(text) {
        Ok(resp) => validate(to_lines(resp.into_lines())),
        Err(e) => Attempt::Retry(e.to_string()),
    }
}

impl Strategy {
    fn attempt(self, raw: &str) -> Attempt {
        match self {
            Strategy::Direct => parse_json(&strip_code_blocks(raw)),
            Strategy::Bracketed => match extract_brackets(raw) {
                Some(slice) => parse_json(&sanitize_json(slice)),
                None => Attempt::Retry("no bracketed array found".to_string()),
            },
            Strategy::Scraped => {
                let lines = FIELD_PAIR
                    .captures_iter(raw)
                    .map(|caps| DialogueLine {
                        id: String::new(),
                        character: unescape(&caps[1]),
                        text: unescape(&caps[2]),
                        mood: None,
                    })
                    .collect();
                validate(lines)
            }
            Strategy::Fallback => Attempt::Retry("fallback is not a parser".to_string()),
        }
    }
}

fn next_free_id(taken: &HashSet<String>, prefix: &str, start: usize) -> String {
    let mut n = start;
    loop {
        let candidate = format!("{}-{}", prefix, n);
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Assigns missing or duplicate ids, canonicalises speakers and tags moods.
///
/// A missing id is taken from `prior` at the same position when that id is
/// still free, otherwise it becomes `<id_prefix>-<n>`. A speaker matching
/// neither participant keeps its name, gets no mood and is reported in the
/// returned warnings.
pub fn finalize(
    lines: Vec<DialogueLine>,
    scene: &SceneConfig,
    id_prefix: &str,
    prior: &[DialogueLine],
) -> (Vec<DialogueLine>, Vec<String>) {
    // Ids the lines carry themselves outrank positional reuse.
    let explicit: HashSet<String> = lines
        .iter()
        .map(|l| l.id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    let mut taken = HashSet::new();
    let mut warnings = Vec::new();
    let mut out = Vec::with_capacity(lines.len());

    for (i, mut line) in lines.into_iter().enumerate() {
        let id = line.id.trim().to_string();
        line.id = if id.is_empty() {
            prior
                .get(i)
                .map(|p| p.id.trim().to_string())
                .filter(|p| !p.is_empty() && !taken.contains(p) && !explicit.contains(p))
                .unwrap_or_else(|| next_free_id(&taken, id_prefix, i + 1))
        } else if taken.contains(&id) {
            next_free_id(&taken, id_prefix, i + 1)
        } else {
            id
        };
        taken.insert(line.id.clone());

        line.text = line.text.trim().to_string();
        match scene.resolve_participant(&line.character) {
            Some(canonical) => {
                line.character = canonical.to_string();
                line.mood = scene.mood_of(canonical).map(str::to_string);
            }
            None => {
                warn!(
                    "Line '{}' is spoken by '{}', who is not a participant",
                    line.id, line.character
                );
                warnings.push(format!(
                    "Line '{}' is attributed to '{}', who is neither {} nor {}",
                    line.id, line.character, scene.participant1, scene.participant2
                ));
                line.mood = None;
            }
        }
        out.push(line);
    }
    (out, warnings)
}

/// Extends `plan.prior` with one line from the canned pool.
pub fn append_canned<R: Rng + ?Sized>(
    plan: &FallbackPlan<'_>,
    ctx: &RecoveryContext<'_>,
    rng: &mut R,
) -> Result<RecoveryReport, RecoveryError> {
    let pool = ctx.catalog.canned_lines(plan.pool, &ctx.scene.language);
    let text = pool.choose(rng).ok_or_else(|| RecoveryError::Exhausted {
        reason: "canned pool is empty".to_string(),
    })?;
    let speaker = match plan.speaker {
        FallbackSpeaker::Fixed(name) => name.to_string(),
        FallbackSpeaker::Random => ctx
            .scene
            .participants()
            .choose(rng)
            .map(|p| p.to_string())
            .unwrap_or_else(|| ctx.scene.participant1.clone()),
    };

    let taken: HashSet<String> = plan.prior.iter().map(|l| l.id.clone()).collect();
    let id = next_free_id(&taken, plan.id_prefix, plan.prior.len() + 1);

    let mut extended = plan.prior.to_vec();
    extended.push(DialogueLine::new(id, speaker, *text));
    let (dialogue, warnings) = finalize(extended, ctx.scene, ctx.id_prefix, plan.prior);

    Ok(RecoveryReport {
        dialogue,
        strategy: Strategy::Fallback,
        warnings,
    })
}

/// Runs the recovery cascade over `raw`.
///
/// Fails only when every parser gave up and the context has no fallback plan.
pub fn recover<R: Rng + ?Sized>(
    raw: &str,
    ctx: &RecoveryContext<'_>,
    rng: &mut R,
) -> Result<RecoveryReport, RecoveryError> {
    let mut last_reason = String::from("empty response");

    for strategy in CASCADE {
        match strategy.attempt(raw) {
            Attempt::Parsed(lines) => {
                debug!("Recovered {} lines via {:?}", lines.len(), strategy);
                let (dialogue, warnings) = finalize(lines, ctx.scene, ctx.id_prefix, ctx.prior);
                return Ok(RecoveryReport {
                    dialogue,
                    strategy,
                    warnings,
                });
            }
            Attempt::Retry(reason) => {
                warn!("{:?} recovery failed: {}", strategy, reason);
                last_reason = reason;
            }
        }
    }

    match &ctx.fallback {
        Some(plan) => {
            warn!("All parsers failed, appending a canned line");
            append_canned(plan, ctx, rng)
        }
        None => Err(RecoveryError::Exhausted {
            reason: last_reason,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scene() -> SceneConfig {
        SceneConfig {
            participant1: "Shrek".to_string(),
            participant2: "Iron Man".to_string(),
            location: "in a coffee shop".to_string(),
            theme: "They fight over a parking space".to_string(),
            language: "en".to_string(),
            mood1: "normal".to_string(),
            mood2: "normal".to_string(),
        }
    }

    fn ctx<'a>(scene: &'a SceneConfig, catalog: &'a Catalog) -> RecoveryContext<'a> {
        RecoveryContext {
            scene,
            catalog,
            id_prefix: "line",
            prior: &[],
            fallback: None,
        }
    }

    const SIX_LINES: &str = r#"[
        {"character": "Shrek", "text": "This is my parking space."},
        {"character": "Iron Man", "text": "I can fly, I don't even need it."},
        {"character": "Shrek", "text": "Then why are you here?"},
        {"character": "Iron Man", "text": "Principle."},
        {"character": "Shrek", "text": "Ogres have principles too."},
        {"character": "Iron Man", "text": "And layers, I heard."}
    ]"#;

    #[test]
    fn test_direct_parse_assigns_positional_ids() {
        let s = scene();
        let catalog = Catalog::default();
        let report = recover(SIX_LINES, &ctx(&s, &catalog), &mut StdRng::seed_from_u64(1)).unwrap();

        assert_eq!(report.strategy, Strategy::Direct);
        assert_eq!(report.dialogue.len(), 6);
        for (i, line) in report.dialogue.iter().enumerate() {
            assert_eq!(line.id, format!("line-{}", i + 1));
            assert!(line.character == "Shrek" || line.character == "Iron Man");
            assert!(!line.text.is_empty());
            assert_eq!(line.mood.as_deref(), Some("normal"));
        }
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_code_fence_and_numeric_ids() {
        let s = scene();
        let catalog = Catalog::default();
        let raw = "```json\n[{\"id\": 7, \"character\": \"shrek\", \"text\": \"Hi\"}]\n```";
        let report = recover(raw, &ctx(&s, &catalog), &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(report.strategy, Strategy::Direct);
        assert_eq!(report.dialogue[0].id, "7");
        assert_eq!(report.dialogue[0].character, "Shrek");
    }

    #[test]
    fn test_wrapped_object_is_accepted() {
        let s = scene();
        let catalog = Catalog::default();
        let raw = r#"{"dialogue": [{"character": "Iron Man", "text": "Jarvis, handle this."}]}"#;
        let report = recover(raw, &ctx(&s, &catalog), &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(report.dialogue.len(), 1);
        assert_eq!(report.dialogue[0].character, "Iron Man");
    }

    #[test]
    fn test_trailing_comma_cleanup_is_idempotent() {
        let s = scene();
        let catalog = Catalog::default();
        let clean = r#"[{"id": "1", "character": "Shrek", "text": "Donkey!"}, {"id": "2", "character": "Iron Man", "text": "Who?"}]"#;
        let dirty = r#"[{"id": "1", "character": "Shrek", "text": "Donkey!",}, {"id": "2", "character": "Iron Man", "text": "Who?"},]"#;

        let a = recover(clean, &ctx(&s, &catalog), &mut StdRng::seed_from_u64(1)).unwrap();
        let b = recover(dirty, &ctx(&s, &catalog), &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(a.strategy, Strategy::Direct);
        assert_eq!(b.strategy, Strategy::Bracketed);
        assert_eq!(a.dialogue, b.dialogue);
    }

    #[test]
    fn test_bracketed_handles_prose_and_raw_newlines() {
        let s = scene();
        let catalog = Catalog::default();
        let raw = "Sure! Here is your dialogue:\n[{\"character\": \"Shrek\", \"text\": \"Line one\nstill line one\"}]\nEnjoy!";
        let report = recover(raw, &ctx(&s, &catalog), &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(report.strategy, Strategy::Bracketed);
        assert_eq!(report.dialogue[0].text, "Line one\nstill line one");
    }

    #[test]
    fn test_sanitize_leaves_commas_inside_strings() {
        let cleaned = sanitize_json(r#"["a, ]", "b",]"#);
        assert_eq!(cleaned, r#"["a, ]", "b"]"#);
    }

    #[test]
    fn test_scraping_rebuilds_broken_array() {
        let s = scene();
        let catalog = Catalog::default();
        let raw = r#"Here you go: {"character": "Shrek", "text": "Say \"please\""} then
            {"character": "Iron Man", "text": "Please."} and the array never closed"#;
        let report = recover(raw, &ctx(&s, &catalog), &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(report.strategy, Strategy::Scraped);
        assert_eq!(report.dialogue.len(), 2);
        assert_eq!(report.dialogue[0].id, "line-1");
        assert_eq!(report.dialogue[0].text, "Say \"please\"");
        assert_eq!(report.dialogue[1].id, "line-2");
    }

    #[test]
    fn test_generation_without_prior_fails_loudly() {
        let s = scene();
        let catalog = Catalog::default();
        let err = recover("I am a teapot", &ctx(&s, &catalog), &mut StdRng::seed_from_u64(1));
        assert!(matches!(err, Err(RecoveryError::Exhausted { .. })));
    }

    #[test]
    fn test_fallback_appends_one_canned_line() {
        let s = scene();
        let catalog = Catalog::default();
        let prior: Vec<DialogueLine> = (1..=4)
            .map(|i| {
                DialogueLine::new(
                    i.to_string(),
                    if i % 2 == 1 { "Shrek" } else { "Iron Man" },
                    format!("line {}", i),
                )
            })
            .collect();
        let mut c = ctx(&s, &catalog);
        c.fallback = Some(FallbackPlan {
            prior: &prior,
            pool: CannedPool::Twist,
            speaker: FallbackSpeaker::Random,
            id_prefix: "twist",
        });

        let report = recover("total garbage {{{", &c, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(report.strategy, Strategy::Fallback);
        assert_eq!(report.dialogue.len(), 5);
        assert_eq!(&report.dialogue[..4].iter().map(|l| &l.text).collect::<Vec<_>>(),
            &prior.iter().map(|l| &l.text).collect::<Vec<_>>());
        let added = &report.dialogue[4];
        assert_eq!(added.id, "twist-5");
        assert!(added.character == "Shrek" || added.character == "Iron Man");
        assert!(catalog
            .canned_lines(CannedPool::Twist, "en")
            .contains(&added.text.as_str()));
    }

    #[test]
    fn test_unknown_speaker_is_flagged_not_mislabelled() {
        let mut s = scene();
        s.mood1 = "angry".to_string();
        let catalog = Catalog::default();
        let raw = r#"[{"character": "Donkey", "text": "Are we there yet?"}]"#;
        let report = recover(raw, &ctx(&s, &catalog), &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(report.dialogue[0].character, "Donkey");
        assert_eq!(report.dialogue[0].mood, None);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("Donkey"));
    }

    #[test]
    fn test_empty_text_escalates_past_direct() {
        let s = scene();
        let catalog = Catalog::default();
        let raw = r#"[{"character": "Shrek", "text": ""}]"#;
        assert!(matches!(
            Strategy::Direct.attempt(raw),
            Attempt::Retry(_)
        ));
        assert!(recover(raw, &ctx(&s, &catalog), &mut StdRng::seed_from_u64(1)).is_err());
    }

    #[test]
    fn test_duplicate_ids_are_reassigned() {
        let s = scene();
        let (lines, _) = finalize(
            vec![
                DialogueLine::new("a", "Shrek", "one"),
                DialogueLine::new("a", "Iron Man", "two"),
                DialogueLine::new("", "Shrek", "three"),
            ],
            &s,
            "line",
            &[],
        );
        let ids: Vec<_> = lines.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "line-2", "line-3"]);
    }

    #[test]
    fn test_missing_ids_reuse_prior_ids_by_position() {
        let s = scene();
        let catalog = Catalog::default();
        let prior = vec![
            DialogueLine::new("a", "Shrek", "one"),
            DialogueLine::new("b", "Iron Man", "two"),
            DialogueLine::new("c", "Shrek", "three"),
            DialogueLine::new("d", "Iron Man", "four"),
        ];
        let mut c = ctx(&s, &catalog);
        c.prior = &prior;

        let raw = r#"[
            {"character": "Shrek", "text": "one"},
            {"character": "Iron Man", "text": "two"},
            {"character": "Shrek", "text": "Actually, wait..."},
            {"character": "Iron Man", "text": "Wait for what?"},
            {"character": "Shrek", "text": "Dramatic effect."}
        ]"#;
        let report = recover(raw, &c, &mut StdRng::seed_from_u64(1)).unwrap();
        let ids: Vec<_> = report.dialogue.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "line-5"]);
    }

    #[test]
    fn test_prior_id_does_not_steal_an_explicit_one() {
        let s = scene();
        let prior = vec![
            DialogueLine::new("a", "Shrek", "one"),
            DialogueLine::new("b", "Iron Man", "two"),
        ];
        let (lines, _) = finalize(
            vec![
                DialogueLine::new("", "Shrek", "new opener"),
                DialogueLine::new("a", "Shrek", "one"),
            ],
            &s,
            "line",
            &prior,
        );
        let ids: Vec<_> = lines.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["line-1", "a"]);
    }
}
