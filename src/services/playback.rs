use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::state::DialogueLine;
use crate::services::speech::{AudioResult, SpeechDispatcher};

pub const BASE_PAUSE: Duration = Duration::from_millis(1500);

/// Where audio ends up. Implementations own the actual output device.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Resolves when the clip finished playing.
    async fn play(&self, line: &DialogueLine, bytes: &[u8], mime_type: &str) -> Result<()>;

    /// Speaks the line with a locally available synthesizer.
    async fn speak_local(&self, line: &DialogueLine, language: &str) -> Result<()>;

    /// Stops whatever is playing and frees the handle.
    fn release(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackOutcome {
    pub played: usize,
    pub cancelled: bool,
}

/// Inter-line pause for a playback speed multiplier.
pub fn pause_for_speed(speed: f32) -> Duration {
    if !speed.is_finite() || speed <= 0.0 {
        return BASE_PAUSE;
    }
    BASE_PAUSE.div_f32(speed)
}

async fn play_line(
    line: &DialogueLine,
    dispatcher: &SpeechDispatcher,
    sink: &dyn AudioSink,
    language: &str,
) {
    match dispatcher.dispatch(&line.text, &line.character, language).await {
        AudioResult::Embedded {
            bytes, mime_type, ..
        } => {
            if let Err(e) = sink.play(line, &bytes, &mime_type).await {
                warn!("Embedded audio failed for {}, speaking locally: {}", line.id, e);
                if let Err(e) = sink.speak_local(line, language).await {
                    warn!("Local speech failed for {}: {}", line.id, e);
                }
            }
        }
        AudioResult::UseLocalFallback => {
            if let Err(e) = sink.speak_local(line, language).await {
                warn!("Local speech failed for {}: {}", line.id, e);
            }
        }
    }
}

/// Plays `lines` in order, one at a time, until done or `cancel` fires.
pub async fn play_dialogue(
    lines: &[DialogueLine],
    dispatcher: &SpeechDispatcher,
    sink: &dyn AudioSink,
    language: &str,
    pause: Duration,
    cancel: &CancellationToken,
) -> PlaybackOutcome {
    let mut outcome = PlaybackOutcome::default();

    for (i, line) in lines.iter().enumerate() {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }

        debug!("Playing {} ({})", line.id, line.character);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                sink.release();
                outcome.cancelled = true;
                break;
            }
            _ = play_line(line, dispatcher, sink, language) => {
                outcome.played += 1;
            }
        }

        if i + 1 < lines.len() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    sink.release();
                    outcome.cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    info!(
        "Playback finished: {}/{} lines{}",
        outcome.played,
        lines.len(),
        if outcome.cancelled { " (cancelled)" } else { "" }
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::Catalog;
    use crate::services::speech::{SpeechAudio, SpeechClient};
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};

    struct OkSpeech;

    #[async_trait]
    impl SpeechClient for OkSpeech {
        fn is_configured(&self) -> bool {
            true
        }
        async fn synthesize(&self, _text: &str, _voice_id: &str, _language: &str) -> Result<SpeechAudio> {
            Ok(SpeechAudio {
                bytes: vec![7],
                mime_type: "audio/mpeg".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<String>>,
        fail_embedded: bool,
        cancel_on: Option<(String, CancellationToken)>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AudioSink for RecordingSink {
        async fn play(&self, line: &DialogueLine, _bytes: &[u8], _mime_type: &str) -> Result<()> {
            self.events.lock().unwrap().push(format!("play {}", line.id));
            if self.fail_embedded {
                return Err(anyhow!("decoder error"));
            }
            Ok(())
        }

        async fn speak_local(&self, line: &DialogueLine, _language: &str) -> Result<()> {
            self.events.lock().unwrap().push(format!("local {}", line.id));
            if let Some((id, token)) = &self.cancel_on {
                if *id == line.id {
                    token.cancel();
                    std::future::pending::<()>().await;
                }
            }
            Ok(())
        }

        fn release(&self) {
            self.events.lock().unwrap().push("release".to_string());
        }
    }

    fn lines() -> Vec<DialogueLine> {
        vec![
            DialogueLine::new("line-1", "Shrek", "Get out of my swamp!"),
            DialogueLine::new("line-2", "Iron Man", "It's a parking lot."),
            DialogueLine::new("line-3", "Shrek", "Same thing."),
        ]
    }

    fn local_only() -> SpeechDispatcher {
        SpeechDispatcher::new(None, Arc::new(Catalog::default()))
    }

    #[test]
    fn test_pause_for_speed() {
        assert_eq!(pause_for_speed(1.0), Duration::from_millis(1500));
        assert_eq!(pause_for_speed(2.0), Duration::from_millis(750));
        assert_eq!(pause_for_speed(0.0), BASE_PAUSE);
    }

    #[tokio::test]
    async fn test_plays_every_line_in_order() {
        let sink = RecordingSink::default();
        let token = CancellationToken::new();
        let outcome = play_dialogue(&lines(), &local_only(), &sink, "en", Duration::ZERO, &token).await;

        assert_eq!(outcome, PlaybackOutcome { played: 3, cancelled: false });
        assert_eq!(sink.events(), vec!["local line-1", "local line-2", "local line-3"]);
    }

    #[tokio::test]
    async fn test_embedded_failure_falls_back_to_local() {
        let dispatcher = SpeechDispatcher::new(Some(Box::new(OkSpeech)), Arc::new(Catalog::default()));
        let sink = RecordingSink {
            fail_embedded: true,
            ..Default::default()
        };
        let token = CancellationToken::new();
        let outcome = play_dialogue(&lines()[..1], &dispatcher, &sink, "en", Duration::ZERO, &token).await;

        assert_eq!(outcome.played, 1);
        assert_eq!(sink.events(), vec!["play line-1", "local line-1"]);
    }

    #[tokio::test]
    async fn test_cancel_mid_line_releases_and_stops() {
        let token = CancellationToken::new();
        let sink = RecordingSink {
            cancel_on: Some(("line-2".to_string(), token.clone())),
            ..Default::default()
        };
        let outcome = play_dialogue(&lines(), &local_only(), &sink, "en", Duration::ZERO, &token).await;

        assert_eq!(outcome, PlaybackOutcome { played: 1, cancelled: true });
        assert_eq!(sink.events(), vec!["local line-1", "local line-2", "release"]);
    }

    #[tokio::test]
    async fn test_already_cancelled_plays_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let sink = RecordingSink::default();
        let outcome = play_dialogue(&lines(), &local_only(), &sink, "en", Duration::ZERO, &token).await;

        assert_eq!(outcome, PlaybackOutcome { played: 0, cancelled: true });
        assert!(sink.events().is_empty());
    }
}
