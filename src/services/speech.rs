use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::core::catalog::Catalog;
use crate::core::error::UpstreamError;

// --- Config ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_provider")]
    pub provider: String, // "elevenlabs" or "local"
    pub elevenlabs: Option<ElevenLabsConfig>,
    /// Extra or overridden character → voice id entries.
    #[serde(default)]
    pub voices: HashMap<String, String>,
    pub fallback_male_voice: Option<String>,
    pub fallback_female_voice: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            provider: default_speech_provider(),
            elevenlabs: None,
            voices: HashMap::new(),
            fallback_male_voice: None,
            fallback_female_voice: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_elevenlabs_base_url")]
    pub base_url: String,
    #[serde(default = "default_elevenlabs_model")]
    pub model_id: String,
    #[serde(default = "default_stability")]
    pub stability: f32,
    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,
    #[serde(default = "default_style")]
    pub style: f32,
    #[serde(default = "default_speaker_boost")]
    pub use_speaker_boost: bool,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_elevenlabs_base_url(),
            model_id: default_elevenlabs_model(),
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
            style: default_style(),
            use_speaker_boost: default_speaker_boost(),
        }
    }
}

fn default_speech_provider() -> String {
    "elevenlabs".to_string()
}
fn default_elevenlabs_base_url() -> String {
    "https://api.elevenlabs.io".to_string()
}
fn default_elevenlabs_model() -> String {
    "eleven_multilingual_v2".to_string()
}
fn default_stability() -> f32 {
    0.5
}
fn default_similarity_boost() -> f32 {
    0.8
}
fn default_style() -> f32 {
    0.3
}
fn default_speaker_boost() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Result of one dispatch. Provider trouble is never an error, only a fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioResult {
    Embedded {
        bytes: Vec<u8>,
        mime_type: String,
        voice_id: String,
    },
    UseLocalFallback,
}

#[async_trait]
pub trait SpeechClient: Send + Sync {
    /// False when no credential is configured; the dispatcher then skips the call.
    fn is_configured(&self) -> bool;

    async fn synthesize(&self, text: &str, voice_id: &str, language: &str) -> Result<SpeechAudio>;
}

pub fn create_speech_client(config: &SpeechConfig) -> Result<Option<Box<dyn SpeechClient>>> {
    match config.provider.as_str() {
        "elevenlabs" => {
            let cfg = config.elevenlabs.clone().unwrap_or_default();
            Ok(Some(Box::new(ElevenLabsClient::new(cfg)?)))
        }
        "local" | "none" => Ok(None),
        _ => Err(anyhow!("Unknown TTS provider: {}", config.provider)),
    }
}

// --- ElevenLabs ---

const ELEVENLABS: &str = "ElevenLabs";

pub struct ElevenLabsClient {
    config: ElevenLabsConfig,
    base_url: Url,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

impl ElevenLabsClient {
    pub fn new(config: ElevenLabsConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid ElevenLabs base_url: {}", config.base_url))?;
        Ok(Self {
            config,
            base_url,
            client: reqwest::Client::new(),
        })
    }

    fn api_key(&self) -> Option<&str> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    fn endpoint(&self, voice_id: &str) -> Result<Url> {
        Ok(self
            .base_url
            .join(&format!("v1/text-to-speech/{}", voice_id))?)
    }
}

#[async_trait]
impl SpeechClient for ElevenLabsClient {
    fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }

    async fn synthesize(&self, text: &str, voice_id: &str, language: &str) -> Result<SpeechAudio> {
        let api_key = self
            .api_key()
            .ok_or(UpstreamError::MissingCredential { provider: ELEVENLABS })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("audio/mpeg"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("xi-api-key", HeaderValue::from_str(api_key)?);

        let body = ElevenLabsRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: VoiceSettings {
                stability: self.config.stability,
                similarity_boost: self.config.similarity_boost,
                style: self.config.style,
                use_speaker_boost: self.config.use_speaker_boost,
            },
        };

        debug!("ElevenLabs request: voice={} language={}", voice_id, language);
        let resp = self
            .client
            .post(self.endpoint(voice_id)?)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::from_transport(ELEVENLABS, e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(ELEVENLABS, status, body).into());
        }

        let mime_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("audio/"))
            .unwrap_or("audio/mpeg")
            .to_string();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| UpstreamError::from_transport(ELEVENLABS, e))?;
        if bytes.is_empty() {
            return Err(UpstreamError::EmptyResponse { provider: ELEVENLABS }.into());
        }

        Ok(SpeechAudio {
            bytes: bytes.to_vec(),
            mime_type,
        })
    }
}

// --- Dispatch ---

pub struct SpeechDispatcher {
    client: Option<Box<dyn SpeechClient>>,
    catalog: Arc<Catalog>,
}

impl SpeechDispatcher {
    pub fn new(client: Option<Box<dyn SpeechClient>>, catalog: Arc<Catalog>) -> Self {
        Self { client, catalog }
    }

    pub fn voice_for(&self, character: &str) -> &str {
        self.catalog.voice_for(character)
    }

    /// One provider attempt; anything short of audio bytes means local synthesis.
    pub async fn dispatch(&self, text: &str, character: &str, language: &str) -> AudioResult {
        let client = match &self.client {
            Some(c) if c.is_configured() => c,
            _ => {
                debug!("No speech credential configured, using local synthesis");
                return AudioResult::UseLocalFallback;
            }
        };

        let voice_id = self.voice_for(character);
        match client.synthesize(text, voice_id, language).await {
            Ok(audio) => {
                info!(
                    "Synthesized {} bytes for {} with voice {}",
                    audio.bytes.len(),
                    character,
                    voice_id
                );
                AudioResult::Embedded {
                    bytes: audio.bytes,
                    mime_type: audio.mime_type,
                    voice_id: voice_id.to_string(),
                }
            }
            Err(e) => {
                warn!("Speech provider failed, using local synthesis: {}", e);
                AudioResult::UseLocalFallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct MockSpeechClient {
        configured: bool,
        should_fail: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SpeechClient for MockSpeechClient {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn synthesize(&self, _text: &str, _voice_id: &str, _language: &str) -> Result<SpeechAudio> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                Err(anyhow!("Mock TTS error"))
            } else {
                Ok(SpeechAudio {
                    bytes: vec![1, 2, 3],
                    mime_type: "audio/mpeg".to_string(),
                })
            }
        }
    }

    fn dispatcher(configured: bool, should_fail: bool) -> (SpeechDispatcher, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = MockSpeechClient {
            configured,
            should_fail,
            calls: calls.clone(),
        };
        (
            SpeechDispatcher::new(Some(Box::new(client)), Arc::new(Catalog::default())),
            calls,
        )
    }

    #[tokio::test]
    async fn test_no_credential_uses_local_fallback_without_calling() {
        let (d, calls) = dispatcher(false, false);
        assert_eq!(d.dispatch("Hi", "Shrek", "en").await, AudioResult::UseLocalFallback);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let none = SpeechDispatcher::new(None, Arc::new(Catalog::default()));
        assert_eq!(none.dispatch("Hi", "Shrek", "en").await, AudioResult::UseLocalFallback);
    }

    #[tokio::test]
    async fn test_provider_failure_degrades_after_one_attempt() {
        let (d, calls) = dispatcher(true, true);
        assert_eq!(d.dispatch("Hi", "Shrek", "en").await, AudioResult::UseLocalFallback);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_reports_voice() {
        let (d, _) = dispatcher(true, false);
        match d.dispatch("Hi", "Elsa", "en").await {
            AudioResult::Embedded { voice_id, bytes, .. } => {
                assert_eq!(voice_id, "AZnzlk1XvdvUeBnXmlld");
                assert_eq!(bytes, vec![1, 2, 3]);
            }
            other => panic!("expected embedded audio, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_elevenlabs_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/pNInz6obpgDQGcFmaJgB"))
            .and(header("xi-api-key", "xi-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(vec![0xFFu8, 0xFB, 0x90]),
            )
            .mount(&server)
            .await;

        let client = ElevenLabsClient::new(ElevenLabsConfig {
            api_key: Some("xi-test".to_string()),
            base_url: server.uri(),
            ..Default::default()
        })
        .unwrap();
        let d = SpeechDispatcher::new(Some(Box::new(client)), Arc::new(Catalog::default()));

        match d.dispatch("Get out of my swamp!", "Shrek", "en").await {
            AudioResult::Embedded { bytes, mime_type, voice_id } => {
                assert_eq!(bytes, vec![0xFF, 0xFB, 0x90]);
                assert_eq!(mime_type, "audio/mpeg");
                assert_eq!(voice_id, "pNInz6obpgDQGcFmaJgB");
            }
            other => panic!("expected embedded audio, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_elevenlabs_error_status_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let client = ElevenLabsClient::new(ElevenLabsConfig {
            api_key: Some("xi-bad".to_string()),
            base_url: server.uri(),
            ..Default::default()
        })
        .unwrap();
        let d = SpeechDispatcher::new(Some(Box::new(client)), Arc::new(Catalog::default()));
        assert_eq!(d.dispatch("Hi", "Shrek", "en").await, AudioResult::UseLocalFallback);
    }

    #[test]
    fn test_create_speech_client() {
        assert!(create_speech_client(&SpeechConfig::default()).unwrap().is_some());
        let local = SpeechConfig {
            provider: "local".to_string(),
            ..Default::default()
        };
        assert!(create_speech_client(&local).unwrap().is_none());
        let unknown = SpeechConfig {
            provider: "mystery".to_string(),
            ..Default::default()
        };
        assert!(create_speech_client(&unknown).is_err());
    }
}
