use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use crate::core::config::{ELEVENLABS_KEY_ENV, OPENAI_KEY_ENV};

pub type AppResult<T, E = AppError> = std::result::Result<T, E>;

/// What the user should check when an upstream service misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HintKind {
    Credential,
    Quota,
    Connectivity,
}

/// Failures talking to the model or speech provider.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{provider} API key not configured")]
    MissingCredential { provider: &'static str },

    #[error("{provider} API key format appears incorrect")]
    MalformedCredential { provider: &'static str },

    #[error("{provider} rejected the API key: {body}")]
    Unauthorized { provider: &'static str, body: String },

    #[error("{provider} quota or billing limit reached: {body}")]
    Quota { provider: &'static str, body: String },

    #[error("{provider} is unreachable: {message}")]
    Connectivity { provider: &'static str, message: String },

    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} returned an empty response")]
    EmptyResponse { provider: &'static str },
}

impl UpstreamError {
    /// Maps a non-2xx provider response to the matching variant.
    pub fn from_status(provider: &'static str, status: u16, body: String) -> Self {
        let lower = body.to_lowercase();
        match status {
            401 | 403 => UpstreamError::Unauthorized { provider, body },
            429 => UpstreamError::Quota { provider, body },
            _ if lower.contains("quota") || lower.contains("billing") => {
                UpstreamError::Quota { provider, body }
            }
            _ if lower.contains("api key") || lower.contains("api_key") => {
                UpstreamError::Unauthorized { provider, body }
            }
            _ => UpstreamError::Api {
                provider,
                status,
                body,
            },
        }
    }

    /// The request URL is stripped; it may carry a credential.
    pub fn from_transport(provider: &'static str, err: reqwest::Error) -> Self {
        UpstreamError::Connectivity {
            provider,
            message: err.without_url().to_string(),
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            UpstreamError::MissingCredential { provider }
            | UpstreamError::MalformedCredential { provider }
            | UpstreamError::Unauthorized { provider, .. }
            | UpstreamError::Quota { provider, .. }
            | UpstreamError::Connectivity { provider, .. }
            | UpstreamError::Api { provider, .. }
            | UpstreamError::EmptyResponse { provider } => provider,
        }
    }

    /// Credential hints name the provider's own key.
    pub fn solution(&self) -> String {
        match self.hint() {
            HintKind::Credential => {
                let source = credential_source(self.provider());
                format!(
                    "Verifică cheia API ({}) în configurație / Check your {} API key ({})",
                    source,
                    self.provider(),
                    source
                )
            }
            other => other.solution().to_string(),
        }
    }

    pub fn hint(&self) -> HintKind {
        match self {
            UpstreamError::MissingCredential { .. }
            | UpstreamError::MalformedCredential { .. }
            | UpstreamError::Unauthorized { .. } => HintKind::Credential,
            UpstreamError::Quota { .. } => HintKind::Quota,
            UpstreamError::Connectivity { .. }
            | UpstreamError::Api { .. }
            | UpstreamError::EmptyResponse { .. } => HintKind::Connectivity,
        }
    }
}

impl HintKind {
    pub fn solution(&self) -> &'static str {
        match self {
            HintKind::Credential => {
                "Verifică cheia API în configurație / Check your API key configuration"
            }
            HintKind::Quota => {
                "Verifică creditele și limitele contului / Check your account billing and usage limits"
            }
            HintKind::Connectivity => {
                "Verifică conexiunea la internet și starea serviciului / Check your internet connection and the provider status"
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing required field: {field}")]
    Validation { field: &'static str },

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Line '{0}' not found")]
    LineNotFound(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Unrecoverable model response: {0}")]
    MalformedResponse(String),

    #[error("Internal server error: {0}")]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for AppError {
    /// Lifts typed upstream failures back out of `anyhow`.
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<UpstreamError>() {
            Ok(upstream) => AppError::Upstream(upstream),
            Err(other) => AppError::Internal(other),
        }
    }
}

#[derive(Serialize)]
struct JsonError {
    error: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<HintKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    solution: Option<String>,
}

fn bilingual(ro: &str, en: &str) -> String {
    format!("{}\n\n---\n\n{}", ro, en)
}

/// Where the key for `provider` is read from.
pub fn credential_source(provider: &str) -> String {
    match provider {
        "OpenAI" => OPENAI_KEY_ENV.to_string(),
        "ElevenLabs" => ELEVENLABS_KEY_ENV.to_string(),
        other => format!("{}.api_key in config.yml", other.to_lowercase()),
    }
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "validation_error",
            AppError::MalformedBody(_) => "invalid_body",
            AppError::LineNotFound(_) => "not_found",
            AppError::Upstream(_) => "upstream_unavailable",
            AppError::MalformedResponse(_) => "malformed_upstream_response",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Human-readable text for the client. Raw upstream bodies stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation { field } => bilingual(
                &format!("❌ Lipsește câmpul obligatoriu: {}", field),
                &format!("❌ Missing required field: {}", field),
            ),
            AppError::MalformedBody(_) => bilingual(
                "❌ Corpul cererii nu este un JSON valid pentru această operație.",
                "❌ The request body is not valid JSON for this operation.",
            ),
            AppError::LineNotFound(id) => bilingual(
                &format!("❌ Replica '{}' nu a fost găsită în dialog", id),
                &format!("❌ Line '{}' was not found in the dialogue", id),
            ),
            AppError::Upstream(e) => match e.hint() {
                HintKind::Credential => {
                    let source = credential_source(e.provider());
                    bilingual(
                        &format!("🔑 Problemă cu cheia API! Verifică că ai configurat {}.", source),
                        &format!("🔑 {} API key issue! Make sure {} is configured.", e.provider(), source),
                    )
                }
                HintKind::Quota => bilingual(
                    "💳 Problemă cu contul! Verifică că ai credite disponibile.",
                    "💳 Account issue! Check that you have available credits.",
                ),
                HintKind::Connectivity => bilingual(
                    "🌐 Serviciul AI nu a putut fi contactat. Încearcă din nou mai târziu.",
                    "🌐 The AI service could not be reached. Please try again later.",
                ),
            },
            AppError::MalformedResponse(_) => bilingual(
                "❌ Nu s-a putut genera dialogul! Răspunsul AI nu a putut fi interpretat, încearcă din nou.",
                "❌ Failed to generate dialogue! The AI response could not be understood, please try again.",
            ),
            AppError::Internal(_) => bilingual(
                "❌ A apărut o eroare neașteptată.",
                "❌ An unexpected error occurred.",
            ),
        }
    }

    pub fn hint(&self) -> Option<HintKind> {
        match self {
            AppError::Upstream(e) => Some(e.hint()),
            _ => None,
        }
    }

    pub fn solution(&self) -> Option<String> {
        match self {
            AppError::Upstream(e) => Some(e.solution()),
            _ => None,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            AppError::LineNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::MalformedResponse(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        if status_code.is_server_error() {
            log::error!("{}", self);
        } else if let AppError::MalformedBody(detail) = self {
            log::warn!("Rejected request body: {}", detail);
        }
        HttpResponse::build(status_code).json(JsonError {
            error: self.user_message(),
            kind: self.kind(),
            hint: self.hint(),
            solution: self.solution(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            UpstreamError::from_status("OpenAI", 401, "bad key".into()).hint(),
            HintKind::Credential
        );
        assert_eq!(
            UpstreamError::from_status("OpenAI", 429, "slow down".into()).hint(),
            HintKind::Quota
        );
        assert_eq!(
            UpstreamError::from_status("OpenAI", 400, "You exceeded your current quota".into()).hint(),
            HintKind::Quota
        );
        assert_eq!(
            UpstreamError::from_status("OpenAI", 502, "bad gateway".into()).hint(),
            HintKind::Connectivity
        );
    }

    #[test]
    fn test_anyhow_round_trip_keeps_upstream_kind() {
        let err: anyhow::Error = UpstreamError::MissingCredential { provider: "OpenAI" }.into();
        let app: AppError = err.into();
        assert!(matches!(app, AppError::Upstream(UpstreamError::MissingCredential { .. })));
        assert_eq!(app.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.hint(), Some(HintKind::Credential));
    }

    #[test]
    fn test_messages_are_bilingual() {
        let msg = AppError::LineNotFound("line-9".into()).user_message();
        assert!(msg.contains("nu a fost găsită"));
        assert!(msg.contains("was not found"));
        assert_eq!(AppError::LineNotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Validation { field: "theme" }.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_user_message_hides_raw_body() {
        let app = AppError::Upstream(UpstreamError::Api {
            provider: "OpenAI",
            status: 500,
            body: "stacktrace at line 42".into(),
        });
        assert!(!app.user_message().contains("stacktrace"));
    }

    #[test]
    fn test_credential_hint_names_the_failing_provider() {
        let speech = AppError::Upstream(UpstreamError::Unauthorized {
            provider: "ElevenLabs",
            body: "invalid key".into(),
        });
        assert!(speech.user_message().contains("ELEVENLABS_API_KEY"));
        assert!(!speech.user_message().contains("OPENAI_API_KEY"));
        assert!(speech.solution().unwrap().contains("ELEVENLABS_API_KEY"));

        let gemini = UpstreamError::MissingCredential { provider: "Gemini" };
        assert!(gemini.solution().contains("gemini.api_key"));
        assert!(!gemini.solution().contains("OPENAI_API_KEY"));

        let openai = UpstreamError::MalformedCredential { provider: "OpenAI" };
        assert!(openai.solution().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_malformed_body_is_a_client_error() {
        let app = AppError::MalformedBody("missing field `character`".into());
        assert_eq!(app.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(app.kind(), "invalid_body");
        assert!(!app.user_message().contains("missing field"));
        assert!(app.solution().is_none());
    }
}
