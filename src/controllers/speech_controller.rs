use actix_web::{post, web, HttpResponse};

use crate::core::error::AppError;
use crate::dto::{TextToSpeechRequest, TextToSpeechResponse};
use crate::server::AppState;
use crate::services::speech::AudioResult;
use crate::utils::data_uri::base64_data_uri;

#[post("/text-to-speech")]
pub async fn text_to_speech(
    app_state: web::Data<AppState>,
    payload: web::Json<TextToSpeechRequest>,
) -> Result<HttpResponse, AppError> {
    let job = payload.into_inner().validate(&app_state.default_language)?;

    let body = match app_state
        .speech
        .dispatch(&job.text, &job.character, &job.language)
        .await
    {
        AudioResult::Embedded {
            bytes,
            mime_type,
            voice_id,
        } => TextToSpeechResponse::Audio {
            audio_data: base64_data_uri(&mime_type, &bytes),
            voice_id,
            character: job.character,
            text: job.text,
        },
        AudioResult::UseLocalFallback => TextToSpeechResponse::Local {
            use_local_fallback: true,
            text: job.text,
            character: job.character,
            language: job.language,
        },
    };
    Ok(HttpResponse::Ok().json(body))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(text_to_speech);
}
