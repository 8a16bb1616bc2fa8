use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use log::{error, info};

use crate::controllers::{dialogue_controller, speech_controller, system_controller};
use crate::core::catalog::Catalog;
use crate::core::config::Config;
use crate::core::error::AppError;
use crate::services::dialogue::DialogueService;
use crate::services::llm::{create_llm, LlmClient};
use crate::services::prompt::PromptConfig;
use crate::services::speech::{create_speech_client, SpeechClient, SpeechDispatcher};

/// Shared, read-only per-process state. Requests carry everything else.
pub struct AppState {
    pub dialogue: DialogueService,
    pub speech: SpeechDispatcher,
    pub catalog: Arc<Catalog>,
    pub default_language: String,
}

impl AppState {
    pub fn new(
        llm: Box<dyn LlmClient>,
        speech: Option<Box<dyn SpeechClient>>,
        catalog: Arc<Catalog>,
        prompt: &PromptConfig,
    ) -> Self {
        Self {
            dialogue: DialogueService::new(llm, catalog.clone(), prompt),
            speech: SpeechDispatcher::new(speech, catalog.clone()),
            catalog,
            default_language: prompt.default_language.clone(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let catalog = Arc::new(Catalog::from_config(config));
        let llm = create_llm(&config.llm)?;
        info!("Model: {} ({})", llm.provider(), llm.model());
        let speech = create_speech_client(&config.speech)?;
        if speech.is_none() {
            info!("No speech provider, clients will use local synthesis");
        }
        Ok(Self::new(llm, speech, catalog, &config.prompt))
    }
}

/// Rejected JSON bodies answer with the same error body as every other failure.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| AppError::MalformedBody(err.to_string()).into())
}

pub fn app_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(json_config())
            .configure(dialogue_controller::config)
            .configure(speech_controller::config)
            .configure(system_controller::config),
    );
}

pub async fn run(config: Config) -> Result<()> {
    info!("Starting script improv service...");

    let app_state = web::Data::new(AppState::from_config(&config)?);
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .configure(app_config)
    })
    .workers(config.server.workers.max(1))
    .bind(&addr)
    .with_context(|| format!("Failed to bind server to {}", addr))?
    .run();

    info!("Listening on http://{}", addr);

    if let Err(e) = server.await {
        error!("Web server error: {}", e);
        return Err(e.into());
    }
    Ok(())
}
