use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::Arc;

use crate::core::catalog::{CannedPool, Catalog};
use crate::core::error::{credential_source, AppError, AppResult, HintKind, UpstreamError};
use crate::core::state::{DialogueLine, SceneConfig};
use crate::services::llm::{ChatOptions, LlmClient};
use crate::services::merge;
use crate::services::prompt::{Prompt, PromptBuilder, PromptConfig, PromptMode};
use crate::services::recovery::{
    append_canned, finalize, recover, FallbackPlan, FallbackSpeaker, RecoveryContext,
    RecoveryError, RecoveryReport, Strategy,
};

const LINE_PREFIX: &str = "line";
const TWIST_PREFIX: &str = "twist";
const REPLY_PREFIX: &str = "reply";

const PROBE_PROMPT: &str = "Say \"API connection successful!\" in exactly those words.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Success,
    Error,
}

/// Outcome of the model credential probe. Always reported, never raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub status: ProbeStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Runs prompt → model → recovery for the three dialogue operations.
pub struct DialogueService {
    llm: Box<dyn LlmClient>,
    catalog: Arc<Catalog>,
    prompts: PromptBuilder,
}

impl DialogueService {
    pub fn new(llm: Box<dyn LlmClient>, catalog: Arc<Catalog>, config: &PromptConfig) -> Self {
        let prompts = PromptBuilder::new(catalog.clone(), config);
        Self {
            llm,
            catalog,
            prompts,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    async fn complete(&self, prompt: &Prompt) -> AppResult<String> {
        debug!("System prompt:\n{}", prompt.system);
        debug!("User prompt:\n{}", prompt.user);
        let raw = self
            .llm
            .chat(&prompt.system, &prompt.user, &prompt.options)
            .await
            .map_err(|e| {
                error!("{} completion failed: {:#}", self.llm.provider(), e);
                AppError::from(e)
            })?;
        debug!("Raw model response:\n{}", raw);
        Ok(raw)
    }

    fn recover(&self, raw: &str, ctx: &RecoveryContext<'_>) -> AppResult<RecoveryReport> {
        recover(raw, ctx, &mut rand::rng()).map_err(unrecoverable)
    }

    /// Client-supplied lines get the same id and speaker treatment as model output.
    fn normalize(&self, scene: &SceneConfig, dialogue: &[DialogueLine]) -> Vec<DialogueLine> {
        finalize(dialogue.to_vec(), scene, LINE_PREFIX, &[]).0
    }

    pub async fn generate(&self, scene: &SceneConfig) -> AppResult<RecoveryReport> {
        info!(
            "Generating dialogue: {} vs {} ({})",
            scene.participant1, scene.participant2, scene.language
        );
        let prompt = self.prompts.build(scene, PromptMode::Generate);
        let raw = self.complete(&prompt).await?;

        let ctx = RecoveryContext {
            scene,
            catalog: &self.catalog,
            id_prefix: LINE_PREFIX,
            prior: &[],
            fallback: None,
        };
        let report = self.recover(&raw, &ctx)?;
        info!(
            "Generated {} lines via {:?}",
            report.dialogue.len(),
            report.strategy
        );
        Ok(report)
    }

    pub async fn add_twist(
        &self,
        scene: &SceneConfig,
        dialogue: &[DialogueLine],
    ) -> AppResult<RecoveryReport> {
        info!("Adding plot twist to {} lines", dialogue.len());
        let prior = self.normalize(scene, dialogue);
        let prompt = self.prompts.build(scene, PromptMode::Twist { dialogue: &prior });
        let raw = self.complete(&prompt).await?;

        let plan = FallbackPlan {
            prior: &prior,
            pool: CannedPool::Twist,
            speaker: FallbackSpeaker::Random,
            id_prefix: TWIST_PREFIX,
        };
        let ctx = RecoveryContext {
            scene,
            catalog: &self.catalog,
            id_prefix: LINE_PREFIX,
            prior: &prior,
            fallback: Some(plan),
        };
        let report = self.recover(&raw, &ctx)?;
        let complete =
            report.strategy == Strategy::Fallback || report.dialogue.len() > prior.len();
        let report = if complete {
            report
        } else {
            self.keep_prior(report, &plan, &ctx)?
        };
        info!(
            "Twisted dialogue has {} lines via {:?}",
            report.dialogue.len(),
            report.strategy
        );
        Ok(report)
    }

    /// A twist reply no longer than the prior dialogue cannot have kept it.
    /// Its new lines go after the prior; with none, a canned line is appended.
    fn keep_prior(
        &self,
        report: RecoveryReport,
        plan: &FallbackPlan<'_>,
        ctx: &RecoveryContext<'_>,
    ) -> AppResult<RecoveryReport> {
        let fresh: Vec<DialogueLine> = report
            .dialogue
            .into_iter()
            .filter(|line| !plan.prior.iter().any(|p| p.text == line.text))
            .collect();
        if fresh.is_empty() {
            warn!("Twist reply added nothing, appending a canned line");
            return append_canned(plan, ctx, &mut rand::rng()).map_err(unrecoverable);
        }

        warn!(
            "Twist reply had {} new lines only, keeping the {} prior lines",
            fresh.len(),
            plan.prior.len()
        );
        let mut combined = plan.prior.to_vec();
        combined.extend(fresh);
        let (dialogue, warnings) = finalize(combined, ctx.scene, ctx.id_prefix, plan.prior);
        Ok(RecoveryReport {
            dialogue,
            strategy: report.strategy,
            warnings,
        })
    }

    /// Regenerates the continuation after `line_id` and forces `new_text` back in.
    pub async fn edit_line(
        &self,
        scene: &SceneConfig,
        dialogue: &[DialogueLine],
        line_id: &str,
        new_text: &str,
    ) -> AppResult<RecoveryReport> {
        let dialogue = self.normalize(scene, dialogue);
        let index = merge::locate(&dialogue, line_id)?;
        info!("Editing {} (index {})", line_id, index);

        let edited = merge::apply_edit(&dialogue, index, new_text);
        let prompt = self.prompts.build(
            scene,
            PromptMode::EditContinuation {
                dialogue: &edited,
                line_index: index,
            },
        );
        let raw = self.complete(&prompt).await?;

        let responder = scene.other_participant(&edited[index].character);
        let ctx = RecoveryContext {
            scene,
            catalog: &self.catalog,
            id_prefix: LINE_PREFIX,
            prior: &edited,
            fallback: Some(FallbackPlan {
                prior: &edited,
                pool: CannedPool::Reaction,
                speaker: FallbackSpeaker::Fixed(responder),
                id_prefix: REPLY_PREFIX,
            }),
        };
        let report = self.recover(&raw, &ctx)?;
        let merged = merge::merge(&dialogue, line_id, new_text, report.dialogue, scene)?;

        Ok(RecoveryReport {
            dialogue: merged,
            ..report
        })
    }

    /// Checks the credential, then makes one tiny completion.
    pub async fn probe(&self) -> ProbeReport {
        let provider = self.llm.provider();

        if let Err(e) = self.llm.check_credentials() {
            let (message, solution) = match e.downcast_ref::<UpstreamError>() {
                Some(UpstreamError::MissingCredential { .. }) => (
                    format!("{} API key not found in environment variables", provider),
                    format!(
                        "Please add {} to your environment or config.yml",
                        credential_source(provider)
                    ),
                ),
                Some(UpstreamError::MalformedCredential { .. }) => (
                    format!("{} API key format appears incorrect", provider),
                    "API key should start with \"sk-\"".to_string(),
                ),
                _ => {
                    warn!("{} credential check failed: {:#}", provider, e);
                    (
                        format!("{} API key check failed", provider),
                        HintKind::Credential.solution().to_string(),
                    )
                }
            };
            return ProbeReport {
                status: ProbeStatus::Error,
                message,
                solution: Some(solution),
                response: None,
                model: None,
            };
        }

        let options = ChatOptions {
            max_tokens: 10,
            ..Default::default()
        };
        match self.llm.chat("", PROBE_PROMPT, &options).await {
            Ok(response) => {
                info!("{} probe succeeded", provider);
                ProbeReport {
                    status: ProbeStatus::Success,
                    message: format!("{} API is working correctly", provider),
                    solution: None,
                    response: Some(response.trim().to_string()),
                    model: Some(self.llm.model().to_string()),
                }
            }
            Err(e) => {
                error!("{} probe failed: {:#}", provider, e);
                let err = AppError::from(e);
                ProbeReport {
                    status: ProbeStatus::Error,
                    message: format!("{} API test failed", provider),
                    solution: err.solution(),
                    response: None,
                    model: Some(self.llm.model().to_string()),
                }
            }
        }
    }
}

fn unrecoverable(err: RecoveryError) -> AppError {
    match err {
        RecoveryError::Exhausted { reason } => {
            error!("Model response unrecoverable: {}", reason);
            AppError::MalformedResponse(reason)
        }
    }
}
