use actix_web::{post, web, HttpResponse};
use log::info;

use crate::core::error::AppError;
use crate::dto::{
    AddPlotTwistRequest, DialogueResponse, GenerateDialogueRequest, GenerateVideoRequest,
    RegenerateLineRequest,
};
use crate::server::AppState;
use crate::services::recovery::RecoveryReport;
use crate::services::storyboard;

fn dialogue_response(report: RecoveryReport) -> HttpResponse {
    HttpResponse::Ok().json(DialogueResponse {
        dialogue: report.dialogue,
        warnings: report.warnings,
    })
}

#[post("/generate-dialogue")]
pub async fn generate_dialogue(
    app_state: web::Data<AppState>,
    payload: web::Json<GenerateDialogueRequest>,
) -> Result<HttpResponse, AppError> {
    let scene = payload
        .into_inner()
        .scene
        .into_scene(&app_state.default_language)?;
    let report = app_state.dialogue.generate(&scene).await?;
    Ok(dialogue_response(report))
}

#[post("/add-plot-twist")]
pub async fn add_plot_twist(
    app_state: web::Data<AppState>,
    payload: web::Json<AddPlotTwistRequest>,
) -> Result<HttpResponse, AppError> {
    let (scene, dialogue) = payload.into_inner().validate(&app_state.default_language)?;
    let report = app_state.dialogue.add_twist(&scene, &dialogue).await?;
    Ok(dialogue_response(report))
}

#[post("/regenerate-line")]
pub async fn regenerate_line(
    app_state: web::Data<AppState>,
    payload: web::Json<RegenerateLineRequest>,
) -> Result<HttpResponse, AppError> {
    let edit = payload.into_inner().validate(&app_state.default_language)?;
    let report = app_state
        .dialogue
        .edit_line(&edit.scene, &edit.dialogue, &edit.line_id, &edit.new_text)
        .await?;
    Ok(dialogue_response(report))
}

#[post("/generate-video")]
pub async fn generate_video(
    app_state: web::Data<AppState>,
    payload: web::Json<GenerateVideoRequest>,
) -> Result<HttpResponse, AppError> {
    let (scene, dialogue) = payload.into_inner().validate(&app_state.default_language)?;
    let export = storyboard::export(&scene, &dialogue, &app_state.catalog)?;
    info!(
        "Storyboard '{}' with {} scenes",
        export.video_data.title,
        export.video_data.scenes.len()
    );
    Ok(HttpResponse::Ok().json(export))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(generate_dialogue)
        .service(add_plot_twist)
        .service(regenerate_line)
        .service(generate_video);
}
