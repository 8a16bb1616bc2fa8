use actix_web::{get, web, HttpResponse, Responder};

use crate::server::AppState;

/// Reports the model credential status; problems are described in the body.
#[get("/test-openai")]
pub async fn test_openai(app_state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(app_state.dialogue.probe().await)
}

#[get("/health")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("OK")
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(test_openai).service(health_check);
}
