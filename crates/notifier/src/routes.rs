use actix_web::{HttpResponse, Result, web};

use crate::notifier_manager::NotifierManager;

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Current counters and tracker size as JSON
async fn get_stats(manager: web::Data<NotifierManager>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(manager.get_stats().await))
}

/// Register the status routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .service(web::scope("/api").route("/stats", web::get().to(get_stats)));
}
