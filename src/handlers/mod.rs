pub mod transcribe;

use crate::health;
use actix_web::web;

/// Registers every route of the service.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/transcribe", web::post().to(transcribe::transcribe))
        .route("/live", web::get().to(health::live))
        .route("/metrics", web::get().to(health::detailed_metrics));
}

/// Method and path of every route registered by [`configure`], for the startup log.
pub const ROUTES: &[(&str, &str)] = &[
    ("POST", "/transcribe"),
    ("GET", "/live"),
    ("GET", "/metrics"),
];
