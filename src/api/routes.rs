// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        // API v1 routes
        .service(
            web::scope("/api/v1")
                // Import surface
                .route(
                    "/import/app/{appid}",
                    web::post().to(handlers::import_app),
                )
                .route("/import/batch", web::post().to(handlers::import_batch))
                .route("/import/owned", web::post().to(handlers::import_owned))
                // Catalog read surface
                .route("/games", web::get().to(handlers::list_games))
                .route("/games/{slug}", web::get().to(handlers::get_game)),
        );
}
