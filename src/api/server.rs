// API server implementation using actix-web

use crate::api::{middleware, routes, AppCtx};
use crate::database_ops::db::Db;
use crate::database_ops::steam::client::SteamClient;
use crate::database_ops::steam::denylist::Denylist;
use crate::database_ops::steam::import::Importer;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;

pub struct ApiServer {
    pub host: String,
    pub port: u16,
    pub allowed_origins: String,
}

impl ApiServer {
    /// Create server from environment variables
    pub fn from_env() -> Result<Self> {
        crate::util::env::init_env();

        let host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("Invalid API_PORT")?;

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://localhost:8000".to_string());

        Ok(Self {
            host,
            port,
            allowed_origins,
        })
    }

    /// Start the HTTP server
    pub async fn run(self, db: Db) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);

        tracing::info!(
            host = %self.host,
            port = %self.port,
            "Starting gameshelf API server"
        );

        let denylist = Arc::new(Denylist::from_env());
        if !denylist.is_empty() {
            tracing::info!(entries = denylist.len(), "denylist loaded");
        }
        let importer = Importer::new(db.clone(), SteamClient::new(), denylist);
        let ctx = web::Data::new(AppCtx {
            db,
            importer,
        });
        let allowed_origins = self.allowed_origins.clone();

        HttpServer::new(move || {
            let (logger, compress) = middleware::setup_middleware();
            let cors = middleware::setup_cors(&allowed_origins);

            App::new()
                .app_data(ctx.clone())
                .wrap(logger)
                .wrap(compress)
                .wrap(cors)
                .configure(routes::configure_routes)
        })
        .bind(&bind_addr)
        .with_context(|| format!("Failed to bind to {}", bind_addr))?
        .run()
        .await
        .context("HTTP server error")?;

        Ok(())
    }
}
