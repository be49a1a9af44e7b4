// API module for the gameshelf HTTP server

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

use crate::database_ops::db::Db;
use crate::database_ops::steam::import::Importer;

/// Shared per-worker application context.
pub struct AppCtx {
    pub db: Db,
    pub importer: Importer,
}

pub use server::ApiServer;
