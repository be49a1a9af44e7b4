// HTTP request handlers for API endpoints

use crate::api::models::*;
use crate::api::AppCtx;
use crate::database_ops::catalog;
use crate::database_ops::steam::batch::{self, BatchOptions};
use crate::database_ops::steam::import::Outcome;
use crate::util::env::env_opt;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Result};
use std::time::{Instant, SystemTime};

/// Health check endpoint
pub async fn health_check(ctx: web::Data<AppCtx>) -> Result<HttpResponse> {
    // Quick database connectivity check
    let db_status = match sqlx::query_scalar::<_, bool>("SELECT true")
        .fetch_one(&ctx.db.pool)
        .await
    {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    let uptime = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let response = ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        database: db_status.to_string(),
        uptime_seconds: uptime,
    });

    Ok(HttpResponse::Ok().json(response))
}

fn outcome_status(outcome: &Outcome) -> StatusCode {
    use crate::database_ops::steam::import::SkipReason;
    match outcome {
        Outcome::Imported { .. } => StatusCode::OK,
        Outcome::Skipped { reason, .. } => match reason {
            SkipReason::AlreadyImported => StatusCode::CONFLICT,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        },
        Outcome::Errored { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Import exactly one app by its external id
pub async fn import_app(
    path: web::Path<i64>,
    query: web::Query<ImportAppQuery>,
    ctx: web::Data<AppCtx>,
) -> Result<HttpResponse> {
    let appid = path.into_inner();
    tracing::info!(appid, debug = query.debug, "single-app import requested");

    let started = Instant::now();
    let outcome = ctx.importer.import_one(appid).await;
    let status = outcome_status(&outcome);

    let code = match &outcome {
        Outcome::Skipped { code, .. } => Some(*code),
        _ => None,
    };
    let mut body = serde_json::json!({
        "success": matches!(outcome, Outcome::Imported { .. }),
        "code": code,
        "result": outcome,
    });
    if query.debug {
        body["debug"] = serde_json::json!({
            "elapsed_ms": started.elapsed().as_millis() as u64,
            "http_status": status.as_u16(),
        });
    }
    Ok(HttpResponse::build(status).json(body))
}

/// Import an explicit list of appids with bounded concurrency
pub async fn import_batch(
    payload: web::Json<BatchImportRequest>,
    ctx: web::Data<AppCtx>,
) -> Result<HttpResponse> {
    let opts = BatchOptions {
        concurrency: payload.concurrency.unwrap_or(4),
        ..Default::default()
    };
    tracing::info!(
        requested = payload.appids.len(),
        concurrency = opts.concurrency,
        "batch import requested"
    );
    let report = batch::run_ids(&ctx.importer, &payload.appids, &opts).await;
    Ok(HttpResponse::Ok().json(ApiResponse::success(report)))
}

/// Import one page of the account's owned-games list
pub async fn import_owned(
    payload: web::Json<OwnedImportRequest>,
    ctx: web::Data<AppCtx>,
) -> Result<HttpResponse> {
    // Request-level credentials always win over env defaults.
    let Some(api_key) = payload.api_key.clone().or_else(|| env_opt("STEAM_API_KEY")) else {
        return Ok(HttpResponse::BadRequest().json(ApiResponse::<()>::error(
            "missing api_key (request field or STEAM_API_KEY)",
        )));
    };
    let Some(steam_id) = payload.steam_id.clone().or_else(|| env_opt("STEAM_USER_ID")) else {
        return Ok(HttpResponse::BadRequest().json(ApiResponse::<()>::error(
            "missing steam_id (request field or STEAM_USER_ID)",
        )));
    };

    let opts = BatchOptions {
        offset: payload.offset.unwrap_or(0),
        limit: payload.limit.unwrap_or(25),
        concurrency: payload.concurrency.unwrap_or(4),
        group_delay_ms: payload.group_delay_ms.unwrap_or(0),
        backoff_delay_ms: payload.backoff_delay_ms.unwrap_or(10_000),
        verbose: payload.verbose,
    };
    tracing::info!(
        offset = opts.offset,
        limit = opts.limit,
        concurrency = opts.concurrency,
        "owned-list import page requested"
    );

    match batch::run_page(&ctx.importer, &api_key, &steam_id, &opts).await {
        Ok(page) => Ok(HttpResponse::Ok().json(ApiResponse::success(page))),
        // Page-level prerequisite failed; per-item failures never land here.
        Err(err) => Ok(HttpResponse::BadGateway().json(ApiResponse::<()>::error(format!("{err:#}")))),
    }
}

/// Paged catalog listing with optional tag/platform filter
pub async fn list_games(
    query: web::Query<GamesListQuery>,
    ctx: web::Data<AppCtx>,
) -> Result<HttpResponse> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(24);
    match catalog::list_games(
        &ctx.db,
        page,
        per_page,
        query.tag.as_deref(),
        query.platform.as_deref(),
    )
    .await
    {
        Ok((games, total)) => Ok(HttpResponse::Ok().json(ApiResponse::success(GamesListResponse {
            games,
            total,
            page,
            per_page,
        }))),
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "catalog listing failed");
            Ok(HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("catalog listing failed")))
        }
    }
}

/// Catalog detail by slug
pub async fn get_game(path: web::Path<String>, ctx: web::Data<AppCtx>) -> Result<HttpResponse> {
    let slug = path.into_inner();
    match catalog::get_game_by_slug(&ctx.db, &slug).await {
        Ok(Some(detail)) => Ok(HttpResponse::Ok().json(ApiResponse::success(detail))),
        Ok(None) => Ok(HttpResponse::NotFound().json(ApiResponse::<()>::error("game not found"))),
        Err(err) => {
            tracing::error!(slug = %slug, error = %format!("{err:#}"), "catalog detail failed");
            Ok(HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("catalog detail failed")))
        }
    }
}
