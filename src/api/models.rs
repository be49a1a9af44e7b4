// API request/response models (DTOs)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(Meta::now()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            meta: Some(Meta::now()),
        }
    }
}

/// Metadata included in all API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub version: String,
}

impl Meta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: uuid::Uuid::new_v4().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub uptime_seconds: u64,
}

/// Single-app import: optional debug flag via query string
#[derive(Debug, Default, Deserialize)]
pub struct ImportAppQuery {
    #[serde(default)]
    pub debug: bool,
}

/// Explicit-id-list batch import request
#[derive(Debug, Deserialize)]
pub struct BatchImportRequest {
    pub appids: Vec<i64>,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

/// Paged owned-list import request. Credentials may be omitted when the
/// server carries env defaults; request values always win.
#[derive(Debug, Deserialize)]
pub struct OwnedImportRequest {
    #[serde(default)]
    pub steam_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub group_delay_ms: Option<u64>,
    #[serde(default)]
    pub backoff_delay_ms: Option<u64>,
    #[serde(default)]
    pub verbose: bool,
}

/// Catalog list query
#[derive(Debug, Deserialize)]
pub struct GamesListQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub per_page: Option<i64>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

/// Paged catalog listing envelope
#[derive(Debug, Serialize)]
pub struct GamesListResponse<T> {
    pub games: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}
