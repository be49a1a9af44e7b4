//! HTTP client for the Steam storefront and account APIs: owned-games list,
//! per-app detail payloads, and the best-effort review summary.

use rand::Rng;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::database_ops::steam::envelope::unwrap_envelope;
use crate::normalization::game::ReviewSummary;
use crate::util::env::env_parse;

const APPDETAILS_URL: &str = "https://store.steampowered.com/api/appdetails";
const APPREVIEWS_URL: &str = "https://store.steampowered.com/appreviews";
const OWNED_GAMES_URL: &str =
    "https://api.steampowered.com/IPlayerService/GetOwnedGames/v1/";

/// Field filter used on the cheap attempts; the full payload is only pulled
/// when the filtered request comes back empty.
const DETAIL_FILTERS: &str =
    "basic,developers,publishers,genres,categories,release_date,metacritic,screenshots";

/// Failure of a single logical request after local retries.
#[derive(Debug, Clone)]
pub enum FetchError {
    /// Upstream answered with a non-2xx status.
    Status(u16),
    /// Connection/timeout-level failure.
    Network(String),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status(code) => Some(*code),
            FetchError::Network(_) => None,
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Status(code) => write!(f, "upstream returned HTTP {code}"),
            FetchError::Network(msg) => write!(f, "network failure: {msg}"),
        }
    }
}

/// Outcome of the detail fetch: `success=false` covers every "upstream had
/// nothing for this id" condition and is never an error.
#[derive(Debug, Clone)]
pub struct DetailResult {
    pub success: bool,
    pub data: Option<Value>,
}

impl DetailResult {
    fn unavailable() -> Self {
        Self {
            success: false,
            data: None,
        }
    }
}

/// One entry of the normalized owned-games list.
#[derive(Debug, Clone, Serialize)]
pub struct OwnedGame {
    pub appid: i64,
    pub playtime_minutes: Option<i64>,
    pub last_played_epoch: Option<i64>,
}

/// Per-attempt request variation for the detail ladder: filtered vs full
/// field set, bare vs age-gate-acknowledged identity.
#[derive(Debug, Clone, Copy)]
struct DetailAttempt {
    filtered: bool,
    mature_cookie: bool,
    /// The last attempt waits noticeably longer before firing.
    long_delay: bool,
}

const DETAIL_ATTEMPTS: &[DetailAttempt] = &[
    DetailAttempt {
        filtered: true,
        mature_cookie: false,
        long_delay: false,
    },
    DetailAttempt {
        filtered: false,
        mature_cookie: false,
        long_delay: false,
    },
    DetailAttempt {
        filtered: false,
        mature_cookie: true,
        long_delay: false,
    },
    DetailAttempt {
        filtered: true,
        mature_cookie: true,
        long_delay: true,
    },
];

#[derive(Clone)]
pub struct SteamClient {
    http: Client,
    country: String,
    language: String,
}

impl SteamClient {
    pub fn new() -> Self {
        let timeout_secs: u64 = env_parse("STEAM_HTTP_TIMEOUT_SECS", 15u64);
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            country: env_parse("STEAM_COUNTRY", "us".to_string()),
            language: env_parse("STEAM_LANGUAGE", "en".to_string()),
        }
    }

    /// GET + JSON with local retries: up to 3 attempts, base delay doubling,
    /// retried only for 5xx and network-level failures. 4xx is returned
    /// immediately as a classifiable outcome. A 2xx body that is not JSON
    /// resolves to `Value::Null` rather than an error.
    async fn get_json_with_retry(
        &self,
        url: &str,
        query: &[(&str, &str)],
        cookie: Option<&str>,
    ) -> Result<Value, FetchError> {
        let max_attempts: u32 = 3;
        let base_ms: u64 = env_parse("STEAM_RETRY_BASE_MS", 400u64);
        let mut last_err = FetchError::Network("no attempt made".into());
        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = base_ms * (1u64 << (attempt - 1));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            let mut req = self.http.get(url).header("Accept", "application/json");
            if !query.is_empty() {
                req = req.query(&query);
            }
            if let Some(cookie) = cookie {
                req = req.header("Cookie", cookie);
            }
            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.json::<Value>().await.unwrap_or(Value::Null));
                    }
                    if status.is_server_error() {
                        last_err = FetchError::Status(status.as_u16());
                        continue;
                    }
                    // 4xx: immediately classifiable, never retried.
                    return Err(FetchError::Status(status.as_u16()));
                }
                Err(err) => {
                    last_err = FetchError::Network(err.to_string());
                    continue;
                }
            }
        }
        Err(last_err)
    }

    /// Detail fetch with the anti-automation ladder: each attempt varies the
    /// field filter and request identity, separated by short randomized
    /// delays, with one final longer-delayed attempt. A 403 here is the
    /// upstream's age-gate/anti-bot signal, not a permanent failure, so it
    /// advances the ladder instead of aborting.
    pub async fn fetch_appdetails(&self, appid: i64) -> Result<DetailResult, FetchError> {
        let appid_str = appid.to_string();
        let mut last_transient: Option<FetchError> = None;
        let mut saw_unavailable = false;

        for (idx, attempt) in DETAIL_ATTEMPTS.iter().enumerate() {
            if idx > 0 {
                let ms = if attempt.long_delay {
                    2_000 + rand::thread_rng().gen_range(0..1_000)
                } else {
                    300 + rand::thread_rng().gen_range(0..500)
                };
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            let mut query: Vec<(&str, &str)> = vec![
                ("appids", appid_str.as_str()),
                ("cc", self.country.as_str()),
                ("l", self.language.as_str()),
            ];
            if attempt.filtered {
                query.push(("filters", DETAIL_FILTERS));
            }
            let cookie = attempt
                .mature_cookie
                .then_some("birthtime=0; mature_content=1; wants_mature_content=1");

            match self.get_json_with_retry(APPDETAILS_URL, &query, cookie).await {
                Ok(body) => {
                    let unwrapped = unwrap_envelope(appid, &body);
                    if unwrapped.success {
                        return Ok(DetailResult {
                            success: true,
                            data: unwrapped.data,
                        });
                    }
                    // Envelope said "nothing here"; retrying with a different
                    // identity occasionally shakes loose age-gated apps.
                    saw_unavailable = true;
                    debug!(appid, attempt = idx, shape = ?unwrapped.shape, "appdetails attempt returned no payload");
                }
                Err(FetchError::Status(403)) => {
                    saw_unavailable = true;
                    debug!(appid, attempt = idx, "appdetails 403 (anti-automation); varying request identity");
                }
                Err(FetchError::Status(code)) if (400..500).contains(&code) => {
                    // Any other 4xx is a definitive "no data" for this id.
                    return Ok(DetailResult::unavailable());
                }
                Err(err) => {
                    warn!(appid, attempt = idx, error = %err, "appdetails attempt failed");
                    last_transient = Some(err);
                }
            }
        }
        if saw_unavailable {
            return Ok(DetailResult::unavailable());
        }
        match last_transient {
            Some(err) => Err(err),
            None => Ok(DetailResult::unavailable()),
        }
    }

    /// Best-effort review aggregate; its absence never blocks an import.
    pub async fn fetch_review_summary(&self, appid: i64) -> Option<ReviewSummary> {
        let url = format!("{APPREVIEWS_URL}/{appid}");
        let query = [
            ("json", "1"),
            ("language", "all"),
            ("purchase_type", "all"),
            ("num_per_page", "0"),
        ];
        let body = match self.get_json_with_retry(&url, &query, None).await {
            Ok(body) => body,
            Err(err) => {
                debug!(appid, error = %err, "review summary fetch failed; continuing without");
                return None;
            }
        };
        let summary = body.get("query_summary")?;
        Some(ReviewSummary {
            score_label: summary
                .get("review_score_desc")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            total_reviews: summary
                .get("total_reviews")
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
            total_positive: summary
                .get("total_positive")
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
        })
    }

    /// Full owned-games list for an account. Private/empty profiles come
    /// back as an empty `response` object and normalize to an empty list,
    /// never an error. Entries may be bare numeric ids or objects.
    pub async fn fetch_owned_games(
        &self,
        api_key: &str,
        steam_id: &str,
    ) -> Result<Vec<OwnedGame>, FetchError> {
        let query = [
            ("key", api_key),
            ("steamid", steam_id),
            ("include_appinfo", "0"),
            ("include_played_free_games", "1"),
            ("format", "json"),
        ];
        let body = self.get_json_with_retry(OWNED_GAMES_URL, &query, None).await?;
        let games = body
            .get("response")
            .and_then(|r| r.get("games"))
            .and_then(|g| g.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(games.iter().filter_map(normalize_owned_entry).collect())
    }
}

impl Default for SteamClient {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_owned_entry(entry: &Value) -> Option<OwnedGame> {
    if let Some(appid) = entry.as_i64() {
        return Some(OwnedGame {
            appid,
            playtime_minutes: None,
            last_played_epoch: None,
        });
    }
    let appid = entry.get("appid").and_then(|v| v.as_i64())?;
    Some(OwnedGame {
        appid,
        playtime_minutes: entry.get("playtime_forever").and_then(|v| v.as_i64()),
        last_played_epoch: entry.get("rtime_last_played").and_then(|v| v.as_i64()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn owned_entry_accepts_bare_ids_and_objects() {
        let bare = normalize_owned_entry(&json!(440)).unwrap();
        assert_eq!(bare.appid, 440);
        assert!(bare.playtime_minutes.is_none());

        let obj = normalize_owned_entry(&json!({
            "appid": 620, "playtime_forever": 1200, "rtime_last_played": 1700000000i64
        }))
        .unwrap();
        assert_eq!(obj.appid, 620);
        assert_eq!(obj.playtime_minutes, Some(1200));
        assert_eq!(obj.last_played_epoch, Some(1_700_000_000));

        assert!(normalize_owned_entry(&json!({"name": "no id"})).is_none());
    }

    #[test]
    fn fetch_error_status_accessor() {
        assert_eq!(FetchError::Status(502).status(), Some(502));
        assert_eq!(FetchError::Network("reset".into()).status(), None);
    }
}
