//! Single-item import: fetch + normalize + upsert for one appid, with every
//! possible outcome classified into exactly one of imported/skipped/errored.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::database_ops::catalog::{self, is_unique_violation};
use crate::database_ops::db::Db;
use crate::database_ops::steam::client::{DetailResult, SteamClient};
use crate::database_ops::steam::denylist::Denylist;
use crate::normalization::game::{normalize_game, normalize_screenshots};
use crate::normalization::taxonomy::{extract_platform_names, extract_tag_names};

pub const CODE_NO_APPDETAILS: &str = "NO_APPDETAILS";
pub const CODE_DENYLISTED_APP: &str = "DENYLISTED_APP";
pub const CODE_DENYLISTED_SLUG: &str = "DENYLISTED_SLUG";
pub const CODE_DUPLICATE_APP: &str = "DUPLICATE_APP";
pub const CODE_SKIPPED: &str = "SKIPPED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyImported,
    NoDetailAvailable,
    Denylisted,
    Other,
}

impl SkipReason {
    pub fn default_code(self) -> &'static str {
        match self {
            SkipReason::AlreadyImported => CODE_DUPLICATE_APP,
            SkipReason::NoDetailAvailable => CODE_NO_APPDETAILS,
            SkipReason::Denylisted => CODE_DENYLISTED_APP,
            SkipReason::Other => CODE_SKIPPED,
        }
    }
}

/// Classified result of one import. Serializes with a `status` tag so the
/// HTTP layer can pass it through directly.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Imported {
        appid: i64,
        slug: String,
        created: bool,
    },
    Skipped {
        appid: i64,
        reason: SkipReason,
        code: &'static str,
    },
    Errored {
        appid: i64,
        message: String,
        http_status: Option<u16>,
    },
}

impl Outcome {
    fn skipped(appid: i64, reason: SkipReason, code: &'static str) -> Self {
        Outcome::Skipped {
            appid,
            reason,
            code,
        }
    }

    pub fn appid(&self) -> i64 {
        match self {
            Outcome::Imported { appid, .. }
            | Outcome::Skipped { appid, .. }
            | Outcome::Errored { appid, .. } => *appid,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Outcome::Skipped { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Status-code-first classification of an upstream/storage failure.
/// 404/422 mean the upstream had nothing; 409 is the duplicate race.
pub fn classify_status(status: u16) -> Option<SkipReason> {
    match status {
        404 | 422 => Some(SkipReason::NoDetailAvailable),
        409 => Some(SkipReason::AlreadyImported),
        _ => None,
    }
}

/// Fixed substring table used only when the status code is ambiguous.
/// Inherently fragile against upstream wording changes; keep it short and
/// in one place.
const SKIP_PHRASES: &[(&str, SkipReason)] = &[
    ("no_appdetails", SkipReason::NoDetailAvailable),
    ("returned no data", SkipReason::NoDetailAvailable),
    ("no usable payload", SkipReason::NoDetailAvailable),
    ("duplicate key", SkipReason::AlreadyImported),
    ("already imported", SkipReason::AlreadyImported),
];

pub fn classify_message(message: &str) -> Option<SkipReason> {
    let lower = message.to_ascii_lowercase();
    SKIP_PHRASES
        .iter()
        .find(|(phrase, _)| lower.contains(phrase))
        .map(|(_, reason)| *reason)
}

/// Composes the detail fetcher, normalizer and upsert writer for one appid.
/// Cheap to clone; the denylist is shared and immutable.
#[derive(Clone)]
pub struct Importer {
    db: Db,
    client: SteamClient,
    denylist: Arc<Denylist>,
}

impl Importer {
    pub fn new(db: Db, client: SteamClient, denylist: Arc<Denylist>) -> Self {
        Self {
            db,
            client,
            denylist,
        }
    }

    pub fn client(&self) -> &SteamClient {
        &self.client
    }

    pub fn denylist(&self) -> &Denylist {
        &self.denylist
    }

    /// Import exactly one appid. Never returns an error: every failure mode
    /// is folded into the outcome taxonomy so batch callers can aggregate
    /// without special cases.
    pub async fn import_one(&self, appid: i64) -> Outcome {
        // Denylist by id short-circuits before any network traffic.
        if self.denylist.contains_appid(appid) {
            return Outcome::skipped(appid, SkipReason::Denylisted, CODE_DENYLISTED_APP);
        }

        let detail = match self.client.fetch_appdetails(appid).await {
            Ok(detail) => detail,
            Err(err) => {
                if let Some(reason) = err.status().and_then(classify_status) {
                    return Outcome::skipped(appid, reason, reason.default_code());
                }
                warn!(appid, error = %err, "detail fetch exhausted retries");
                return Outcome::Errored {
                    appid,
                    message: err.to_string(),
                    http_status: err.status(),
                };
            }
        };
        let DetailResult { success, data } = detail;
        let Some(data) = data.filter(|_| success) else {
            return Outcome::skipped(appid, SkipReason::NoDetailAvailable, CODE_NO_APPDETAILS);
        };

        // Reviews are optional enrichment; absence never blocks the import.
        let review = self.client.fetch_review_summary(appid).await;

        let game = normalize_game(appid, &data, review.as_ref());
        // Second denylist gate: the slug only exists post-fetch.
        if self.denylist.contains_slug(&game.slug) {
            return Outcome::skipped(appid, SkipReason::Denylisted, CODE_DENYLISTED_SLUG);
        }

        let shots = normalize_screenshots(&data);
        let tag_names = extract_tag_names(&data);
        let platform_names = extract_platform_names(&data);

        let mut tag_ids = Vec::with_capacity(tag_names.len());
        for name in &tag_names {
            match catalog::ensure_tag(&self.db, name).await {
                Ok(id) => tag_ids.push(id),
                Err(err) => return self.storage_error(appid, err),
            }
        }
        let mut platform_ids = Vec::with_capacity(platform_names.len());
        for name in &platform_names {
            match catalog::ensure_platform(&self.db, name).await {
                Ok(id) => platform_ids.push(id),
                Err(err) => return self.storage_error(appid, err),
            }
        }

        match catalog::upsert_game_bundle(&self.db, &game, &shots, &tag_ids, &platform_ids).await {
            Ok(write) => {
                info!(appid, slug = %write.slug, created = write.created, "imported");
                Outcome::Imported {
                    appid,
                    slug: write.slug,
                    created: write.created,
                }
            }
            Err(err) => self.storage_error(appid, err),
        }
    }

    fn storage_error(&self, appid: i64, err: anyhow::Error) -> Outcome {
        if is_unique_violation(&err) {
            // Loser of a same-appid race; the row exists, so this is a skip.
            return Outcome::skipped(appid, SkipReason::AlreadyImported, CODE_DUPLICATE_APP);
        }
        let message = format!("{err:#}");
        if let Some(reason) = classify_message(&message) {
            return Outcome::skipped(appid, reason, reason.default_code());
        }
        warn!(appid, error = %message, "import failed");
        Outcome::Errored {
            appid,
            message,
            http_status: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_table() {
        assert_eq!(classify_status(404), Some(SkipReason::NoDetailAvailable));
        assert_eq!(classify_status(422), Some(SkipReason::NoDetailAvailable));
        assert_eq!(classify_status(409), Some(SkipReason::AlreadyImported));
        assert_eq!(classify_status(500), None);
        assert_eq!(classify_status(403), None);
        assert_eq!(classify_status(200), None);
    }

    #[test]
    fn message_fallback_is_case_insensitive_substring() {
        assert_eq!(
            classify_message("upstream said NO_APPDETAILS for this id"),
            Some(SkipReason::NoDetailAvailable)
        );
        assert_eq!(
            classify_message("query Returned No Data"),
            Some(SkipReason::NoDetailAvailable)
        );
        assert_eq!(
            classify_message("ERROR: duplicate key value violates unique constraint \"games_appid_key\""),
            Some(SkipReason::AlreadyImported)
        );
        assert_eq!(classify_message("connection reset by peer"), None);
    }

    #[test]
    fn skip_reasons_map_to_machine_codes() {
        assert_eq!(SkipReason::NoDetailAvailable.default_code(), CODE_NO_APPDETAILS);
        assert_eq!(SkipReason::AlreadyImported.default_code(), CODE_DUPLICATE_APP);
        assert_eq!(SkipReason::Denylisted.default_code(), CODE_DENYLISTED_APP);
    }

    #[test]
    fn outcome_accessors() {
        let o = Outcome::skipped(10, SkipReason::Denylisted, CODE_DENYLISTED_SLUG);
        assert_eq!(o.appid(), 10);
        assert_eq!(o.skip_reason(), Some(SkipReason::Denylisted));
        let e = Outcome::Errored {
            appid: 11,
            message: "boom".into(),
            http_status: Some(500),
        };
        assert_eq!(e.skip_reason(), None);
    }
}
