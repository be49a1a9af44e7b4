//! Batch runner: windows the owned list, fans out bounded-concurrency
//! groups of single-item imports, applies the adaptive backoff policy, and
//! aggregates a resumable page-level report.

use futures::future::join_all;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

use crate::database_ops::steam::import::{Importer, Outcome, SkipReason};

/// Hard cap on in-flight imports per group; protects both upstream and us.
pub const MAX_CONCURRENCY: usize = 10;

/// Group failure ratio at or above which the adaptive backoff kicks in.
/// A tunable policy constant, not a load-bearing invariant.
pub const BACKOFF_TRIGGER_RATIO: f64 = 0.5;

/// Upper bound on debug samples retained per skip-reason category.
const MAX_DEBUG_SAMPLES: usize = 8;

pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(1, MAX_CONCURRENCY)
}

/// Backoff decision for one settled group. `NoDetailAvailable` is what the
/// upstream emits in bursts when it starts rate-limiting, so its share of
/// the group is the back-pressure signal.
pub fn should_back_off(no_detail_count: usize, group_len: usize) -> bool {
    group_len > 0 && (no_detail_count as f64) / (group_len as f64) >= BACKOFF_TRIGGER_RATIO
}

/// Clamped `[offset, offset+limit)` slice bounds over the eligible list.
pub fn window_bounds(len: usize, offset: usize, limit: usize) -> (usize, usize) {
    let start = offset.min(len);
    let end = offset.saturating_add(limit).min(len);
    (start, end)
}

/// The cursor always advances by the full limit (not by processed count) so
/// a short last page still makes forward progress.
pub fn next_cursor(offset: usize, limit: usize, eligible_len: usize) -> (usize, bool) {
    let next_offset = offset.saturating_add(limit);
    (next_offset, next_offset < eligible_len)
}

#[derive(Debug, Clone, Serialize)]
pub struct SkipEntry {
    pub appid: i64,
    pub reason: SkipReason,
    pub code: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub appid: i64,
    pub message: String,
    pub http_status: Option<u16>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SkipBreakdown {
    pub already_imported: usize,
    pub no_detail_available: usize,
    pub denylisted: usize,
    pub other: usize,
}

impl SkipBreakdown {
    fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::AlreadyImported => self.already_imported += 1,
            SkipReason::NoDetailAvailable => self.no_detail_available += 1,
            SkipReason::Denylisted => self.denylisted += 1,
            SkipReason::Other => self.other += 1,
        }
    }
}

/// Aggregate of every per-item outcome across the processed groups.
#[derive(Debug, Default, Serialize)]
struct Accumulator {
    imported: Vec<i64>,
    skipped: Vec<SkipEntry>,
    errors: Vec<ErrorEntry>,
    skip_breakdown: SkipBreakdown,
    backoff_groups: usize,
    debug_samples: HashMap<&'static str, Vec<i64>>,
}

impl Accumulator {
    fn record(&mut self, outcome: Outcome, verbose: bool) {
        match outcome {
            Outcome::Imported { appid, .. } => self.imported.push(appid),
            Outcome::Skipped {
                appid,
                reason,
                code,
            } => {
                self.skip_breakdown.record(reason);
                if verbose {
                    let bucket = self.debug_samples.entry(code).or_default();
                    if bucket.len() < MAX_DEBUG_SAMPLES {
                        bucket.push(appid);
                    }
                }
                self.skipped.push(SkipEntry {
                    appid,
                    reason,
                    code,
                });
            }
            Outcome::Errored {
                appid,
                message,
                http_status,
            } => self.errors.push(ErrorEntry {
                appid,
                message,
                http_status,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub offset: usize,
    pub limit: usize,
    pub concurrency: usize,
    pub group_delay_ms: u64,
    pub backoff_delay_ms: u64,
    pub verbose: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 25,
            concurrency: 4,
            group_delay_ms: 0,
            backoff_delay_ms: 10_000,
            verbose: false,
        }
    }
}

/// Result of one paged owned-list import call.
#[derive(Debug, Serialize)]
pub struct PageResult {
    pub total_owned: usize,
    pub eligible_owned: usize,
    pub denylisted_count: usize,
    pub offset: usize,
    pub limit: usize,
    pub processed: usize,
    pub imported_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    pub imported: Vec<i64>,
    pub skipped: Vec<SkipEntry>,
    pub errors: Vec<ErrorEntry>,
    pub skip_breakdown: SkipBreakdown,
    pub backoff_groups: usize,
    pub next_offset: usize,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_samples: Option<HashMap<&'static str, Vec<i64>>>,
}

/// Result of an explicit-id-list batch call.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub requested: usize,
    pub processed: usize,
    pub imported_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    pub imported: Vec<i64>,
    pub skipped: Vec<SkipEntry>,
    pub errors: Vec<ErrorEntry>,
    pub skip_breakdown: SkipBreakdown,
}

/// Run consecutive concurrency-sized groups over `ids`, strictly in
/// sequence: a group's imports all settle (and any backoff/delay elapses)
/// before the next group starts, and the aggregate is only updated with a
/// whole group at a time.
async fn import_groups(importer: &Importer, ids: &[i64], opts: &BatchOptions) -> Accumulator {
    let concurrency = clamp_concurrency(opts.concurrency);
    let mut acc = Accumulator::default();

    for (group_idx, group) in ids.chunks(concurrency).enumerate() {
        let outcomes = join_all(group.iter().map(|appid| importer.import_one(*appid))).await;

        let no_detail_count = outcomes
            .iter()
            .filter(|o| o.skip_reason() == Some(SkipReason::NoDetailAvailable))
            .count();
        let group_len = outcomes.len();
        for outcome in outcomes {
            acc.record(outcome, opts.verbose);
        }

        if should_back_off(no_detail_count, group_len) {
            acc.backoff_groups += 1;
            let jitter = rand::thread_rng().gen_range(0..500);
            warn!(
                group = group_idx,
                no_detail_count,
                group_len,
                backoff_ms = opts.backoff_delay_ms + jitter,
                "group failure ratio at threshold; backing off before next group"
            );
            tokio::time::sleep(Duration::from_millis(opts.backoff_delay_ms + jitter)).await;
        } else if opts.group_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(opts.group_delay_ms)).await;
        }
    }
    acc
}

/// Import an explicit appid list (the batch-by-id endpoint).
pub async fn run_ids(importer: &Importer, ids: &[i64], opts: &BatchOptions) -> BatchReport {
    let acc = import_groups(importer, ids, opts).await;
    BatchReport {
        requested: ids.len(),
        processed: acc.imported.len() + acc.skipped.len() + acc.errors.len(),
        imported_count: acc.imported.len(),
        skipped_count: acc.skipped.len(),
        error_count: acc.errors.len(),
        imported: acc.imported,
        skipped: acc.skipped,
        errors: acc.errors,
        skip_breakdown: acc.skip_breakdown,
    }
}

/// Import one `[offset, offset+limit)` window of the account's owned list.
///
/// Only page-level prerequisites (the owned-list fetch itself) can fail;
/// per-item failures are classified into the result, never propagated.
pub async fn run_page(
    importer: &Importer,
    api_key: &str,
    steam_id: &str,
    opts: &BatchOptions,
) -> anyhow::Result<PageResult> {
    let owned = importer
        .client()
        .fetch_owned_games(api_key, steam_id)
        .await
        .map_err(|err| anyhow::anyhow!("owned-games fetch failed: {err}"))?;
    let total_owned = owned.len();

    let eligible: Vec<i64> = owned
        .iter()
        .map(|g| g.appid)
        .filter(|appid| !importer.denylist().contains_appid(*appid))
        .collect();
    let eligible_owned = eligible.len();
    let denylisted_count = total_owned - eligible_owned;

    let (start, end) = window_bounds(eligible_owned, opts.offset, opts.limit);
    let page_ids = &eligible[start..end];
    info!(
        total_owned,
        eligible_owned,
        denylisted_count,
        offset = opts.offset,
        limit = opts.limit,
        page_len = page_ids.len(),
        "owned-list import page starting"
    );

    let acc = import_groups(importer, page_ids, opts).await;
    let (next_offset, has_more) = next_cursor(opts.offset, opts.limit, eligible_owned);

    Ok(PageResult {
        total_owned,
        eligible_owned,
        denylisted_count,
        offset: opts.offset,
        limit: opts.limit,
        processed: page_ids.len(),
        imported_count: acc.imported.len(),
        skipped_count: acc.skipped.len(),
        error_count: acc.errors.len(),
        imported: acc.imported,
        skipped: acc.skipped,
        errors: acc.errors,
        skip_breakdown: acc.skip_breakdown,
        backoff_groups: acc.backoff_groups,
        next_offset,
        has_more,
        debug_samples: opts.verbose.then_some(acc.debug_samples),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_is_clamped_to_policy_bounds() {
        assert_eq!(clamp_concurrency(0), 1);
        assert_eq!(clamp_concurrency(4), 4);
        assert_eq!(clamp_concurrency(64), MAX_CONCURRENCY);
    }

    #[test]
    fn backoff_triggers_at_half_the_group() {
        assert!(should_back_off(2, 4));
        assert!(should_back_off(3, 4));
        assert!(!should_back_off(1, 4));
        assert!(!should_back_off(0, 4));
        assert!(!should_back_off(0, 0));
        // Odd group sizes round in favor of backing off.
        assert!(should_back_off(2, 3));
    }

    #[test]
    fn window_bounds_clamp_to_list_length() {
        assert_eq!(window_bounds(10, 0, 4), (0, 4));
        assert_eq!(window_bounds(10, 8, 4), (8, 10));
        assert_eq!(window_bounds(10, 12, 4), (10, 10));
        assert_eq!(window_bounds(0, 0, 4), (0, 0));
    }

    #[test]
    fn cursor_advances_by_limit_and_terminates() {
        // Walking offset = 0, L, 2L, ... covers the whole list with no gaps
        // and reports has_more = false exactly once offset + L >= N.
        let n = 10;
        let limit = 4;
        let mut offset = 0;
        let mut covered = Vec::new();
        loop {
            let (start, end) = window_bounds(n, offset, limit);
            covered.extend(start..end);
            let (next, more) = next_cursor(offset, limit, n);
            if !more {
                assert!(next >= n);
                break;
            }
            offset = next;
        }
        assert_eq!(covered, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn short_last_page_still_makes_progress() {
        let (next, more) = next_cursor(8, 4, 10);
        assert_eq!(next, 12);
        assert!(!more);
    }

    #[test]
    fn breakdown_counts_by_reason() {
        let mut b = SkipBreakdown::default();
        b.record(SkipReason::NoDetailAvailable);
        b.record(SkipReason::NoDetailAvailable);
        b.record(SkipReason::Denylisted);
        assert_eq!(b.no_detail_available, 2);
        assert_eq!(b.denylisted, 1);
        assert_eq!(b.already_imported, 0);
    }
}
