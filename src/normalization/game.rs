//! Pure mapping from raw appdetails payloads (and the optional review
//! summary) into the catalog entity's field set. No I/O; any missing
//! optional field resolves to None/empty, never an error.

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// Aggregate review numbers from the appreviews query summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub score_label: Option<String>,
    pub total_reviews: i64,
    pub total_positive: i64,
}

/// Catalog entity fields produced by normalization, ready for the upsert
/// writer. `slug` is only honored on create; re-imports never rewrite it.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedGame {
    pub appid: i64,
    pub title: String,
    pub slug: String,
    pub summary: Option<String>,
    pub header_image: Option<String>,
    pub hero_image: Option<String>,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub critic_score: Option<i32>,
    pub review_label: Option<String>,
    pub review_count: Option<i64>,
    pub review_percent: Option<i32>,
}

/// One ordered screenshot row; `sort_index` is the entry's position in the
/// upstream list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedScreenshot {
    pub image_url: String,
    pub thumbnail_url: Option<String>,
    pub sort_index: i32,
}

fn slugify(s: &str) -> String {
    s.to_lowercase()
        .replace(|c: char| !c.is_ascii_alphanumeric(), "-")
        .split('-')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Slug = slugified title + "-" + appid, so duplicate titles never collide.
pub fn slug_for(title: &str, appid: i64) -> String {
    let base = slugify(title);
    if base.is_empty() {
        format!("app-{appid}")
    } else {
        format!("{base}-{appid}")
    }
}

fn first_str(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn opt_str(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Best-effort release-date parse. Upstream dates are free text; try the
/// shapes we have actually observed, most specific first:
/// storefront-style ("21 Oct, 2015" / "Oct 21, 2015"), ISO, numeric M/D/Y,
/// then a bare 4-digit year pinned to Jan 1. Anything else is None.
pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for fmt in ["%e %b, %Y", "%b %e, %Y", "%Y-%m-%d", "%B %e, %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    static MDY: OnceLock<Regex> = OnceLock::new();
    let mdy = MDY.get_or_init(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").unwrap());
    if let Some(caps) = mdy.captures(raw) {
        let m: u32 = caps[1].parse().ok()?;
        let d: u32 = caps[2].parse().ok()?;
        let y: i32 = caps[3].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            return Some(date);
        }
    }
    static YEAR: OnceLock<Regex> = OnceLock::new();
    let year = YEAR.get_or_init(|| Regex::new(r"\b((?:19|20)\d{2})\b").unwrap());
    if let Some(caps) = year.captures(raw) {
        let y: i32 = caps[1].parse().ok()?;
        return NaiveDate::from_ymd_opt(y, 1, 1);
    }
    None
}

/// Percent-positive from the review summary; None when nothing was counted.
pub fn review_percent(summary: &ReviewSummary) -> Option<i32> {
    if summary.total_reviews > 0 {
        let pct = (summary.total_positive as f64) * 100.0 / (summary.total_reviews as f64);
        Some(pct.round() as i32)
    } else {
        None
    }
}

/// Map one raw detail payload (plus the optional review summary) to the
/// stored field set. The appid always comes from the caller, so a synthetic
/// `app-<id>` title covers payloads with no usable name.
pub fn normalize_game(appid: i64, data: &Value, review: Option<&ReviewSummary>) -> NormalizedGame {
    let title = opt_str(data, "name").unwrap_or_else(|| format!("app-{appid}"));
    let slug = slug_for(&title, appid);

    let release_date = data
        .get("release_date")
        .and_then(|rd| rd.get("date"))
        .and_then(|d| d.as_str())
        .and_then(parse_release_date);

    let critic_score = data
        .get("metacritic")
        .and_then(|m| m.get("score"))
        .and_then(|s| s.as_i64())
        .map(|s| s as i32);

    NormalizedGame {
        appid,
        title,
        slug,
        summary: opt_str(data, "short_description"),
        header_image: opt_str(data, "header_image"),
        hero_image: opt_str(data, "background_raw").or_else(|| opt_str(data, "background")),
        developer: first_str(data, "developers"),
        publisher: first_str(data, "publishers"),
        release_date,
        critic_score,
        review_label: review.and_then(|r| r.score_label.clone()),
        review_count: review.map(|r| r.total_reviews),
        review_percent: review.and_then(review_percent),
    }
}

/// Ordered screenshot list; entries with no usable URL are dropped but keep
/// their source position so ordering survives re-imports.
pub fn normalize_screenshots(data: &Value) -> Vec<NormalizedScreenshot> {
    let Some(entries) = data.get("screenshots").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        let full = entry
            .get("path_full")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let thumb = entry
            .get("path_thumbnail")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let Some(image_url) = full.or(thumb) else {
            continue;
        };
        out.push(NormalizedScreenshot {
            image_url: image_url.to_string(),
            thumbnail_url: thumb.map(|s| s.to_string()),
            sort_index: idx as i32,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slug_includes_appid_and_survives_empty_titles() {
        assert_eq!(slug_for("Half-Life 2", 220), "half-life-2-220");
        assert_eq!(slug_for("!!!", 440), "app-440");
        assert_eq!(slug_for("", 570), "app-570");
    }

    #[test]
    fn release_date_parse_ladder() {
        assert_eq!(
            parse_release_date("21 Oct, 2015"),
            NaiveDate::from_ymd_opt(2015, 10, 21)
        );
        assert_eq!(
            parse_release_date("Oct 21, 2015"),
            NaiveDate::from_ymd_opt(2015, 10, 21)
        );
        assert_eq!(
            parse_release_date("10/21/2015"),
            NaiveDate::from_ymd_opt(2015, 10, 21)
        );
        assert_eq!(
            parse_release_date("Coming 2024"),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(parse_release_date("Coming soon"), None);
        assert_eq!(parse_release_date(""), None);
    }

    #[test]
    fn review_percent_rounds_and_guards_zero_totals() {
        let s = ReviewSummary {
            score_label: Some("Very Positive".into()),
            total_reviews: 3,
            total_positive: 2,
        };
        assert_eq!(review_percent(&s), Some(67));
        let empty = ReviewSummary::default();
        assert_eq!(review_percent(&empty), None);
    }

    #[test]
    fn normalize_game_falls_back_to_synthetic_title() {
        let g = normalize_game(730, &json!({}), None);
        assert_eq!(g.title, "app-730");
        assert_eq!(g.slug, "app-730");
        assert!(g.summary.is_none());
        assert!(g.release_date.is_none());
    }

    #[test]
    fn normalize_game_maps_full_payload() {
        let data = json!({
            "name": "Portal 2",
            "short_description": "Sequel.",
            "header_image": "https://cdn.example/header.jpg",
            "background_raw": "https://cdn.example/bg_raw.jpg",
            "developers": ["Valve", "Secondary"],
            "publishers": ["Valve"],
            "release_date": {"coming_soon": false, "date": "18 Apr, 2011"},
            "metacritic": {"score": 95},
        });
        let review = ReviewSummary {
            score_label: Some("Overwhelmingly Positive".into()),
            total_reviews: 100,
            total_positive: 99,
        };
        let g = normalize_game(620, &data, Some(&review));
        assert_eq!(g.slug, "portal-2-620");
        assert_eq!(g.developer.as_deref(), Some("Valve"));
        assert_eq!(g.release_date, NaiveDate::from_ymd_opt(2011, 4, 18));
        assert_eq!(g.critic_score, Some(95));
        assert_eq!(g.review_percent, Some(99));
    }

    #[test]
    fn screenshots_drop_urlless_entries_but_keep_source_order() {
        let data = json!({
            "screenshots": [
                {"id": 0, "path_full": "https://cdn/a_full.jpg", "path_thumbnail": "https://cdn/a_t.jpg"},
                {"id": 1},
                {"id": 2, "path_thumbnail": "https://cdn/c_t.jpg"},
            ]
        });
        let shots = normalize_screenshots(&data);
        assert_eq!(shots.len(), 2);
        assert_eq!(shots[0].image_url, "https://cdn/a_full.jpg");
        assert_eq!(shots[0].sort_index, 0);
        assert_eq!(shots[1].image_url, "https://cdn/c_t.jpg");
        assert_eq!(shots[1].thumbnail_url.as_deref(), Some("https://cdn/c_t.jpg"));
        assert_eq!(shots[1].sort_index, 2);
    }

    #[test]
    fn screenshots_missing_list_is_empty() {
        assert!(normalize_screenshots(&json!({})).is_empty());
    }
}
