//! Taxonomy term handling: the canonical comparison form used for dedup, and
//! extraction of tag/platform name lists from raw appdetails payloads.

use serde_json::Value;
use std::collections::HashSet;

/// Canonical comparison form for a term name: trim, lowercase, collapse
/// internal whitespace runs to a single space. Storage keeps the display
/// form; this form only decides equality.
pub fn canonicalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_space = false;
    for ch in name.trim().chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            for lc in ch.to_lowercase() {
                out.push(lc);
            }
            prev_space = false;
        }
    }
    out
}

/// Dedup display names case/whitespace-insensitively, keeping the first-seen
/// display form so upstream's inconsistent casing doesn't fragment the
/// vocabulary.
fn dedup_display_names(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for name in raw {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(canonicalize(trimmed)) {
            out.push(trimmed.to_string());
        }
    }
    out
}

/// Genre and category descriptions both become tags.
pub fn extract_tag_names(data: &Value) -> Vec<String> {
    let mut raw: Vec<String> = Vec::new();
    for key in ["genres", "categories"] {
        if let Some(arr) = data.get(key).and_then(|v| v.as_array()) {
            for entry in arr {
                if let Some(desc) = entry.get("description").and_then(|d| d.as_str()) {
                    raw.push(desc.to_string());
                }
            }
        }
    }
    dedup_display_names(raw)
}

/// Platform boolean flags map to canonical platform names.
pub fn extract_platform_names(data: &Value) -> Vec<String> {
    const FLAG_NAMES: &[(&str, &str)] = &[
        ("windows", "Windows"),
        ("mac", "macOS"),
        ("linux", "Linux"),
    ];
    let mut raw: Vec<String> = Vec::new();
    if let Some(platforms) = data.get("platforms").and_then(|v| v.as_object()) {
        for (flag, display) in FLAG_NAMES {
            if platforms
                .get(*flag)
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
            {
                raw.push((*display).to_string());
            }
        }
    }
    dedup_display_names(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalize_collapses_case_and_whitespace() {
        assert_eq!(canonicalize("Action"), "action");
        assert_eq!(canonicalize("  action "), "action");
        assert_eq!(canonicalize("Free  To\tPlay"), "free to play");
    }

    #[test]
    fn dedup_keeps_first_seen_display_form() {
        let out = dedup_display_names(vec![
            "Action".into(),
            "action ".into(),
            "RPG".into(),
            " rpg".into(),
        ]);
        assert_eq!(out, vec!["Action".to_string(), "RPG".to_string()]);
    }

    #[test]
    fn extract_tags_merges_genres_and_categories() {
        let data = json!({
            "genres": [{"id": "1", "description": "Action"}, {"id": "23", "description": "Indie"}],
            "categories": [{"id": 2, "description": "Single-player"}, {"id": 9, "description": "action"}],
        });
        assert_eq!(
            extract_tag_names(&data),
            vec!["Action", "Indie", "Single-player"]
        );
    }

    #[test]
    fn extract_tags_tolerates_missing_lists() {
        assert!(extract_tag_names(&json!({})).is_empty());
        assert!(extract_tag_names(&json!({"genres": "oops"})).is_empty());
    }

    #[test]
    fn extract_platforms_reads_boolean_flags() {
        let data = json!({"platforms": {"windows": true, "mac": false, "linux": true}});
        assert_eq!(extract_platform_names(&data), vec!["Windows", "Linux"]);
        assert!(extract_platform_names(&json!({})).is_empty());
    }
}
