//! Envelope shape detection for appdetails responses.
//!
//! The upstream has shipped at least three response shapes over the years:
//! a flat `{success, data}` object, the same object keyed by appid, and a
//! bare payload with no envelope at all. Detection is pure and ordered; the
//! first shape that yields something payload-like wins.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeShape {
    /// `{ "success": true, "data": {...} }`
    Flat,
    /// `{ "<appid>": { "success": true, "data": {...} } }`
    KeyedById,
    /// The payload object itself, no wrapper.
    Bare,
}

#[derive(Debug, Clone)]
pub struct Unwrapped {
    pub shape: EnvelopeShape,
    pub success: bool,
    pub data: Option<Value>,
}

impl Unwrapped {
    fn failed(shape: EnvelopeShape) -> Self {
        Self {
            shape,
            success: false,
            data: None,
        }
    }
}

/// Payload-likeness heuristic: a detail object carries a name, a short
/// description, or a release-date object. Anything else is noise.
pub fn looks_like_payload(v: &Value) -> bool {
    let Some(obj) = v.as_object() else {
        return false;
    };
    obj.get("name").map(|n| n.is_string()).unwrap_or(false)
        || obj
            .get("short_description")
            .map(|d| d.is_string())
            .unwrap_or(false)
        || obj
            .get("release_date")
            .map(|r| r.is_object())
            .unwrap_or(false)
}

fn unwrap_flat(entry: &Value) -> Option<Unwrapped> {
    let success = entry.get("success")?.as_bool()?;
    let data = entry.get("data").cloned().filter(|d| looks_like_payload(d));
    Some(Unwrapped {
        shape: EnvelopeShape::Flat,
        success: success && data.is_some(),
        data,
    })
}

/// Try each known shape in order and settle on the first that looks valid.
/// A body matching no shape reports `success=false` rather than an error;
/// the caller classifies that as "no detail available".
pub fn unwrap_envelope(appid: i64, body: &Value) -> Unwrapped {
    // Keyed-by-id is the most specific shape, so it is checked first.
    if let Some(entry) = body.get(appid.to_string()) {
        if let Some(mut unwrapped) = unwrap_flat(entry) {
            unwrapped.shape = EnvelopeShape::KeyedById;
            return unwrapped;
        }
        if looks_like_payload(entry) {
            return Unwrapped {
                shape: EnvelopeShape::KeyedById,
                success: true,
                data: Some(entry.clone()),
            };
        }
        return Unwrapped::failed(EnvelopeShape::KeyedById);
    }
    if body.get("success").is_some() {
        if let Some(unwrapped) = unwrap_flat(body) {
            return unwrapped;
        }
        return Unwrapped::failed(EnvelopeShape::Flat);
    }
    if looks_like_payload(body) {
        return Unwrapped {
            shape: EnvelopeShape::Bare,
            success: true,
            data: Some(body.clone()),
        };
    }
    Unwrapped::failed(EnvelopeShape::Bare)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keyed_by_id_shape_wins_when_present() {
        let body = json!({
            "440": {"success": true, "data": {"name": "Team Fortress 2"}}
        });
        let u = unwrap_envelope(440, &body);
        assert_eq!(u.shape, EnvelopeShape::KeyedById);
        assert!(u.success);
        assert_eq!(u.data.unwrap()["name"], "Team Fortress 2");
    }

    #[test]
    fn flat_shape_unwraps() {
        let body = json!({"success": true, "data": {"short_description": "x"}});
        let u = unwrap_envelope(1, &body);
        assert_eq!(u.shape, EnvelopeShape::Flat);
        assert!(u.success);
    }

    #[test]
    fn bare_payload_detected_by_heuristic() {
        let body = json!({"name": "Dota 2", "release_date": {"date": "2013"}});
        let u = unwrap_envelope(570, &body);
        assert_eq!(u.shape, EnvelopeShape::Bare);
        assert!(u.success);
    }

    #[test]
    fn success_false_envelope_is_not_a_payload() {
        let body = json!({"570": {"success": false}});
        let u = unwrap_envelope(570, &body);
        assert!(!u.success);
        assert!(u.data.is_none());
    }

    #[test]
    fn success_true_with_junk_data_still_fails() {
        let body = json!({"success": true, "data": {"totally": "unrelated"}});
        let u = unwrap_envelope(1, &body);
        assert!(!u.success);
        assert!(u.data.is_none());
    }

    #[test]
    fn unrecognized_bodies_settle_on_failure_not_panic() {
        for body in [json!(null), json!([1, 2, 3]), json!("nope"), json!({})] {
            let u = unwrap_envelope(99, &body);
            assert!(!u.success);
            assert!(u.data.is_none());
        }
    }
}
