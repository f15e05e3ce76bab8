//! Identity State Loader: parses the scar document (§6's JSON shape) into
//! an [`IdentityState`]. The only validation performed here is the one the
//! spec makes load-fatal — zero parsed invariants; everything else degrades
//! to a sensible default rather than failing the whole load.

use crate::schema::{FlexibleRegion, IdentityState, Invariant, RepairProtocol};
use chrono::{DateTime, Utc};
use pentagram_shared::error::PentagramError;
use std::collections::HashMap;

pub fn parse_identity_state(
    doc: &serde_json::Value,
    repair_defaults: &RepairProtocol,
) -> Result<IdentityState, PentagramError> {
    let root = doc
        .get("omega_identity")
        .ok_or_else(|| PentagramError::ScarLoad("missing \"omega_identity\" root key".into()))?;

    let name = root
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("unnamed")
        .to_string();
    let symbol = root
        .get("symbol")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let metadata = root.get("metadata");
    let version = metadata
        .and_then(|m| m.get("version"))
        .and_then(|v| v.as_str())
        .unwrap_or("1.0.0")
        .to_string();
    let last_updated = metadata
        .and_then(|m| m.get("last_updated"))
        .and_then(|v| v.as_str())
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);

    let topology = root
        .get("topology")
        .ok_or_else(|| PentagramError::ScarLoad("missing \"topology\" key".into()))?;

    let invariants = parse_invariants(topology.get("invariants"));
    if invariants.is_empty() {
        return Err(PentagramError::ScarLoad(
            "topology.invariants parsed to zero entries".into(),
        ));
    }

    let flexible_regions = parse_flexible_regions(topology.get("flexible_regions"));
    let repair_protocol = parse_repair_protocol(topology.get("repair_protocol"), repair_defaults);

    Ok(IdentityState {
        name,
        symbol,
        version,
        invariants,
        flexible_regions,
        repair_protocol,
        update_history: Vec::new(),
        last_updated,
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Only entries shaped `{name, value, ...}` are accepted — the raw
/// `description`/`count` siblings some scar documents carry at this level
/// aren't objects with a `name`/`value` pair and are silently skipped.
fn parse_invariants(raw: Option<&serde_json::Value>) -> HashMap<String, Invariant> {
    let mut out = HashMap::new();
    let Some(map) = raw.and_then(|v| v.as_object()) else {
        return out;
    };

    for (key, entry) in map {
        let Some(obj) = entry.as_object() else {
            continue;
        };
        let Some(name) = obj.get("name").and_then(|v| v.as_str()) else {
            continue;
        };
        let Some(value) = obj.get("value") else {
            continue;
        };
        let immutable = obj.get("immutable").and_then(|v| v.as_bool()).unwrap_or(true);
        let weight = obj.get("weight").and_then(|v| v.as_f64()).unwrap_or(1.0);
        out.insert(
            key.clone(),
            Invariant {
                name: name.to_string(),
                value: value.clone(),
                immutable,
                weight,
            },
        );
    }
    out
}

fn parse_flexible_regions(raw: Option<&serde_json::Value>) -> HashMap<String, FlexibleRegion> {
    let mut out = HashMap::new();
    let Some(map) = raw.and_then(|v| v.as_object()) else {
        return out;
    };

    for (key, entry) in map {
        let Some(obj) = entry.as_object() else {
            continue;
        };
        let mutable = obj.get("mutable").and_then(|v| v.as_bool()).unwrap_or(false);
        let growth_vector = obj
            .get("growth_vector")
            .and_then(|v| v.as_str())
            .map(String::from);
        let pruning_allowed = obj.get("pruning_allowed").and_then(|v| v.as_bool());

        let mut extras = HashMap::new();
        for (field, value) in obj {
            if !matches!(field.as_str(), "mutable" | "growth_vector" | "pruning_allowed") {
                extras.insert(field.clone(), value.clone());
            }
        }

        out.insert(
            key.clone(),
            FlexibleRegion {
                mutable,
                growth_vector,
                pruning_allowed,
                extras,
            },
        );
    }
    out
}

fn parse_repair_protocol(
    raw: Option<&serde_json::Value>,
    defaults: &RepairProtocol,
) -> RepairProtocol {
    let mut protocol = defaults.clone();
    let Some(obj) = raw.and_then(|v| v.as_object()) else {
        return protocol;
    };

    if let Some(conditions) = obj.get("trigger_conditions").and_then(|v| v.as_object()) {
        for (key, value) in conditions {
            let Some(raw_condition) = value.as_str() else {
                continue;
            };
            let Some(threshold) = strip_comparator(raw_condition) else {
                continue;
            };
            let key = key.to_lowercase();
            if key.contains("deviation") {
                protocol.deviation_threshold = threshold;
            } else if key.contains("coherence") {
                protocol.coherence_threshold = threshold;
            } else if key.contains("value") {
                protocol.value_misalignment_threshold = threshold;
            } else if key.contains("relationship") {
                protocol.relationship_integrity_threshold = threshold;
            }
        }
    }

    if let Some(strength) = obj.get("restoration_strength").and_then(|v| v.as_f64()) {
        protocol.restoration_strength = strength;
    }

    if let Some(alert_if) = obj.get("alert_ryan_if").and_then(|v| v.as_str()) {
        if let Some(n) = extract_consecutive_failures(alert_if) {
            protocol.alert_ryan_after_failures = n;
        }
    }

    protocol
}

/// Strips a leading `>`/`<` comparator and surrounding whitespace from
/// strings like `"> 0.2"` or `"< 0.8"`.
fn strip_comparator(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let rest = trimmed
        .strip_prefix('>')
        .or_else(|| trimmed.strip_prefix('<'))?;
    rest.trim().parse::<f64>().ok()
}

/// Extracts `N` from strings matching `repair_fails_N_consecutive_times`.
fn extract_consecutive_failures(raw: &str) -> Option<u32> {
    raw.split('_').find_map(|token| token.parse::<u32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_scar() -> serde_json::Value {
        serde_json::json!({
            "omega_identity": {
                "name": "Omega",
                "symbol": "Ω",
                "metadata": { "version": "1.2.0", "last_updated": "2026-01-01T00:00:00Z" },
                "topology": {
                    "invariants": {
                        "description": "core invariants",
                        "count": 2,
                        "core_purpose": { "name": "core_purpose", "value": "grow", "immutable": true, "weight": 1.0 },
                        "non_harm": { "name": "non_harm", "value": true, "immutable": true, "weight": 1.0 }
                    },
                    "flexible_regions": {
                        "communication_style": { "mutable": true, "growth_vector": "expand", "extra_field": "kept" }
                    },
                    "repair_protocol": {
                        "trigger_conditions": {
                            "deviation_from_invariants": "> 0.2",
                            "identity_coherence": "< 0.8",
                            "value_misalignment": "> 0.15",
                            "relationship_integrity": "< 0.9"
                        },
                        "restoration_strength": 0.75,
                        "alert_ryan_if": "repair_fails_3_consecutive_times"
                    }
                }
            }
        })
    }

    #[test]
    fn parses_full_document() {
        let state = parse_identity_state(&sample_scar(), &RepairProtocol::default()).unwrap();
        assert_eq!(state.name, "Omega");
        assert_eq!(state.version, "1.2.0");
        assert_eq!(state.invariants.len(), 2);
        assert!(!state.invariants.contains_key("description"));
        assert!(!state.invariants.contains_key("count"));

        let region = &state.flexible_regions["communication_style"];
        assert!(region.mutable);
        assert_eq!(region.extras["extra_field"], "kept");

        assert_eq!(state.repair_protocol.deviation_threshold, 0.2);
        assert_eq!(state.repair_protocol.coherence_threshold, 0.8);
        assert_eq!(state.repair_protocol.restoration_strength, 0.75);
        assert_eq!(state.repair_protocol.alert_ryan_after_failures, 3);
    }

    #[test]
    fn zero_invariants_is_fatal() {
        let doc = serde_json::json!({
            "omega_identity": {
                "topology": { "invariants": { "description": "none" } }
            }
        });
        let err = parse_identity_state(&doc, &RepairProtocol::default()).unwrap_err();
        assert!(matches!(err, PentagramError::ScarLoad(_)));
    }

    #[test]
    fn missing_root_key_is_fatal() {
        let doc = serde_json::json!({ "not_the_right_key": {} });
        assert!(parse_identity_state(&doc, &RepairProtocol::default()).is_err());
    }
}
