//! Canonical identifiers for graph nodes.
//!
//! Every identifier is a pure function of the entity kind and its natural key,
//! so independent derivations (a package event today, a CVE record tomorrow)
//! land on the same node.

use crate::vocab::EntityKind;
use uuid::Uuid;

const PART_SEPARATOR: char = '-';
const MISSING_PART: &str = "none";

/// Sanitizes one natural-key part: trims, lower-cases and replaces every
/// character outside `[A-Za-z0-9_.]` with `_`.
pub fn sanitize(part: &str) -> String {
    part.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// `identify(kind, parts)`: `<tag>-<part>-<part>...`.
///
/// Missing parts become the literal token `none`. [`sanitize`] never emits
/// the separator, so part boundaries stay apart; it does fold `-`, `+` and
/// `:` to `_`, so raw parts differing only in those characters share an id.
pub fn identify(kind: EntityKind, parts: &[Option<&str>]) -> String {
    let mut id = String::from(kind.tag());
    for part in parts {
        id.push(PART_SEPARATOR);
        match part {
            Some(value) => id.push_str(&sanitize(value)),
            None => id.push_str(MISSING_PART),
        }
    }
    id
}

/// Normalizes an externally assigned CVE identifier (`cve-2021-44228 ` becomes
/// `CVE-2021-44228`).
pub fn cve_id(raw: &str) -> String {
    raw.trim()
        .to_ascii_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

pub fn uuid_v5_u128(ns: Uuid, name: &str) -> u128 {
    Uuid::new_v5(&ns, name.as_bytes()).as_u128()
}

/// Stable content hash over `kind|key=value|...`.
pub fn stable_node_id_u128(entity_type: &str, key_values: &[(&str, String)]) -> u128 {
    let mut name = String::from(entity_type);
    for (k, v) in key_values {
        name.push('|');
        name.push_str(k);
        name.push('=');
        name.push_str(v);
    }
    uuid_v5_u128(Uuid::NAMESPACE_OID, &name)
}

/// Identifier of an event node, derived from its semantic content only.
pub fn event_id(kind: &str, key_values: &[(&str, String)]) -> String {
    let hash = Uuid::from_u128(stable_node_id_u128(kind, key_values));
    format!("{}{}{}", EntityKind::Event.tag(), PART_SEPARATOR, hash.simple())
}
