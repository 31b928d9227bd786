use crate::ids::identify;
use crate::vocab::EntityKind;
use serde::Serialize;
use std::collections::BTreeMap;

/// Sentinel for an absent interval bound.
pub const OPEN: &str = "open";

/// Identifier of the shared "all versions" interval.
pub const ALL_VERSIONS_ID: &str = "version-all";

const WILDCARD: &str = "*";
const NOT_APPLICABLE: &str = "-";

/// A raw version constraint as found in a vulnerability record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    Exact(String),
    Bounded {
        start: Option<String>,
        end: Option<String>,
    },
    Any,
    NotApplicable,
}

impl VersionSpec {
    /// Builds a spec from a CPE version token and the four optional bounds of a
    /// CPE match. Inclusive bounds win over exclusive ones when both are given.
    pub fn from_cpe(
        version: Option<&str>,
        start_including: Option<&str>,
        start_excluding: Option<&str>,
        end_including: Option<&str>,
        end_excluding: Option<&str>,
    ) -> Self {
        let start = pick_bound(start_including, start_excluding);
        let end = pick_bound(end_including, end_excluding);
        let has_bounds = start.is_some() || end.is_some();

        match version.map(str::trim) {
            Some(v) if !v.is_empty() && v != WILDCARD && v != NOT_APPLICABLE => {
                VersionSpec::Exact(v.to_string())
            }
            _ if has_bounds => VersionSpec::Bounded { start, end },
            Some(WILDCARD) => VersionSpec::Any,
            _ => VersionSpec::NotApplicable,
        }
    }
}

fn pick_bound(including: Option<&str>, excluding: Option<&str>) -> Option<String> {
    including
        .or(excluding)
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
}

/// Canonical `{min, max}` interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInterval {
    pub id: String,
    pub min: String,
    pub max: String,
}

impl VersionInterval {
    fn bounded(min: &str, max: &str) -> Self {
        Self {
            id: identify(EntityKind::VersionInterval, &[Some(min), Some(max)]),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    pub fn all_versions() -> Self {
        Self {
            id: ALL_VERSIONS_ID.to_string(),
            min: OPEN.to_string(),
            max: OPEN.to_string(),
        }
    }

    pub fn is_all_versions(&self) -> bool {
        self.id == ALL_VERSIONS_ID
    }

    pub fn min_triple(&self) -> VersionTriple {
        VersionTriple::parse(&self.min)
    }

    pub fn max_triple(&self) -> VersionTriple {
        VersionTriple::parse(&self.max)
    }
}

/// Turns a spec into its canonical interval; `None` when the constraint says
/// nothing about versions (CPE `-` without bounds).
pub fn normalize(spec: &VersionSpec) -> Option<VersionInterval> {
    match spec {
        VersionSpec::Exact(v) => Some(VersionInterval::bounded(v, v)),
        VersionSpec::Bounded { start, end } if start.is_some() || end.is_some() => {
            Some(VersionInterval::bounded(
                start.as_deref().unwrap_or(OPEN),
                end.as_deref().unwrap_or(OPEN),
            ))
        }
        VersionSpec::Bounded { .. } | VersionSpec::Any => Some(VersionInterval::all_versions()),
        VersionSpec::NotApplicable => None,
    }
}

/// Lossy `major.minor.patch` decomposition, for display and ordering only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct VersionTriple {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl VersionTriple {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if matches!(raw, "*" | "-" | "none" | OPEN) {
            return Self::default();
        }
        let mut parts = raw.split('.').map(leading_number);
        Self {
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            patch: parts.next().unwrap_or(0),
        }
    }
}

fn leading_number(component: &str) -> u64 {
    let digits: String = component
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// Memoizes intervals by identifier within one derivation batch.
#[derive(Debug, Default)]
pub struct IntervalRegistry {
    seen: BTreeMap<String, VersionInterval>,
}

impl IntervalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes `spec` and returns the interval plus whether it is new to
    /// this registry.
    pub fn resolve(&mut self, spec: &VersionSpec) -> Option<(VersionInterval, bool)> {
        let interval = normalize(spec)?;
        if let Some(existing) = self.seen.get(&interval.id) {
            return Some((existing.clone(), false));
        }
        self.seen.insert(interval.id.clone(), interval.clone());
        Some((interval, true))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
