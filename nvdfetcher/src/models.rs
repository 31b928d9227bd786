//! NVD CVE API 2.0 payloads and the records derived from them.

use chrono::NaiveDateTime;
use factstore::interval::VersionSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::cpe::{CpeName, is_linux_cpe};

/// One page of `GET /rest/json/cves/2.0`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NvdPage {
    #[serde(default)]
    pub results_per_page: usize,
    #[serde(default)]
    pub start_index: usize,
    #[serde(default)]
    pub total_results: usize,
    #[serde(default)]
    pub vulnerabilities: Vec<NvdVulnerability>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NvdVulnerability {
    pub cve: NvdCve,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NvdCve {
    pub id: String,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub descriptions: Vec<LangString>,
    #[serde(default)]
    pub metrics: HashMap<String, Vec<NvdMetric>>,
    #[serde(default)]
    pub references: Vec<NvdReference>,
    #[serde(default)]
    pub configurations: Vec<NvdConfiguration>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LangString {
    pub lang: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NvdMetric {
    #[serde(default)]
    pub cvss_data: Option<CvssData>,
    /// CVSS v2 metrics carry the severity here rather than in `cvssData`.
    #[serde(default)]
    pub base_severity: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvssData {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub base_score: Option<f64>,
    #[serde(default)]
    pub base_severity: Option<String>,
    #[serde(default)]
    pub vector_string: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NvdReference {
    pub url: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NvdConfiguration {
    #[serde(default)]
    pub nodes: Vec<NvdNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NvdNode {
    #[serde(default)]
    pub cpe_match: Vec<NvdCpeMatch>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NvdCpeMatch {
    pub criteria: String,
    #[serde(default)]
    pub version_start_including: Option<String>,
    #[serde(default)]
    pub version_start_excluding: Option<String>,
    #[serde(default)]
    pub version_end_including: Option<String>,
    #[serde(default)]
    pub version_end_excluding: Option<String>,
}

/// Metric families in order of preference.
const METRIC_PRIORITY: [&str; 4] = ["cvssMetricV40", "cvssMetricV31", "cvssMetricV30", "cvssMetricV2"];

/// Severity fields; any of them may be missing in the feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Severity {
    pub cvss_version: Option<String>,
    pub base_score: Option<f64>,
    pub base_severity: Option<String>,
    pub vector: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceLink {
    pub source: String,
    pub url: String,
}

/// One (vendor, product, version constraint) the CVE applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affected {
    pub vendor: String,
    pub product: String,
    pub target_hw: Option<String>,
    pub spec: VersionSpec,
}

impl Affected {
    pub fn is_linux(&self) -> bool {
        is_linux_cpe(&self.vendor, &self.product, self.target_hw.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CveRecord {
    pub id: String,
    pub description: String,
    pub published: Option<NaiveDateTime>,
    pub severity: Severity,
    pub references: Vec<ReferenceLink>,
    pub affected: Vec<Affected>,
}

impl CveRecord {
    pub fn affects_linux(&self) -> bool {
        self.affected.iter().any(Affected::is_linux)
    }
}

fn parse_published(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

fn pick_description(descriptions: &[LangString]) -> String {
    descriptions
        .iter()
        .find(|d| d.lang == "en")
        .or_else(|| descriptions.first())
        .map(|d| d.value.clone())
        .unwrap_or_default()
}

fn pick_severity(metrics: &HashMap<String, Vec<NvdMetric>>) -> Severity {
    let Some(metric) = METRIC_PRIORITY
        .iter()
        .find_map(|key| metrics.get(*key).and_then(|list| list.first()))
    else {
        return Severity::default();
    };
    let data = metric.cvss_data.as_ref();
    Severity {
        cvss_version: data.and_then(|d| d.version.clone()),
        base_score: data.and_then(|d| d.base_score),
        base_severity: data
            .and_then(|d| d.base_severity.clone())
            .or_else(|| metric.base_severity.clone()),
        vector: data.and_then(|d| d.vector_string.clone()),
    }
}

impl From<NvdCve> for CveRecord {
    fn from(cve: NvdCve) -> Self {
        let mut affected = Vec::new();
        for node in cve.configurations.iter().flat_map(|c| c.nodes.iter()) {
            for cpe_match in &node.cpe_match {
                let Some(name) = CpeName::parse(&cpe_match.criteria) else {
                    log::debug!("{}: skipping malformed CPE {}", cve.id, cpe_match.criteria);
                    continue;
                };
                let spec = VersionSpec::from_cpe(
                    Some(name.version.as_str()),
                    cpe_match.version_start_including.as_deref(),
                    cpe_match.version_start_excluding.as_deref(),
                    cpe_match.version_end_including.as_deref(),
                    cpe_match.version_end_excluding.as_deref(),
                );
                affected.push(Affected {
                    vendor: name.vendor,
                    product: name.product,
                    target_hw: name.target_hw,
                    spec,
                });
            }
        }

        CveRecord {
            description: pick_description(&cve.descriptions),
            published: cve.published.as_deref().and_then(parse_published),
            severity: pick_severity(&cve.metrics),
            references: cve
                .references
                .iter()
                .map(|r| ReferenceLink {
                    source: r.source.clone().unwrap_or_else(|| "unknown_source".to_string()),
                    url: r.url.clone(),
                })
                .collect(),
            affected,
            id: cve.id,
        }
    }
}
