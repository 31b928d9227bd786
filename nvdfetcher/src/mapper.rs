//! CVE records to vulnerability facts.

use std::collections::BTreeSet;

use factstore::facts::{FactBatch, Literal, Resource};
use factstore::ids::{cve_id, identify};
use factstore::interval::IntervalRegistry;
use factstore::vocab::{Class, EntityKind, Predicate};

use crate::models::{Affected, CveRecord, ReferenceLink};

/// Written when the record has no CVSS score.
pub const MISSING_SCORE: f64 = -1.0;
/// Written for any other absent severity field.
pub const MISSING_TEXT: &str = "none";

const REFERENCE_NAME: &str = "source_url";

pub fn cve_node(raw_id: &str) -> Resource {
    Resource::entity(EntityKind::Cve, cve_id(raw_id))
}

pub fn vendor_node(vendor: &str) -> Resource {
    Resource::entity(EntityKind::Vendor, identify(EntityKind::Vendor, &[Some(vendor)]))
}

/// Shares its identity with the product node package facts link to.
pub fn product_node(product: &str) -> Resource {
    Resource::entity(EntityKind::Product, identify(EntityKind::Product, &[Some(product)]))
}

pub fn reference_node(reference: &ReferenceLink) -> Resource {
    Resource::entity(
        EntityKind::Reference,
        identify(
            EntityKind::Reference,
            &[Some(reference.source.as_str()), Some(reference.url.as_str())],
        ),
    )
}

/// Drops blank lines and trims the rest.
pub fn normalize_description(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn text_or_missing(value: Option<&String>) -> String {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(MISSING_TEXT)
        .to_string()
}

/// Translates one record. Intervals already present in `intervals` are
/// linked but not described again. Never retracts.
pub fn cve_to_facts(record: &CveRecord, intervals: &mut IntervalRegistry) -> FactBatch {
    let mut batch = FactBatch::new();
    let cve = cve_node(&record.id);
    let severity = &record.severity;

    batch
        .subject(cve.clone())
        .a(Class::Cve)
        .text(Predicate::Description, normalize_description(&record.description))
        .literal(
            Predicate::BaseScore,
            Literal::Decimal(
                severity
                    .base_score
                    .filter(|score| score.is_finite())
                    .unwrap_or(MISSING_SCORE),
            ),
        )
        .text(
            Predicate::BaseSeverity,
            text_or_missing(severity.base_severity.as_ref()),
        )
        .text(
            Predicate::CvssVersion,
            text_or_missing(severity.cvss_version.as_ref()),
        )
        .text(Predicate::CvssCode, text_or_missing(severity.vector.as_ref()));
    if let Some(published) = record.published {
        batch
            .subject(cve.clone())
            .literal(Predicate::Published, Literal::DateTime(published));
    }

    let mut seen_refs = BTreeSet::new();
    for reference in &record.references {
        if !seen_refs.insert((reference.source.as_str(), reference.url.as_str())) {
            continue;
        }
        let node = reference_node(reference);
        batch
            .subject(node.clone())
            .a(Class::Reference)
            .text(Predicate::Url, reference.url.clone())
            .text(Predicate::RefSource, reference.source.clone())
            .text(Predicate::RefName, REFERENCE_NAME);
        batch.subject(cve.clone()).link(Predicate::HasReferences, node);
    }

    for affected in &record.affected {
        affected_facts(&mut batch, &cve, affected, intervals);
    }

    batch
}

fn affected_facts(
    batch: &mut FactBatch,
    cve: &Resource,
    affected: &Affected,
    intervals: &mut IntervalRegistry,
) {
    let vendor = vendor_node(&affected.vendor);
    let product = product_node(&affected.product);

    batch
        .subject(vendor.clone())
        .a(Class::Vendor)
        .text(Predicate::VendorName, affected.vendor.clone())
        .link(Predicate::HasProduct, product.clone());
    batch
        .subject(product.clone())
        .a(Class::Product)
        .text(Predicate::ProductName, affected.product.clone())
        .link(Predicate::HasVendor, vendor);
    batch
        .subject(cve.clone())
        .link(Predicate::HasAffectedProduct, product.clone());

    let Some((interval, fresh)) = intervals.resolve(&affected.spec) else {
        return;
    };
    let node = Resource::entity(EntityKind::VersionInterval, interval.id.clone());
    if fresh {
        let min = interval.min_triple();
        let max = interval.max_triple();
        batch
            .subject(node.clone())
            .a(Class::VersionInterval)
            .text(Predicate::VersionMin, interval.min.clone())
            .text(Predicate::VersionMax, interval.max.clone())
            .integer(Predicate::MinMajor, min.major as i64)
            .integer(Predicate::MinMinor, min.minor as i64)
            .integer(Predicate::MinPatch, min.patch as i64)
            .integer(Predicate::MaxMajor, max.major as i64)
            .integer(Predicate::MaxMinor, max.minor as i64)
            .integer(Predicate::MaxPatch, max.patch as i64);
    }
    batch
        .subject(product)
        .link(Predicate::HasVersionInterval, node.clone());
    batch
        .subject(node)
        .link(Predicate::HasCveAffectingProduct, cve.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use factstore::facts::{Object, Triple};
    use factstore::interval::VersionSpec;

    fn record() -> CveRecord {
        CveRecord {
            id: "cve-2021-44228".into(),
            description: "  Apache Log4j2 JNDI features\n\n  do not protect against LDAP.  ".into(),
            published: None,
            severity: Severity {
                cvss_version: Some("3.1".into()),
                base_score: Some(10.0),
                base_severity: Some("CRITICAL".into()),
                vector: None,
            },
            references: vec![
                ReferenceLink {
                    source: "security@apache.org".into(),
                    url: "https://logging.apache.org/log4j/2.x/security.html".into(),
                },
                ReferenceLink {
                    source: "security@apache.org".into(),
                    url: "https://logging.apache.org/log4j/2.x/security.html".into(),
                },
            ],
            affected: vec![
                Affected {
                    vendor: "apache".into(),
                    product: "log4j".into(),
                    target_hw: None,
                    spec: VersionSpec::Bounded {
                        start: Some("2.0.1".into()),
                        end: Some("2.12.2".into()),
                    },
                },
                Affected {
                    vendor: "debian".into(),
                    product: "debian_linux".into(),
                    target_hw: None,
                    spec: VersionSpec::Any,
                },
                Affected {
                    vendor: "fedoraproject".into(),
                    product: "fedora".into(),
                    target_hw: None,
                    spec: VersionSpec::Any,
                },
            ],
        }
    }

    fn objects<'a>(batch: &'a FactBatch, subject: &Resource, predicate: Predicate) -> Vec<&'a Object> {
        batch
            .assert
            .iter()
            .filter(|t: &&Triple| &t.subject == subject && t.predicate == predicate)
            .map(|t| &t.object)
            .collect()
    }

    #[test]
    fn cve_node_carries_severity_and_sentinels() {
        let mut intervals = IntervalRegistry::new();
        let batch = cve_to_facts(&record(), &mut intervals);
        let cve = cve_node("CVE-2021-44228");

        assert!(batch.retract.is_empty());
        assert_eq!(
            objects(&batch, &cve, Predicate::BaseScore),
            vec![&Object::Literal(Literal::Decimal(10.0))]
        );
        assert_eq!(
            objects(&batch, &cve, Predicate::CvssCode),
            vec![&Object::Literal(Literal::String("none".into()))]
        );
        assert_eq!(
            objects(&batch, &cve, Predicate::Description),
            vec![&Object::Literal(Literal::String(
                "Apache Log4j2 JNDI features\ndo not protect against LDAP.".into()
            ))]
        );
        assert!(objects(&batch, &cve, Predicate::Published).is_empty());
    }

    #[test]
    fn missing_score_becomes_minus_one() {
        let mut input = record();
        input.severity = Severity::default();
        let batch = cve_to_facts(&input, &mut IntervalRegistry::new());
        let cve = cve_node(&input.id);
        assert_eq!(
            objects(&batch, &cve, Predicate::BaseScore),
            vec![&Object::Literal(Literal::Decimal(-1.0))]
        );
        assert_eq!(
            objects(&batch, &cve, Predicate::BaseSeverity),
            vec![&Object::Literal(Literal::String("none".into()))]
        );
    }

    #[test]
    fn duplicate_references_collapse() {
        let batch = cve_to_facts(&record(), &mut IntervalRegistry::new());
        let cve = cve_node("CVE-2021-44228");
        assert_eq!(objects(&batch, &cve, Predicate::HasReferences).len(), 1);
    }

    #[test]
    fn all_versions_interval_is_described_once() {
        let mut intervals = IntervalRegistry::new();
        let batch = cve_to_facts(&record(), &mut intervals);
        let all = Resource::entity(EntityKind::VersionInterval, "version-all");

        assert_eq!(objects(&batch, &all, Predicate::Type).len(), 1);
        assert_eq!(objects(&batch, &all, Predicate::HasCveAffectingProduct).len(), 2);
        assert_eq!(intervals.len(), 2);

        let log4j = product_node("log4j");
        let bounded = Resource::entity(EntityKind::VersionInterval, "version-2.0.1-2.12.2");
        assert_eq!(
            objects(&batch, &log4j, Predicate::HasVersionInterval),
            vec![&Object::Resource(bounded.clone())]
        );
        assert_eq!(
            objects(&batch, &bounded, Predicate::MaxMinor),
            vec![&Object::Literal(Literal::Integer(12))]
        );
    }

    #[test]
    fn product_links_back_to_vendor() {
        let batch = cve_to_facts(&record(), &mut IntervalRegistry::new());
        assert_eq!(
            objects(&batch, &product_node("log4j"), Predicate::HasVendor),
            vec![&Object::Resource(vendor_node("apache"))]
        );
        assert_eq!(
            objects(&batch, &vendor_node("apache"), Predicate::HasProduct),
            vec![&Object::Resource(product_node("log4j"))]
        );
    }
}
