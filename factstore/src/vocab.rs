//! The fixed vocabulary shared by every derivation.
//!
//! Predicate and class names below are the schema contract with the triple
//! store: identity-based upserts only work while they stay stable across runs.

use serde::Serialize;

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";
pub const LOGS_NS: &str = "http://www.semanticweb.org/logs-ontology-v2#";
pub const CVE_NS: &str = "http://purl.org/cyber/cve#";
pub const LINPACK_NS: &str = "http://www.semanticweb.org/linpack#";

/// Version of the identity scheme implemented in [`crate::ids`].
pub const IDENTITY_SCHEME: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Namespace {
    Rdf,
    Logs,
    Cve,
    Linpack,
}

impl Namespace {
    pub fn iri(&self) -> &'static str {
        match self {
            Namespace::Rdf => RDF_NS,
            Namespace::Logs => LOGS_NS,
            Namespace::Cve => CVE_NS,
            Namespace::Linpack => LINPACK_NS,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Namespace::Rdf => "rdf",
            Namespace::Logs => "logs",
            Namespace::Cve => "cve",
            Namespace::Linpack => "linpack",
        }
    }
}

/// Kinds of graph node the identity resolver knows how to name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EntityKind {
    Package,
    Vendor,
    Product,
    VersionInterval,
    Cve,
    Reference,
    Event,
}

impl EntityKind {
    /// Prefix every identifier of this kind starts with.
    pub fn tag(&self) -> &'static str {
        match self {
            EntityKind::Package => "pkg",
            EntityKind::Vendor => "vendor",
            EntityKind::Product => "prod",
            EntityKind::VersionInterval => "version",
            EntityKind::Cve => "cve",
            EntityKind::Reference => "ref",
            EntityKind::Event => "log",
        }
    }

    /// Namespace the node IRIs of this kind live in.
    pub fn namespace(&self) -> Namespace {
        match self {
            EntityKind::Package | EntityKind::Event => Namespace::Logs,
            EntityKind::Vendor
            | EntityKind::Product
            | EntityKind::VersionInterval
            | EntityKind::Cve
            | EntityKind::Reference => Namespace::Cve,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Class {
    Package,
    ActionEvent,
    StatusEvent,
    ConffileEvent,
    StartupEvent,
    Cve,
    Reference,
    Vendor,
    Product,
    VersionInterval,
}

impl Class {
    pub fn namespace(&self) -> Namespace {
        match self {
            Class::Package
            | Class::ActionEvent
            | Class::StatusEvent
            | Class::ConffileEvent
            | Class::StartupEvent => Namespace::Logs,
            _ => Namespace::Cve,
        }
    }

    pub fn local_name(&self) -> &'static str {
        match self {
            Class::Package => "Package",
            Class::ActionEvent => "ActionEvent",
            Class::StatusEvent => "StatusEvent",
            Class::ConffileEvent => "ConffileEvent",
            Class::StartupEvent => "StartupEvent",
            Class::Cve => "CVE",
            Class::Reference => "References",
            Class::Vendor => "Vendor",
            Class::Product => "Product",
            Class::VersionInterval => "Version",
        }
    }

    pub fn iri(&self) -> String {
        format!("{}{}", self.namespace().iri(), self.local_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Predicate {
    Type,

    // event nodes
    Timestamp,
    Sequence,
    Action,
    State,
    FilePath,
    Decision,
    Context,
    Command,
    HasPackage,

    // package nodes
    PackageName,
    PackageArchitecture,
    Version,
    Installed,
    ReplacedBy,
    HasRelatedProduct,

    // cve nodes
    Description,
    Published,
    BaseScore,
    BaseSeverity,
    CvssVersion,
    CvssCode,
    HasReferences,
    HasAffectedProduct,

    // reference nodes
    Url,
    RefSource,
    RefName,

    // vendor / product nodes
    VendorName,
    HasProduct,
    ProductName,
    HasVendor,
    HasVersionInterval,

    // version interval nodes
    VersionMin,
    VersionMax,
    MinMajor,
    MinMinor,
    MinPatch,
    MaxMajor,
    MaxMinor,
    MaxPatch,
    HasCveAffectingProduct,
}

impl Predicate {
    pub fn namespace(&self) -> Namespace {
        use Predicate::*;
        match self {
            Type => Namespace::Rdf,
            Timestamp | Sequence | Action | State | FilePath | Decision | Context | Command
            | HasPackage | PackageName | PackageArchitecture | Version | Installed
            | ReplacedBy => Namespace::Logs,
            HasRelatedProduct => Namespace::Linpack,
            _ => Namespace::Cve,
        }
    }

    pub fn local_name(&self) -> &'static str {
        use Predicate::*;
        match self {
            Type => "type",
            Timestamp => "timestamp",
            Sequence => "sequence",
            Action => "action",
            State => "state",
            FilePath => "filepath",
            Decision => "decision",
            Context => "context",
            Command => "command",
            HasPackage => "has_package",
            PackageName => "package_name",
            PackageArchitecture => "package_architecture",
            Version => "version",
            Installed => "installed",
            ReplacedBy => "replaced_by",
            HasRelatedProduct => "has_related_product",
            Description => "description",
            Published => "published",
            BaseScore => "base_score",
            BaseSeverity => "base_severity",
            CvssVersion => "cvss_version",
            CvssCode => "cvss_code",
            HasReferences => "has_references",
            HasAffectedProduct => "has_affected_product",
            Url => "url",
            RefSource => "ref_source",
            RefName => "ref_name",
            VendorName => "vendor_name",
            HasProduct => "has_product",
            ProductName => "product_name",
            HasVendor => "has_vendor",
            HasVersionInterval => "has_version_interval",
            VersionMin => "version_min",
            VersionMax => "version_max",
            MinMajor => "min_major",
            MinMinor => "min_minor",
            MinPatch => "min_patch",
            MaxMajor => "max_major",
            MaxMinor => "max_minor",
            MaxPatch => "max_patch",
            HasCveAffectingProduct => "has_cve_affecting_product",
        }
    }

    pub fn iri(&self) -> String {
        format!("{}{}", self.namespace().iri(), self.local_name())
    }
}
