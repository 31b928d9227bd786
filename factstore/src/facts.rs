//! Typed triples and the batches the translators hand to the upsert coordinator.

use crate::vocab::{Class, EntityKind, Namespace, Predicate};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// A named node: namespace plus local identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Resource {
    pub namespace: Namespace,
    pub local: String,
}

impl Resource {
    pub fn new(namespace: Namespace, local: impl Into<String>) -> Self {
        Self {
            namespace,
            local: local.into(),
        }
    }

    /// Node for an identifier produced by [`crate::ids`].
    pub fn entity(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::new(kind.namespace(), id)
    }

    pub fn class(class: Class) -> Self {
        Self::new(class.namespace(), class.local_name())
    }

    pub fn id(&self) -> &str {
        &self.local
    }

    pub fn iri(&self) -> String {
        format!("{}{}", self.namespace.iri(), self.local)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace.prefix(), self.local)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    String(String),
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    DateTime(NaiveDateTime),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Object {
    Resource(Resource),
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Triple {
    pub subject: Resource,
    pub predicate: Predicate,
    pub object: Object,
}

/// Removal of every fact about `subject`, or only its `predicate` facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Retraction {
    pub subject: Resource,
    pub predicate: Option<Predicate>,
}

impl Retraction {
    pub fn subject(subject: Resource) -> Self {
        Self {
            subject,
            predicate: None,
        }
    }

    pub fn property(subject: Resource, predicate: Predicate) -> Self {
        Self {
            subject,
            predicate: Some(predicate),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FactBatch {
    pub retract: Vec<Retraction>,
    pub assert: Vec<Triple>,
}

impl FactBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.retract.is_empty() && self.assert.is_empty()
    }

    pub fn retract(&mut self, retraction: Retraction) {
        if !self.retract.contains(&retraction) {
            self.retract.push(retraction);
        }
    }

    pub fn push(&mut self, triple: Triple) {
        self.assert.push(triple);
    }

    /// Starts asserting facts about `subject`.
    pub fn subject(&mut self, subject: Resource) -> SubjectFacts<'_> {
        SubjectFacts {
            batch: self,
            subject,
        }
    }

    pub fn extend(&mut self, other: FactBatch) {
        for retraction in other.retract {
            self.retract(retraction);
        }
        self.assert.extend(other.assert);
    }

    /// Assertions split into slices of at most `size` triples.
    pub fn chunks(&self, size: usize) -> std::slice::Chunks<'_, Triple> {
        self.assert.chunks(size.max(1))
    }
}

pub struct SubjectFacts<'a> {
    batch: &'a mut FactBatch,
    subject: Resource,
}

impl SubjectFacts<'_> {
    pub fn a(self, class: Class) -> Self {
        self.link(Predicate::Type, Resource::class(class))
    }

    pub fn link(self, predicate: Predicate, object: Resource) -> Self {
        self.object(predicate, Object::Resource(object))
    }

    pub fn literal(self, predicate: Predicate, literal: Literal) -> Self {
        self.object(predicate, Object::Literal(literal))
    }

    pub fn text(self, predicate: Predicate, value: impl Into<String>) -> Self {
        self.literal(predicate, Literal::String(value.into()))
    }

    pub fn flag(self, predicate: Predicate, value: bool) -> Self {
        self.literal(predicate, Literal::Boolean(value))
    }

    pub fn integer(self, predicate: Predicate, value: i64) -> Self {
        self.literal(predicate, Literal::Integer(value))
    }

    fn object(self, predicate: Predicate, object: Object) -> Self {
        self.batch.push(Triple {
            subject: self.subject.clone(),
            predicate,
            object,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_builder_appends_in_order() {
        let pkg = Resource::entity(EntityKind::Package, "pkg-bash-amd64-5.1");
        let mut batch = FactBatch::new();
        batch
            .subject(pkg.clone())
            .a(Class::Package)
            .text(Predicate::PackageName, "bash")
            .flag(Predicate::Installed, true);

        assert_eq!(batch.assert.len(), 3);
        assert_eq!(batch.assert[0].predicate, Predicate::Type);
        assert_eq!(
            batch.assert[2].object,
            Object::Literal(Literal::Boolean(true))
        );
        assert!(batch.assert.iter().all(|t| t.subject == pkg));
    }

    #[test]
    fn retractions_are_deduplicated() {
        let pkg = Resource::entity(EntityKind::Package, "pkg-a-none-1");
        let mut batch = FactBatch::new();
        batch.retract(Retraction::subject(pkg.clone()));
        batch.retract(Retraction::subject(pkg.clone()));
        batch.retract(Retraction::property(pkg, Predicate::State));
        assert_eq!(batch.retract.len(), 2);
    }

    #[test]
    fn chunks_bound_payload_size() {
        let node = Resource::entity(EntityKind::Cve, "CVE-2024-0001");
        let mut batch = FactBatch::new();
        for i in 0..7 {
            batch.subject(node.clone()).integer(Predicate::Sequence, i);
        }
        let sizes: Vec<usize> = batch.chunks(3).map(|c| c.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn resource_renders_full_iri() {
        let node = Resource::entity(EntityKind::Product, "prod-openssl");
        assert_eq!(node.iri(), "http://purl.org/cyber/cve#prod-openssl");
        assert_eq!(node.to_string(), "cve:prod-openssl");
    }
}
