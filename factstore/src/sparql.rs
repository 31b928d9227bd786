//! SPARQL 1.1 text for the three operation shapes the gateway issues.

use crate::facts::{Literal, Object, Resource, Retraction, Triple};
use crate::vocab::{Predicate, XSD_NS};
use std::fmt::Write;

/// Escapes a string for use inside a double-quoted SPARQL literal.
pub fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

fn resource(node: &Resource) -> String {
    format!("<{}>", node.iri())
}

fn predicate(p: Predicate) -> String {
    format!("<{}>", p.iri())
}

fn typed(lexical: &str, datatype: &str) -> String {
    format!("\"{}\"^^<{}{}>", escape_literal(lexical), XSD_NS, datatype)
}

pub fn render_literal(literal: &Literal) -> String {
    match literal {
        Literal::String(s) => format!("\"{}\"", escape_literal(s)),
        Literal::Boolean(b) => typed(&b.to_string(), "boolean"),
        Literal::Integer(i) => typed(&i.to_string(), "integer"),
        Literal::Decimal(d) => typed(&format!("{d:?}"), "decimal"),
        Literal::DateTime(ts) => typed(&ts.format("%Y-%m-%dT%H:%M:%S").to_string(), "dateTime"),
    }
}

fn render_object(object: &Object) -> String {
    match object {
        Object::Resource(node) => resource(node),
        Object::Literal(literal) => render_literal(literal),
    }
}

pub fn render_triple(triple: &Triple) -> String {
    format!(
        "{} {} {} .",
        resource(&triple.subject),
        predicate(triple.predicate),
        render_object(&triple.object)
    )
}

/// Builds operation text scoped to one named graph.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    graph: String,
}

impl QueryBuilder {
    pub fn new(graph: impl Into<String>) -> Self {
        Self {
            graph: graph.into(),
        }
    }

    pub fn graph(&self) -> &str {
        &self.graph
    }

    fn pattern(&self, retraction: &Retraction) -> String {
        let p = retraction
            .predicate
            .map(predicate)
            .unwrap_or_else(|| "?p".to_string());
        format!("{} {} ?o", resource(&retraction.subject), p)
    }

    /// `ASK` for any fact matching the retraction's pattern.
    pub fn ask(&self, retraction: &Retraction) -> String {
        format!(
            "ASK WHERE {{ GRAPH <{}> {{ {} }} }}",
            self.graph,
            self.pattern(retraction)
        )
    }

    pub fn ask_exists(&self, subject: &Resource) -> String {
        self.ask(&Retraction::subject(subject.clone()))
    }

    pub fn delete(&self, retraction: &Retraction) -> String {
        format!(
            "DELETE WHERE {{ GRAPH <{}> {{ {} }} }}",
            self.graph,
            self.pattern(retraction)
        )
    }

    pub fn delete_subject(&self, subject: &Resource) -> String {
        self.delete(&Retraction::subject(subject.clone()))
    }

    pub fn delete_property(&self, subject: &Resource, p: Predicate) -> String {
        self.delete(&Retraction::property(subject.clone(), p))
    }

    pub fn insert_data(&self, triples: &[Triple]) -> String {
        let mut body = String::new();
        for triple in triples {
            // Writing to a String cannot fail.
            let _ = writeln!(body, "    {}", render_triple(triple));
        }
        format!("INSERT DATA {{\n  GRAPH <{}> {{\n{}  }}\n}}", self.graph, body)
    }
}
