//! Lifecycle events to package facts.
//!
//! Retractions name every package node whose installed state the event
//! rewrites, plus the event node's sequence; the coordinator clears those
//! before anything is asserted.

use crate::models::{Action, Event, EventKind, PackageRef, PackageVersion};
use factstore::facts::{FactBatch, Literal, Resource, Retraction};
use factstore::ids::{event_id, identify};
use factstore::vocab::{Class, EntityKind, Predicate};

pub fn package_id(package: &PackageRef, version: &PackageVersion) -> String {
    identify(
        EntityKind::Package,
        &[
            Some(package.name.as_str()),
            package.architecture.as_deref(),
            version.as_deref(),
        ],
    )
}

fn package_node(package: &PackageRef, version: &PackageVersion) -> Resource {
    Resource::entity(EntityKind::Package, package_id(package, version))
}

pub fn product_node(package_name: &str) -> Resource {
    Resource::entity(
        EntityKind::Product,
        identify(EntityKind::Product, &[Some(package_name)]),
    )
}

/// Facts every package node carries regardless of the event.
fn describe_package(batch: &mut FactBatch, package: &PackageRef, version: &PackageVersion) -> Resource {
    let node = package_node(package, version);
    let mut facts = batch
        .subject(node.clone())
        .a(Class::Package)
        .text(Predicate::PackageName, package.name.clone());
    if let Some(arch) = &package.architecture {
        facts = facts.text(Predicate::PackageArchitecture, arch.clone());
    }
    facts
        .text(Predicate::Version, version.to_string())
        .link(Predicate::HasRelatedProduct, product_node(&package.name));
    node
}

/// Semantic key of an event, excluding its sequence number.
fn event_key(event: &Event) -> Vec<(&'static str, String)> {
    let mut key = vec![("timestamp", event.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string())];
    match &event.kind {
        EventKind::Action {
            action,
            package,
            old_version,
            new_version,
        } => {
            key.push(("action", action.verb().to_string()));
            key.push(("package", package.to_string()));
            key.push(("old", old_version.to_string()));
            if let Some(new) = new_version {
                key.push(("new", new.to_string()));
            }
        }
        EventKind::Status {
            state,
            package,
            version,
        } => {
            key.push(("state", state.clone()));
            key.push(("package", package.to_string()));
            key.push(("version", version.to_string()));
        }
        EventKind::Conffile { path, decision } => {
            key.push(("path", path.clone()));
            key.push(("decision", decision.clone()));
        }
        EventKind::Startup { context, command } => {
            key.push(("context", context.clone()));
            key.push(("command", command.clone()));
        }
    }
    key
}

pub fn event_node(event: &Event) -> Resource {
    Resource::entity(
        EntityKind::Event,
        event_id(event.kind.name(), &event_key(event)),
    )
}

fn event_class(kind: &EventKind) -> Class {
    match kind {
        EventKind::Action { .. } => Class::ActionEvent,
        EventKind::Status { .. } => Class::StatusEvent,
        EventKind::Conffile { .. } => Class::ConffileEvent,
        EventKind::Startup { .. } => Class::StartupEvent,
    }
}

/// Translates one event into the facts to retract and assert. Pure.
pub fn event_to_facts(event: &Event) -> FactBatch {
    let mut batch = FactBatch::new();

    let packages = match &event.kind {
        EventKind::Action {
            action, package, ..
        } => action_facts(&mut batch, event, action, package),
        EventKind::Status {
            state,
            package,
            version,
        } => {
            let node = package_node(package, version);
            batch.retract(Retraction::property(node.clone(), Predicate::State));
            describe_package(&mut batch, package, version);
            batch.subject(node.clone()).text(Predicate::State, state.clone());
            vec![node]
        }
        EventKind::Conffile { .. } | EventKind::Startup { .. } => Vec::new(),
    };

    let node = event_node(event);
    // The node outlives line positions, so only the latest sequence stays.
    batch.retract(Retraction::property(node.clone(), Predicate::Sequence));
    let mut facts = batch
        .subject(node)
        .a(event_class(&event.kind))
        .literal(Predicate::Timestamp, Literal::DateTime(event.timestamp))
        .integer(Predicate::Sequence, event.sequence as i64);
    facts = match &event.kind {
        EventKind::Action { action, .. } => facts.text(Predicate::Action, action.verb()),
        EventKind::Status { state, .. } => facts.text(Predicate::State, state.clone()),
        EventKind::Conffile { path, decision } => facts
            .text(Predicate::FilePath, path.clone())
            .text(Predicate::Decision, decision.clone()),
        EventKind::Startup { context, command } => facts
            .text(Predicate::Context, context.clone())
            .text(Predicate::Command, command.clone()),
    };
    for package in packages {
        facts = facts.link(Predicate::HasPackage, package);
    }

    batch
}

fn action_facts(
    batch: &mut FactBatch,
    event: &Event,
    action: &Action,
    package: &PackageRef,
) -> Vec<Resource> {
    let Some(current) = event.current_version() else {
        return Vec::new();
    };
    let current_node = package_node(package, current);

    let mark = |batch: &mut FactBatch, installed: bool| {
        batch.retract(Retraction::subject(current_node.clone()));
        describe_package(batch, package, current);
        batch
            .subject(current_node.clone())
            .flag(Predicate::Installed, installed);
    };

    match action {
        Action::Install | Action::TriggerProcessing | Action::Remove | Action::Purge => {
            mark(batch, matches!(action, Action::Install | Action::TriggerProcessing));
            vec![current_node]
        }
        Action::Upgrade => {
            let Some(old) = event.replaced_version() else {
                return vec![current_node];
            };
            let old_node = package_node(package, old);
            // Reinstalls name the same version twice.
            if old_node == current_node {
                mark(batch, true);
                return vec![current_node];
            }
            batch.retract(Retraction::subject(old_node.clone()));
            batch.retract(Retraction::subject(current_node.clone()));

            describe_package(batch, package, old);
            batch
                .subject(old_node.clone())
                .flag(Predicate::Installed, false)
                .link(Predicate::ReplacedBy, current_node.clone());

            describe_package(batch, package, current);
            batch
                .subject(current_node.clone())
                .flag(Predicate::Installed, true);
            vec![current_node, old_node]
        }
        Action::Other(_) => {
            describe_package(batch, package, current);
            vec![current_node]
        }
    }
}
