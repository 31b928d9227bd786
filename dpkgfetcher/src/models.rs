use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// A version token from the log. dpkg writes `<none>` where no version
/// applies; that is kept as [`PackageVersion::NoVersion`], never as "".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PackageVersion {
    Version(String),
    NoVersion,
}

impl PackageVersion {
    pub fn from_token(token: &str) -> Self {
        match token.trim() {
            "<none>" | "none" => PackageVersion::NoVersion,
            other => PackageVersion::Version(other.to_string()),
        }
    }

    pub fn as_deref(&self) -> Option<&str> {
        match self {
            PackageVersion::Version(v) => Some(v),
            PackageVersion::NoVersion => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, PackageVersion::NoVersion)
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageVersion::Version(v) => f.write_str(v),
            PackageVersion::NoVersion => f.write_str("none"),
        }
    }
}

/// `name[:architecture]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageRef {
    pub name: String,
    pub architecture: Option<String>,
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.architecture {
            Some(arch) => write!(f, "{}:{}", self.name, arch),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Action {
    Install,
    Upgrade,
    Remove,
    Purge,
    TriggerProcessing,
    /// `configure`, `unpack`, `triggered`, `trigawait`.
    Other(String),
}

impl Action {
    pub fn from_verb(verb: &str) -> Self {
        match verb {
            "install" => Action::Install,
            "upgrade" => Action::Upgrade,
            "remove" => Action::Remove,
            "purge" => Action::Purge,
            "trigproc" => Action::TriggerProcessing,
            other => Action::Other(other.to_string()),
        }
    }

    pub fn verb(&self) -> &str {
        match self {
            Action::Install => "install",
            Action::Upgrade => "upgrade",
            Action::Remove => "remove",
            Action::Purge => "purge",
            Action::TriggerProcessing => "trigproc",
            Action::Other(verb) => verb,
        }
    }

    /// Whether the action changes the installed state of a package.
    pub fn is_lifecycle(&self) -> bool {
        !matches!(self, Action::Other(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EventKind {
    Action {
        action: Action,
        package: PackageRef,
        old_version: PackageVersion,
        new_version: Option<PackageVersion>,
    },
    Status {
        state: String,
        package: PackageRef,
        version: PackageVersion,
    },
    Conffile {
        path: String,
        decision: String,
    },
    Startup {
        context: String,
        command: String,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Action { .. } => "action",
            EventKind::Status { .. } => "status",
            EventKind::Conffile { .. } => "conffile",
            EventKind::Startup { .. } => "startup",
        }
    }
}

/// One matched log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub sequence: u64,
    pub timestamp: NaiveDateTime,
    pub kind: EventKind,
}

impl Event {
    /// The version the package is in after this event.
    ///
    /// install: new; trigproc: new, falling back to old when dpkg wrote
    /// `<none>`; upgrade: new; remove, purge and other verbs: old.
    pub fn current_version(&self) -> Option<&PackageVersion> {
        match &self.kind {
            EventKind::Action {
                action,
                old_version,
                new_version,
                ..
            } => Some(match action {
                Action::Install | Action::Upgrade => new_version.as_ref().unwrap_or(old_version),
                Action::TriggerProcessing => match new_version {
                    Some(new) if !new.is_none() => new,
                    _ => old_version,
                },
                Action::Remove | Action::Purge | Action::Other(_) => old_version,
            }),
            EventKind::Status { version, .. } => Some(version),
            EventKind::Conffile { .. } | EventKind::Startup { .. } => None,
        }
    }

    /// For upgrades, the version being replaced.
    pub fn replaced_version(&self) -> Option<&PackageVersion> {
        match &self.kind {
            EventKind::Action {
                action: Action::Upgrade,
                old_version,
                ..
            } => Some(old_version),
            _ => None,
        }
    }

    pub fn package(&self) -> Option<&PackageRef> {
        match &self.kind {
            EventKind::Action { package, .. } | EventKind::Status { package, .. } => Some(package),
            _ => None,
        }
    }

    /// Short description used in logs and failure reports.
    pub fn label(&self) -> String {
        match &self.kind {
            EventKind::Action { action, package, .. } => format!("{} {}", action.verb(), package),
            EventKind::Status { state, package, .. } => format!("status {} {}", state, package),
            EventKind::Conffile { path, .. } => format!("conffile {}", path),
            EventKind::Startup { context, command } => format!("startup {} {}", context, command),
        }
    }
}
