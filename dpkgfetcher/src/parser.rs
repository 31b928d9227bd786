//! Tolerant dpkg.log line parser.
//!
//! Shapes are tried in order (action, status, conffile, startup) and the first
//! match wins. A line matching none of them is skipped and counted, never an
//! error. A timestamp that is not a real calendar instant fails the shape.

use crate::error::{DpkgError, Result};
use crate::models::{Action, Event, EventKind, PackageRef, PackageVersion};
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static ACTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<ts>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) (?P<action>install|upgrade|remove|purge|configure|unpack|triggered|trigproc|trigawait) (?P<package>[\w\-.+]+)(?::(?P<arch>[\w\-]+))?\s+(?P<old><none>|\S+)(?:\s+(?P<new><none>|\S+))?$",
    )
    .expect("action pattern is valid")
});

static STATUS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<ts>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) status (?P<state>[\w\-]+) (?P<package>[\w\-.+]+)(?::(?P<arch>[\w\-]+))?\s+(?P<version><none>|[\w.\-~:+]+)$",
    )
    .expect("status pattern is valid")
});

static CONFFILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<ts>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) conffile (?P<path>.+?)\s+(?P<decision>\w+)$",
    )
    .expect("conffile pattern is valid")
});

static STARTUP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<ts>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) startup (?P<context>\w+) (?P<command>\w+)$",
    )
    .expect("startup pattern is valid")
});

/// Events parsed from one source plus the number of lines that matched no
/// shape.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseReport {
    pub events: Vec<Event>,
    pub skipped: usize,
}

fn timestamp(caps: &Captures<'_>) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&caps["ts"], TIMESTAMP_FORMAT).ok()
}

fn package(caps: &Captures<'_>) -> PackageRef {
    PackageRef {
        name: caps["package"].to_string(),
        architecture: caps.name("arch").map(|m| m.as_str().to_string()),
    }
}

fn parse_action(line: &str) -> Option<(NaiveDateTime, EventKind)> {
    let caps = ACTION_RE.captures(line)?;
    let ts = timestamp(&caps)?;
    Some((
        ts,
        EventKind::Action {
            action: Action::from_verb(&caps["action"]),
            package: package(&caps),
            old_version: PackageVersion::from_token(&caps["old"]),
            new_version: caps
                .name("new")
                .map(|m| PackageVersion::from_token(m.as_str())),
        },
    ))
}

fn parse_status(line: &str) -> Option<(NaiveDateTime, EventKind)> {
    let caps = STATUS_RE.captures(line)?;
    let ts = timestamp(&caps)?;
    Some((
        ts,
        EventKind::Status {
            state: caps["state"].to_string(),
            package: package(&caps),
            version: PackageVersion::from_token(&caps["version"]),
        },
    ))
}

fn parse_conffile(line: &str) -> Option<(NaiveDateTime, EventKind)> {
    let caps = CONFFILE_RE.captures(line)?;
    let ts = timestamp(&caps)?;
    Some((
        ts,
        EventKind::Conffile {
            path: caps["path"].trim().to_string(),
            decision: caps["decision"].to_string(),
        },
    ))
}

fn parse_startup(line: &str) -> Option<(NaiveDateTime, EventKind)> {
    let caps = STARTUP_RE.captures(line)?;
    let ts = timestamp(&caps)?;
    Some((
        ts,
        EventKind::Startup {
            context: caps["context"].to_string(),
            command: caps["command"].to_string(),
        },
    ))
}

/// Classifies one line; `sequence` is assigned to the event on a match.
pub fn parse_line(line: &str, sequence: u64) -> Option<Event> {
    let line = line.trim();
    let (timestamp, kind) = parse_action(line)
        .or_else(|| parse_status(line))
        .or_else(|| parse_conffile(line))
        .or_else(|| parse_startup(line))?;
    Some(Event {
        sequence,
        timestamp,
        kind,
    })
}

/// Parses lines in order. Only matched lines consume a sequence number,
/// starting at 1.
pub fn parse_lines<'a, I>(lines: I) -> ParseReport
where
    I: IntoIterator<Item = &'a str>,
{
    let mut report = ParseReport::default();
    let mut next_sequence = 1u64;
    for (line_no, line) in lines.into_iter().enumerate() {
        match parse_line(line, next_sequence) {
            Some(event) => {
                report.events.push(event);
                next_sequence += 1;
            }
            None => {
                log::debug!("skipping unrecognized line {}: {:?}", line_no + 1, line);
                report.skipped += 1;
            }
        }
    }
    report
}

pub fn parse_str(content: &str) -> ParseReport {
    parse_lines(content.lines())
}

/// Parses raw log bytes. Invalid UTF-8 is replaced, so a stray Latin-1 byte
/// only affects the line it sits on.
pub fn parse_bytes(content: &[u8]) -> ParseReport {
    parse_str(&String::from_utf8_lossy(content))
}

/// Reads and parses a whole log file. Failing to open or read it is the only
/// error.
pub fn parse_file(path: impl AsRef<Path>) -> Result<ParseReport> {
    let path = path.as_ref();
    let content = std::fs::read(path).map_err(|source| DpkgError::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_bytes(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upgrade_with_both_versions() {
        let event = parse_line(
            "2024-02-15 12:34:56 upgrade openssl:amd64 1.1.1f-1ubuntu2.16 1.1.1f-1ubuntu2.17",
            1,
        )
        .unwrap();
        match &event.kind {
            EventKind::Action {
                action,
                package,
                old_version,
                new_version,
            } => {
                assert_eq!(*action, Action::Upgrade);
                assert_eq!(package.name, "openssl");
                assert_eq!(package.architecture.as_deref(), Some("amd64"));
                assert_eq!(old_version.as_deref(), Some("1.1.1f-1ubuntu2.16"));
                assert_eq!(
                    new_version.as_ref().and_then(|v| v.as_deref()),
                    Some("1.1.1f-1ubuntu2.17")
                );
            }
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(
            event.current_version().and_then(|v| v.as_deref()),
            Some("1.1.1f-1ubuntu2.17")
        );
        assert_eq!(
            event.replaced_version().and_then(|v| v.as_deref()),
            Some("1.1.1f-1ubuntu2.16")
        );
    }

    #[test]
    fn none_token_is_preserved_as_marker() {
        let event = parse_line("2024-02-15 12:00:00 install curl:amd64 <none> 7.81.0-1", 1).unwrap();
        match &event.kind {
            EventKind::Action { old_version, .. } => {
                assert_eq!(*old_version, PackageVersion::NoVersion);
                assert_ne!(*old_version, PackageVersion::Version(String::new()));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn trigproc_falls_back_to_old_version() {
        let event = parse_line("2024-02-15 12:00:01 trigproc man-db:amd64 2.10.2-1 <none>", 1).unwrap();
        assert_eq!(
            event.current_version().and_then(|v| v.as_deref()),
            Some("2.10.2-1")
        );
    }

    #[test]
    fn remove_keeps_old_version_current() {
        let event = parse_line("2024-02-15 12:00:02 remove vim:amd64 2:8.2.3995-1 <none>", 1).unwrap();
        assert_eq!(
            event.current_version().and_then(|v| v.as_deref()),
            Some("2:8.2.3995-1")
        );
    }

    #[test]
    fn invalid_calendar_date_fails_the_match() {
        assert!(parse_line("2024-02-30 10:00:00 install bash:amd64 <none> 5.1", 1).is_none());
        assert!(parse_line("2024-13-01 10:00:00 startup archives unpack", 1).is_none());
        assert!(parse_line("2024-01-01 25:00:00 status installed bash:amd64 5.1", 1).is_none());
    }

    #[test]
    fn status_conffile_and_startup_shapes() {
        let status = parse_line("2024-02-15 12:35:00 status half-configured openssl:amd64 3.0.2-0ubuntu1", 1).unwrap();
        assert!(matches!(
            status.kind,
            EventKind::Status { ref state, .. } if state == "half-configured"
        ));

        let conffile = parse_line("2024-02-15 12:35:01 conffile /etc/ssh/sshd_config keep", 2).unwrap();
        assert_eq!(
            conffile.kind,
            EventKind::Conffile {
                path: "/etc/ssh/sshd_config".into(),
                decision: "keep".into()
            }
        );

        let startup = parse_line("2024-02-15 12:30:00 startup archives unpack", 3).unwrap();
        assert_eq!(
            startup.kind,
            EventKind::Startup {
                context: "archives".into(),
                command: "unpack".into()
            }
        );
    }

    #[test]
    fn package_without_architecture_is_accepted() {
        let event = parse_line("2024-02-15 12:00:00 configure libc-bin 2.35-0ubuntu3 <none>", 1).unwrap();
        let package = event.package().unwrap();
        assert_eq!(package.name, "libc-bin");
        assert!(package.architecture.is_none());
    }

    #[test]
    fn skipped_lines_are_counted_and_do_not_consume_sequence_numbers() {
        let log = "\
2024-02-15 12:30:00 startup archives unpack
2024-02-15 12:30:01 install openssl:amd64 <none> 3.0.2-0ubuntu1
this is not a dpkg line

2024-02-15 12:30:02 status half-installed openssl:amd64 3.0.2-0ubuntu1
2024-02-30 12:30:03 status installed openssl:amd64 3.0.2-0ubuntu1
2024-02-15 12:30:04 configure openssl:amd64 3.0.2-0ubuntu1 <none>
2024-02-15 12:30:05 status installed openssl:amd64 3.0.2-0ubuntu1
2024-02-15 12:30:06 conffile /etc/ssl/openssl.cnf install
2024-02-15 12:30:07 remove openssl:amd64 3.0.2-0ubuntu1 <none>";
        let report = parse_str(log);
        assert_eq!(report.events.len(), 7);
        assert_eq!(report.skipped, 3);
        let sequences: Vec<u64> = report.events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn invalid_utf8_does_not_spoil_the_log() {
        let mut content = b"2024-02-15 12:30:01 install vim:amd64 <none> 2:8.2.3995-1\n".to_vec();
        content.extend_from_slice(b"2024-02-15 12:30:02 conffile /etc/caf\xe9.conf keep\n");
        content.extend_from_slice(b"\xff\xfe\n");

        let report = parse_bytes(&content);
        assert_eq!(report.events.len(), 2);
        assert_eq!(report.skipped, 1);
        match &report.events[1].kind {
            EventKind::Conffile { path, decision } => {
                assert_eq!(path, "/etc/caf\u{fffd}.conf");
                assert_eq!(decision, "keep");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let err = parse_file("/definitely/not/here/dpkg.log").unwrap_err();
        assert!(matches!(err, DpkgError::SourceUnavailable { .. }));
    }
}
