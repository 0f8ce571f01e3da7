// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use log::warn;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::expr::{Expression, host_node_name};

pub const PROGRAM_PREFIX: &str = "program:";
pub const EVENT_LISTENER_PREFIX: &str = "eventlistener:";
pub const GROUP_PREFIX: &str = "group:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Program,
    EventListener,
    Group,
    Other,
}

impl EntryKind {
    pub fn of(name: &str) -> Self {
        if name.starts_with(PROGRAM_PREFIX) {
            EntryKind::Program
        } else if name.starts_with(EVENT_LISTENER_PREFIX) {
            EntryKind::EventListener
        } else if name.starts_with(GROUP_PREFIX) {
            EntryKind::Group
        } else {
            EntryKind::Other
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            EntryKind::Program => PROGRAM_PREFIX,
            EntryKind::EventListener => EVENT_LISTENER_PREFIX,
            EntryKind::Group => GROUP_PREFIX,
            EntryKind::Other => "",
        }
    }

    pub fn is_process(self) -> bool {
        matches!(self, EntryKind::Program | EntryKind::EventListener)
    }
}

/// One configuration section after loading.
///
/// The kind is always derived from `name`; `group` is only meaningful for
/// program and event listener entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub name: String,
    pub config_dir: PathBuf,
    pub group: String,
    key_values: BTreeMap<String, String>,
}

impl ConfigEntry {
    pub fn new(
        name: impl Into<String>,
        config_dir: impl Into<PathBuf>,
        key_values: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            config_dir: config_dir.into(),
            group: String::new(),
            key_values,
        }
    }

    pub fn kind(&self) -> EntryKind {
        EntryKind::of(&self.name)
    }

    /// Name without the `program:`/`eventlistener:` prefix.
    pub fn process_name(&self) -> Option<&str> {
        match self.kind() {
            kind @ (EntryKind::Program | EntryKind::EventListener) => {
                self.name.strip_prefix(kind.prefix())
            }
            _ => None,
        }
    }

    pub fn group_name(&self) -> Option<&str> {
        self.name.strip_prefix(GROUP_PREFIX)
    }

    /// Members listed by a `group:` section.
    pub fn programs(&self) -> Vec<String> {
        if self.kind() != EntryKind::Group {
            return Vec::new();
        }
        self.get_string_array("programs", ',')
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn has_parameter(&self, key: &str) -> bool {
        self.key_values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.key_values.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.key_values.keys().map(String::as_str)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) => match v.as_str() {
                "true" | "yes" | "on" | "1" | "t" => true,
                "false" | "no" | "off" | "0" | "f" => false,
                _ => default,
            },
            None => default,
        }
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// A byte size with an optional `KB`, `MB` or `GB` suffix.
    pub fn get_bytes(&self, key: &str, default: u64) -> u64 {
        self.get(key)
            .and_then(|v| parse_bytes(v.trim()))
            .unwrap_or(default)
    }

    /// Raw value with only `%(here)s` substituted.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            Some(raw) => Expression::new()
                .with("here", self.config_dir.to_string_lossy())
                .eval(raw)
                .unwrap_or_else(|_| default.to_string()),
            None => default.to_string(),
        }
    }

    /// Value with every placeholder substituted. On failure the raw value is
    /// returned and a warning is logged.
    pub fn get_string_expression(&self, key: &str, default: &str) -> String {
        let raw = self.get(key).unwrap_or(default);
        if raw.is_empty() {
            return String::new();
        }
        match self.expression().eval(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("[{}] unable to evaluate {key}: {e}", self.name);
                raw.to_string()
            }
        }
    }

    /// Like [`get_string_expression`](Self::get_string_expression) but
    /// propagates evaluation failures. `None` when the key is absent.
    pub fn get_string_expression_strict(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            Some(raw) => self.expression().eval(raw).map(Some),
            None => Ok(None),
        }
    }

    /// Parse `A="x, y",B=z` into pairs, substituting placeholders in values.
    pub fn get_env(&self, key: &str) -> Vec<(String, String)> {
        let Some(raw) = self.get(key) else {
            return Vec::new();
        };
        let expression = self.expression();
        parse_env(raw)
            .into_iter()
            .filter_map(|(k, v)| match expression.eval(&v) {
                Ok(v) => Some((k, v)),
                Err(e) => {
                    warn!("[{}] skipping environment {k}: {e}", self.name);
                    None
                }
            })
            .collect()
    }

    pub fn get_string_array(&self, key: &str, sep: char) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(sep)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Bindings available to this entry's values.
    pub fn expression(&self) -> Expression {
        let mut expression = Expression::new()
            .with("program_name", self.process_name().unwrap_or_default())
            .with("process_num", self.get_string("process_num", "0"))
            .with("group_name", self.group.as_str())
            .with("here", self.config_dir.to_string_lossy())
            .with("host_node_name", host_node_name());
        for (k, v) in std::env::vars() {
            expression.bind(format!("ENV_{k}"), v);
        }
        expression
    }
}

pub(crate) fn parse_bytes(value: &str) -> Option<u64> {
    let (digits, factor) = if let Some(n) = value.strip_suffix("GB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = value.strip_suffix("MB") {
        (n, 1024 * 1024)
    } else if let Some(n) = value.strip_suffix("KB") {
        (n, 1024)
    } else {
        (value, 1)
    };
    digits.trim().parse::<u64>().ok().map(|n| n * factor)
}

fn parse_env(raw: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut rest = raw.trim();
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else {
            break;
        };
        let key = rest[..eq].trim().to_string();
        let after = rest[eq + 1..].trim_start();
        let (value, tail) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after.find(',') {
                Some(end) => (after[..end].trim_end(), &after[end..]),
                None => (after.trim_end(), ""),
            }
        };
        if !key.is_empty() {
            out.push((key, value.to_string()));
        }
        rest = tail.trim_start().strip_prefix(',').unwrap_or(tail).trim_start();
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn entry(name: &str, pairs: &[(&str, &str)]) -> ConfigEntry {
        ConfigEntry::new(
            name,
            "/etc/supervisor",
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_kind_from_name() {
        assert_eq!(entry("program:web", &[]).kind(), EntryKind::Program);
        assert_eq!(entry("eventlistener:ev", &[]).kind(), EntryKind::EventListener);
        assert_eq!(entry("group:core", &[]).kind(), EntryKind::Group);
        assert_eq!(entry("supervisord", &[]).kind(), EntryKind::Other);
        assert_eq!(entry("program:web", &[]).process_name(), Some("web"));
        assert_eq!(entry("eventlistener:ev", &[]).process_name(), Some("ev"));
        assert_eq!(entry("group:core", &[]).process_name(), None);
        assert_eq!(entry("group:core", &[]).group_name(), Some("core"));
    }

    #[test]
    fn test_group_programs() {
        let e = entry("group:core", &[("programs", "web, api,,cron")]);
        assert_eq!(e.programs(), ["web", "api", "cron"]);
        assert!(entry("program:x", &[("programs", "a")]).programs().is_empty());
    }

    #[test]
    fn test_typed_accessors() {
        let e = entry(
            "program:web",
            &[
                ("autostart", "false"),
                ("startsecs", "5"),
                ("bad", "x"),
                ("maxbytes", "2MB"),
                ("small", "3KB"),
                ("huge", "1GB"),
                ("plain", "100"),
            ],
        );
        assert!(!e.get_bool("autostart", true));
        assert!(e.get_bool("missing", true));
        assert!(e.get_bool("bad", true));
        assert_eq!(e.get_int("startsecs", 1), 5);
        assert_eq!(e.get_int("bad", 1), 1);
        assert_eq!(e.get_bytes("maxbytes", 0), 2 * 1024 * 1024);
        assert_eq!(e.get_bytes("small", 0), 3 * 1024);
        assert_eq!(e.get_bytes("huge", 0), 1024 * 1024 * 1024);
        assert_eq!(e.get_bytes("plain", 0), 100);
        assert_eq!(e.get_bytes("bad", 7), 7);
        assert!(e.has_parameter("bad"));
        assert!(!e.has_parameter("nope"));
    }

    #[test]
    fn test_get_string_only_binds_here() {
        let e = entry(
            "program:web",
            &[("dir", "%(here)s/run"), ("log", "%(program_name)s.log")],
        );
        assert_eq!(e.get_string("dir", ""), "/etc/supervisor/run");
        assert_eq!(e.get_string("log", "fallback"), "fallback");
        assert_eq!(e.get_string("missing", "d"), "d");
    }

    #[test]
    fn test_get_string_expression() {
        let mut e = entry(
            "program:web",
            &[
                ("log", "%(here)s/%(program_name)s-%(group_name)s-%(process_num)s.log"),
                ("broken", "%(nope)s"),
            ],
        );
        e.group = "core".to_string();
        assert_eq!(
            e.get_string_expression("log", ""),
            "/etc/supervisor/web-core-0.log"
        );
        assert_eq!(e.get_string_expression("broken", ""), "%(nope)s");
        assert!(e.get_string_expression_strict("broken").is_err());
        assert_eq!(e.get_string_expression_strict("missing").unwrap(), None);
    }

    #[test]
    fn test_env_bindings() {
        let e = entry("program:web", &[("p", "%(ENV_PATH)s")]);
        let path = std::env::var("PATH").unwrap_or_default();
        assert_eq!(e.get_string_expression("p", ""), path);
    }

    #[test]
    fn test_get_env() {
        let e = entry(
            "program:web",
            &[("environment", "A=\"env 1, with comma\",B=plain, C = %(program_name)s")],
        );
        assert_eq!(
            e.get_env("environment"),
            vec![
                ("A".to_string(), "env 1, with comma".to_string()),
                ("B".to_string(), "plain".to_string()),
                ("C".to_string(), "web".to_string()),
            ]
        );
        assert!(e.get_env("missing").is_empty());
    }
}
