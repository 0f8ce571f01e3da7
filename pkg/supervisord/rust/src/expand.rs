// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Fan-out of `program:`/`eventlistener:` templates into process instances.

use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::Path;

use crate::entry::{ConfigEntry, EntryKind};
use crate::expr::{Expression, host_node_name};
use crate::group::GroupIndex;

/// Upper bound on `numprocs`; a template asking for more is skipped.
pub const MAX_NUMPROCS: i64 = 10_000;

/// Expand the section `name` into `numprocs` entries.
///
/// Each instance gets a copy of the template keys with `command` and
/// `process_name` evaluated and `process_num`/`numprocs_start` set. The
/// program is assigned to its own group unless a `group:` section already
/// claimed it. Instances whose `command` or `process_name` cannot be
/// evaluated are skipped.
pub fn expand(
    name: &str,
    template: &BTreeMap<String, String>,
    config_dir: &Path,
    groups: &mut GroupIndex,
) -> Vec<ConfigEntry> {
    let kind = EntryKind::of(name);
    let Some(program) = name.strip_prefix(kind.prefix()).filter(|_| kind.is_process()) else {
        return Vec::new();
    };

    let numprocs = match template.get("numprocs").map(|v| v.trim().parse::<i64>()) {
        Some(Ok(n)) if n < 1 => {
            warn!("[{program}] numprocs={n} is invalid, using 1");
            1
        }
        Some(Ok(n)) if n > MAX_NUMPROCS => {
            warn!("[{program}] numprocs={n} exceeds {MAX_NUMPROCS}, skipping program");
            return Vec::new();
        }
        Some(Ok(n)) => n,
        _ => 1,
    };

    let pattern = template
        .get("process_name")
        .cloned()
        .unwrap_or_else(|| "%(program_name)s".to_string());
    if numprocs > 1 && !pattern.contains("%(process_num)") {
        warn!("[{program}] numprocs={numprocs} but process_name {pattern:?} has no %(process_num)");
    }

    let group = groups.group_of_or_insert(program, program);
    let host = host_node_name();
    let mut instances = Vec::new();

    for num in 1..=numprocs {
        let mut expression = Expression::new()
            .with("program_name", program)
            .with("process_num", num.to_string())
            .with("group_name", group.as_str())
            .with("here", config_dir.to_string_lossy())
            .with("host_node_name", host.as_str());
        for (k, v) in std::env::vars() {
            expression.bind(format!("ENV_{k}"), v);
        }

        let command = match expression.eval(template.get("command").map_or("", String::as_str)) {
            Ok(command) => command,
            Err(e) => {
                warn!("[{program}] skipping instance {num}: command: {e}");
                continue;
            }
        };
        let process_name = match expression.eval(&pattern) {
            Ok(process_name) => process_name,
            Err(e) => {
                warn!("[{program}] skipping instance {num}: process_name: {e}");
                continue;
            }
        };

        let mut values = template.clone();
        values.insert("command".to_string(), command);
        values.insert("process_name".to_string(), process_name.clone());
        values.insert("numprocs_start".to_string(), (num - 1).to_string());
        values.insert("process_num".to_string(), num.to_string());

        let mut entry = ConfigEntry::new(
            format!("{}{process_name}", kind.prefix()),
            config_dir,
            values,
        );
        entry.group = group.clone();
        debug!("[{program}] instance {num} -> {}", entry.name);
        instances.push(entry);
    }
    instances
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn template(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_single_instance_defaults_to_program_name() {
        let mut groups = GroupIndex::new();
        let out = expand(
            "program:web",
            &template(&[("command", "/bin/web")]),
            Path::new("/etc"),
            &mut groups,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "program:web");
        assert_eq!(out[0].group, "web");
        assert_eq!(out[0].get("process_num"), Some("1"));
        assert_eq!(out[0].get("numprocs_start"), Some("0"));
        assert_eq!(groups.group_of("web"), Some("web"));
    }

    #[test]
    fn test_numprocs_fan_out() {
        let mut groups = GroupIndex::new();
        let out = expand(
            "program:web",
            &template(&[
                ("command", "/bin/web --id %(process_num)d"),
                ("numprocs", "3"),
                ("process_name", "%(program_name)s_%(process_num)d"),
            ]),
            Path::new("/etc"),
            &mut groups,
        );
        let names: Vec<&str> = out.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["program:web_1", "program:web_2", "program:web_3"]);
        let commands: Vec<&str> = out.iter().filter_map(|e| e.get("command")).collect();
        assert_eq!(
            commands,
            ["/bin/web --id 1", "/bin/web --id 2", "/bin/web --id 3"]
        );
        for (i, e) in out.iter().enumerate() {
            assert_eq!(e.get("process_num"), Some((i + 1).to_string().as_str()));
            assert_eq!(e.get("numprocs_start"), Some(i.to_string().as_str()));
            assert_eq!(e.group, "web");
        }
        let distinct: BTreeSet<&str> = names.iter().copied().collect();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn test_existing_group_is_kept() {
        let mut groups = GroupIndex::new();
        groups.add("core", "api");
        let out = expand(
            "program:api",
            &template(&[("command", "/bin/api %(group_name)s")]),
            Path::new("/etc"),
            &mut groups,
        );
        assert_eq!(out[0].group, "core");
        assert_eq!(out[0].get("command"), Some("/bin/api core"));
    }

    #[test]
    fn test_bad_command_skips_instance() {
        let mut groups = GroupIndex::new();
        let out = expand(
            "program:web",
            &template(&[("command", "/bin/web %(nope)s")]),
            Path::new("/etc"),
            &mut groups,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_invalid_numprocs() {
        let mut groups = GroupIndex::new();
        for n in ["0", "-2", "many"] {
            let out = expand(
                "program:web",
                &template(&[("command", "/bin/web"), ("numprocs", n)]),
                Path::new("/etc"),
                &mut groups,
            );
            assert_eq!(out.len(), 1, "numprocs={n}");
        }
    }

    #[test]
    fn test_numprocs_over_limit_skips_program() {
        let mut groups = GroupIndex::new();
        for n in ["10001", "1000000000000000000"] {
            let out = expand(
                "program:web",
                &template(&[("command", "/bin/web"), ("numprocs", n)]),
                Path::new("/etc"),
                &mut groups,
            );
            assert!(out.is_empty(), "numprocs={n}");
        }
    }

    #[test]
    fn test_event_listener_keeps_prefix() {
        let mut groups = GroupIndex::new();
        let out = expand(
            "eventlistener:ev",
            &template(&[("command", "/bin/ev")]),
            Path::new("/etc"),
            &mut groups,
        );
        assert_eq!(out[0].name, "eventlistener:ev");
    }

    #[test]
    fn test_template_keys_are_copied() {
        let mut groups = GroupIndex::new();
        let out = expand(
            "program:web",
            &template(&[("command", "/bin/web"), ("autostart", "false")]),
            Path::new("/etc"),
            &mut groups,
        );
        assert_eq!(out[0].get("autostart"), Some("false"));
        assert_eq!(out[0].config_dir(), Path::new("/etc"));
    }

    #[test]
    fn test_not_a_process_section() {
        let mut groups = GroupIndex::new();
        assert!(expand("group:x", &BTreeMap::new(), Path::new("/"), &mut groups).is_empty());
        assert!(groups.groups().is_empty());
    }
}
