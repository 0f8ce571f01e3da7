// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::entry::{ConfigEntry, EntryKind};
use crate::errors::{Error, Result};
use crate::expand::expand;
use crate::expr::Expression;
use crate::group::GroupIndex;
use crate::ini::Ini;
use crate::program::DEFAULT_PRIORITY;

/// Every section of one configuration load, plus the program → group index.
///
/// A store is immutable once loaded; a reload builds a new one.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    path: PathBuf,
    entries: BTreeMap<String, ConfigEntry>,
    groups: GroupIndex,
}

impl ConfigStore {
    /// A store with no sections, standing in for "nothing loaded yet".
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Read `path` and every file matched by its `[include] files` patterns.
    pub fn load(path: &Path) -> Result<Self> {
        let mut ini = Ini::read(path)?;
        let config_dir = config_dir_of(path);

        for include in include_files(&ini, &config_dir)? {
            debug!("including {}", include.display());
            ini.merge(Ini::read(&include)?);
        }

        let mut store = ConfigStore::empty(path);
        store.parse(&ini, &config_dir)?;
        info!(
            "loaded {}: {} processes in {} groups",
            path.display(),
            store.process_names().len(),
            store.groups.groups().len()
        );
        Ok(store)
    }

    fn parse(&mut self, ini: &Ini, config_dir: &Path) -> Result<()> {
        for section in ini.sections() {
            if EntryKind::of(&section.name) != EntryKind::Group {
                continue;
            }
            let entry = ConfigEntry::new(&section.name, config_dir, section.values.clone());
            if let Some(group) = entry.group_name() {
                for program in entry.programs() {
                    self.groups.add(group, &program);
                }
            }
            self.entries.insert(section.name.clone(), entry);
        }

        for section in ini.sections() {
            if !EntryKind::of(&section.name).is_process() {
                continue;
            }
            for instance in expand(&section.name, &section.values, config_dir, &mut self.groups) {
                let process = instance.process_name().unwrap_or_default();
                if self.program(process).is_some() {
                    return Err(Error::config_load(
                        &self.path,
                        format!("duplicate process name {process}"),
                    ));
                }
                self.entries.insert(instance.name.clone(), instance);
            }
        }

        for section in ini.sections() {
            let kind = EntryKind::of(&section.name);
            if kind == EntryKind::Group || kind.is_process() {
                continue;
            }
            self.entries.insert(
                section.name.clone(),
                ConfigEntry::new(&section.name, config_dir, section.values.clone()),
            );
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config_dir(&self) -> PathBuf {
        config_dir_of(&self.path)
    }

    pub fn entry(&self, name: &str) -> Option<&ConfigEntry> {
        self.entries.get(name)
    }

    pub fn supervisord(&self) -> Option<&ConfigEntry> {
        self.entry("supervisord")
    }

    pub fn unix_http_server(&self) -> Option<&ConfigEntry> {
        self.entry("unix_http_server")
    }

    pub fn inet_http_server(&self) -> Option<&ConfigEntry> {
        self.entry("inet_http_server")
    }

    pub fn group_entries(&self) -> Vec<&ConfigEntry> {
        self.of_kind(EntryKind::Group)
    }

    /// Program instances by ascending `priority`, then name.
    pub fn programs(&self) -> Vec<&ConfigEntry> {
        let mut programs = self.of_kind(EntryKind::Program);
        programs.sort_by_key(|e| (e.get_int("priority", DEFAULT_PRIORITY), e.name.clone()));
        programs
    }

    pub fn event_listeners(&self) -> Vec<&ConfigEntry> {
        self.of_kind(EntryKind::EventListener)
    }

    /// Event listeners first, then programs in priority order.
    pub fn processes(&self) -> Vec<&ConfigEntry> {
        let mut all = self.event_listeners();
        all.extend(self.programs());
        all
    }

    pub fn process_names(&self) -> Vec<String> {
        self.processes()
            .into_iter()
            .filter_map(|e| e.process_name().map(str::to_string))
            .collect()
    }

    /// The program or event listener instance called `name`.
    pub fn program(&self, name: &str) -> Option<&ConfigEntry> {
        self.entries
            .values()
            .find(|e| e.kind().is_process() && e.process_name() == Some(name))
    }

    pub fn group_index(&self) -> &GroupIndex {
        &self.groups
    }

    fn of_kind(&self, kind: EntryKind) -> Vec<&ConfigEntry> {
        self.entries.values().filter(|e| e.kind() == kind).collect()
    }
}

fn config_dir_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn has_wildcard(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Files named by `[include] files`, in sorted order.
fn include_files(ini: &Ini, config_dir: &Path) -> Result<Vec<PathBuf>> {
    let Some(files) = ini.section("include").and_then(|s| s.values.get("files")) else {
        return Ok(Vec::new());
    };
    let here = Expression::new().with("here", config_dir.to_string_lossy());

    let mut out = Vec::new();
    for raw in files.split_whitespace() {
        let pattern = match here.eval(raw) {
            Ok(p) => p,
            Err(e) => {
                warn!("skipping include {raw:?}: {e}");
                continue;
            }
        };
        let pattern = config_dir.join(pattern);
        let mut matched = expand_glob(&pattern);
        if matched.is_empty() && !has_wildcard(&pattern.to_string_lossy()) {
            // Reported by the reader as a load error.
            matched.push(pattern);
        }
        matched.sort();
        out.extend(matched);
    }
    Ok(out)
}

/// Match `pattern` one path segment at a time. Wildcards never cross `/`.
fn expand_glob(pattern: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::new()];
    for component in pattern.components() {
        let segment = match component {
            Component::Normal(s) => s.to_string_lossy().into_owned(),
            other => {
                for c in &mut candidates {
                    c.push(other.as_os_str());
                }
                continue;
            }
        };

        if !has_wildcard(&segment) {
            for c in &mut candidates {
                c.push(&segment);
            }
            continue;
        }

        let mut next = Vec::new();
        for dir in &candidates {
            let listing = if dir.as_os_str().is_empty() {
                Path::new(".")
            } else {
                dir.as_path()
            };
            let Ok(read) = std::fs::read_dir(listing) else {
                continue;
            };
            let mut names: Vec<String> = read
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().into_string().ok())
                .filter(|name| glob_match::glob_match(&segment, name))
                .collect();
            names.sort();
            next.extend(names.into_iter().map(|name| dir.join(name)));
        }
        candidates = next;
    }
    candidates.retain(|p| p.is_file());
    candidates
}
