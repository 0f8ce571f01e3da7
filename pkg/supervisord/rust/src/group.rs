// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Program → group membership.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Groups that differ between two loads. The three lists are disjoint and
/// sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDiff {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

impl GroupDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Each program belongs to exactly one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupIndex {
    groups: BTreeMap<String, String>,
}

impl GroupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `program` into `group`, moving it out of any previous group.
    pub fn add(&mut self, group: &str, program: &str) {
        self.groups.insert(program.to_string(), group.to_string());
    }

    pub fn remove(&mut self, program: &str) {
        self.groups.remove(program);
    }

    pub fn group_of(&self, program: &str) -> Option<&str> {
        self.groups.get(program).map(String::as_str)
    }

    /// Group of `program`, recording `default` as its group if it has none yet.
    pub fn group_of_or_insert(&mut self, program: &str, default: &str) -> String {
        self.groups
            .entry(program.to_string())
            .or_insert_with(|| default.to_string())
            .clone()
    }

    pub fn in_group(&self, program: &str, group: &str) -> bool {
        self.group_of(program) == Some(group)
    }

    /// Distinct group names, sorted.
    pub fn groups(&self) -> Vec<String> {
        self.groups
            .values()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Programs of `group`, sorted.
    pub fn programs_in(&self, group: &str) -> Vec<String> {
        self.groups
            .iter()
            .filter(|(_, g)| g.as_str() == group)
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.groups.iter().map(|(p, g)| (g.as_str(), p.as_str()))
    }

    /// What changed going from `previous` to `self`.
    pub fn diff(&self, previous: &GroupIndex) -> GroupDiff {
        let now: BTreeSet<String> = self.groups().into_iter().collect();
        let before: BTreeSet<String> = previous.groups().into_iter().collect();

        GroupDiff {
            added: now.difference(&before).cloned().collect(),
            changed: now
                .intersection(&before)
                .filter(|g| self.programs_in(g) != previous.programs_in(g))
                .cloned()
                .collect(),
            removed: before.difference(&now).cloned().collect(),
        }
    }
}

impl fmt::Display for GroupIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for group in self.groups() {
            write!(f, "{group}:{};", self.programs_in(&group).join(","))?;
        }
        Ok(())
    }
}
