// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use log::warn;
use std::collections::HashSet;

use crate::config::ConfigStore;
use crate::program::ProgramDescriptor;

/// What to apply to the runtime to move it to a newly loaded store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Every process of the new store, existing or not.
    pub to_create: Vec<ProgramDescriptor>,
    /// Previously known names absent from the new store, in previous order.
    pub to_remove: Vec<String>,
}

pub fn reconcile(previous: &[String], store: &ConfigStore) -> Plan {
    let current: HashSet<String> = store.process_names().into_iter().collect();

    let to_remove = previous
        .iter()
        .filter(|name| !current.contains(*name))
        .cloned()
        .collect();

    let to_create = store
        .processes()
        .into_iter()
        .filter_map(|entry| match ProgramDescriptor::from_entry(entry) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                warn!("[{}] skipped: {e}", entry.name);
                None
            }
        })
        .collect();

    Plan {
        to_create,
        to_remove,
    }
}
