// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! The `reloadConfig` reply: one array holding the added, changed and
//! removed group lists, in that order.

use std::sync::LazyLock;

use super::value::{self, Value, malformed};
use super::xmlpath::{Boundary, Leaf, PathMatcher};
use crate::errors::Result;
use crate::group::GroupDiff;

const OUTER: &str = "methodResponse/params/param/value/array/data";
const INNER: &str = "methodResponse/params/param/value/array/data/value/array/data";
const LISTS: usize = 3;

#[derive(Default)]
struct Decoding {
    outer_seen: bool,
    fault: bool,
    lists: Vec<Vec<String>>,
}

impl Decoding {
    fn push(&mut self, leaf: Leaf<'_>) -> Result<()> {
        let list = self
            .lists
            .last_mut()
            .ok_or_else(|| malformed("value outside of an inner array"))?;
        list.push(leaf.text.to_string());
        Ok(())
    }
}

fn direct_leaf(_: &mut Decoding, leaf: Leaf<'_>) -> Result<()> {
    Err(malformed(format!(
        "{} {:?} directly in the outer array",
        leaf.name, leaf.text
    )))
}

static MATCHER: LazyLock<PathMatcher<Decoding>> = LazyLock::new(|| {
    PathMatcher::new()
        .on_boundary("methodResponse/fault", |s: &mut Decoding, edge| {
            if edge == Boundary::Open {
                s.fault = true;
            }
            Ok(())
        })
        .on_boundary(OUTER, |s: &mut Decoding, edge| {
            if edge == Boundary::Open {
                s.outer_seen = true;
            }
            Ok(())
        })
        .on_boundary(INNER, |s: &mut Decoding, edge| {
            if edge == Boundary::Open {
                if s.lists.len() == LISTS {
                    return Err(malformed("more than three inner arrays"));
                }
                s.lists.push(Vec::new());
            }
            Ok(())
        })
        .on_leaf(&format!("{OUTER}/value"), direct_leaf)
        .on_leaf(&format!("{OUTER}/value/*"), direct_leaf)
        .on_leaf(&format!("{INNER}/value"), |s: &mut Decoding, leaf| s.push(leaf))
        .on_leaf(&format!("{INNER}/value/*"), |s: &mut Decoding, leaf| {
            s.push(leaf)
        })
});

/// Decode a `reloadConfig` reply into its group diff. Missing trailing lists
/// are empty.
pub fn decode_reload(body: &str) -> Result<GroupDiff> {
    let mut state = Decoding::default();
    MATCHER.feed(body, &mut state)?;
    if state.fault {
        // Surfaces the fault code and string.
        value::decode_response(body)?;
        return Err(malformed("fault without details"));
    }
    if !state.outer_seen {
        return Err(malformed("reply is not an array"));
    }

    let mut lists = state.lists.into_iter();
    Ok(GroupDiff {
        added: lists.next().unwrap_or_default(),
        changed: lists.next().unwrap_or_default(),
        removed: lists.next().unwrap_or_default(),
    })
}

/// The value `reloadConfig` returns for `diff`.
pub fn reload_value(diff: &GroupDiff) -> Value {
    Value::Array(vec![
        Value::from(diff.added.clone()),
        Value::from(diff.changed.clone()),
        Value::from(diff.removed.clone()),
    ])
}

pub fn encode_reload(diff: &GroupDiff) -> String {
    value::encode_response(&reload_value(diff))
}
