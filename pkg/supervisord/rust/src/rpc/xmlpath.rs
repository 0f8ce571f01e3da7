// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Push parser keyed by element paths.
//!
//! A pattern is a `/`-separated chain of tag names from the document root,
//! where `*` matches any single tag. Boundary callbacks fire when a matching
//! element opens and closes; leaf callbacks fire when a matching element
//! without child elements closes, with its text. Callbacks receive the
//! caller's state explicitly, so one matcher can be reused across documents.

use quick_xml::Reader;
use quick_xml::events::Event;

use super::value::{malformed, resolve_reference};
use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Open,
    Close,
}

/// A matched element without child elements.
#[derive(Debug, Clone, Copy)]
pub struct Leaf<'a> {
    pub name: &'a str,
    pub text: &'a str,
}

type LeafFn<S> = Box<dyn Fn(&mut S, Leaf<'_>) -> Result<()> + Send + Sync>;
type BoundaryFn<S> = Box<dyn Fn(&mut S, Boundary) -> Result<()> + Send + Sync>;

pub struct PathMatcher<S> {
    leaves: Vec<(Vec<String>, LeafFn<S>)>,
    boundaries: Vec<(Vec<String>, BoundaryFn<S>)>,
}

impl<S> Default for PathMatcher<S> {
    fn default() -> Self {
        Self {
            leaves: Vec::new(),
            boundaries: Vec::new(),
        }
    }
}

fn split(pattern: &str) -> Vec<String> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn matches(pattern: &[String], path: &[String]) -> bool {
    pattern.len() == path.len() && pattern.iter().zip(path).all(|(p, s)| p == "*" || p == s)
}

struct Open {
    name: String,
    text: String,
    has_children: bool,
}

impl<S> PathMatcher<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_leaf(
        mut self,
        pattern: &str,
        f: impl Fn(&mut S, Leaf<'_>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.leaves.push((split(pattern), Box::new(f)));
        self
    }

    pub fn on_boundary(
        mut self,
        pattern: &str,
        f: impl Fn(&mut S, Boundary) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.boundaries.push((split(pattern), Box::new(f)));
        self
    }

    fn boundary(&self, path: &[String], state: &mut S, edge: Boundary) -> Result<()> {
        for (pattern, f) in &self.boundaries {
            if matches(pattern, path) {
                f(state, edge)?;
            }
        }
        Ok(())
    }

    fn open(
        &self,
        path: &mut Vec<String>,
        stack: &mut Vec<Open>,
        name: String,
        state: &mut S,
    ) -> Result<()> {
        if let Some(parent) = stack.last_mut() {
            parent.has_children = true;
        }
        path.push(name.clone());
        stack.push(Open {
            name,
            text: String::new(),
            has_children: false,
        });
        self.boundary(path, state, Boundary::Open)
    }

    fn close(&self, path: &mut Vec<String>, stack: &mut Vec<Open>, state: &mut S) -> Result<()> {
        let element = stack.pop().ok_or_else(|| malformed("unbalanced end tag"))?;
        if !element.has_children {
            let leaf = Leaf {
                name: &element.name,
                text: &element.text,
            };
            for (pattern, f) in &self.leaves {
                if matches(pattern, path) {
                    f(state, leaf)?;
                }
            }
        }
        self.boundary(path, state, Boundary::Close)?;
        path.pop();
        Ok(())
    }

    /// Walk `xml`, invoking callbacks on `state`. Stops at the first callback
    /// error; malformed XML is a `MalformedReply`.
    pub fn feed(&self, xml: &str, state: &mut S) -> Result<()> {
        let mut reader = Reader::from_str(xml);
        let mut path = Vec::new();
        let mut stack = Vec::new();
        let mut seen_root = false;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| malformed(format!("at byte {}: {e}", reader.error_position())))?;
            match event {
                Event::Start(e) | Event::Empty(e) if stack.is_empty() && seen_root => {
                    return Err(malformed(format!(
                        "second root element <{}>",
                        String::from_utf8_lossy(e.name().as_ref())
                    )));
                }
                Event::Start(e) => {
                    seen_root = true;
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    self.open(&mut path, &mut stack, name, state)?;
                }
                Event::Empty(e) => {
                    seen_root = true;
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    self.open(&mut path, &mut stack, name, state)?;
                    self.close(&mut path, &mut stack, state)?;
                }
                Event::End(_) => self.close(&mut path, &mut stack, state)?,
                Event::Text(t) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&t));
                    }
                }
                Event::CData(c) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Event::GeneralRef(r) => {
                    if let Some(top) = stack.last_mut() {
                        top.text
                            .push_str(&resolve_reference(&String::from_utf8_lossy(&r))?);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(malformed(format!("unclosed <{}>", open.name)));
        }
        if !seen_root {
            return Err(malformed("empty document"));
        }
        Ok(())
    }
}
