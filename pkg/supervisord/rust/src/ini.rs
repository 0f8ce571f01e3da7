// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Reader for the ini dialect used by supervisord configuration files.
//!
//! Supported: `[section]` headers, `key = value` and `key: value` pairs,
//! whole-line `;`/`#` comments, inline comments introduced by whitespace
//! followed by `;` or `#`, and indented continuation lines appended to the
//! previous value.

use nom::{
    IResult, Parser,
    bytes::complete::{take_till1, take_while1},
    character::complete::{char, one_of, space0},
    combinator::{eof, rest, value},
    sequence::delimited,
};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::errors::{Error, Result};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("line {line}: {reason}")]
pub struct ParseError {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniSection {
    pub name: String,
    pub values: BTreeMap<String, String>,
}

/// Sections in first-appearance order. Same-named sections are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ini {
    sections: Vec<IniSection>,
}

enum Line<'a> {
    Blank,
    Section(&'a str),
    Pair(&'a str, &'a str),
}

impl Ini {
    pub fn parse(text: &str) -> std::result::Result<Self, ParseError> {
        let mut ini = Ini::default();
        let mut current: Option<usize> = None;
        let mut last_key: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let indented = raw.starts_with([' ', '\t']);

            if indented
                && let (Some(section), Some(key)) = (current, last_key.as_ref())
                && !raw.trim().is_empty()
                && !is_comment(raw)
            {
                let extra = strip_inline_comment(raw).trim();
                if let Some(v) = ini.sections[section].values.get_mut(key) {
                    if !v.is_empty() {
                        v.push('\n');
                    }
                    v.push_str(extra);
                }
                continue;
            }

            match parse_line(raw) {
                Some(Line::Blank) => last_key = None,
                Some(Line::Section(name)) => {
                    current = Some(ini.section_index(name));
                    last_key = None;
                }
                Some(Line::Pair(key, val)) => {
                    let Some(section) = current else {
                        return Err(ParseError {
                            line: line_no,
                            reason: format!("key {key:?} outside of any section"),
                        });
                    };
                    let val = strip_inline_comment(val).trim().to_string();
                    ini.sections[section].values.insert(key.to_string(), val);
                    last_key = Some(key.to_string());
                }
                None => {
                    return Err(ParseError {
                        line: line_no,
                        reason: format!("cannot parse {:?}", raw.trim()),
                    });
                }
            }
        }
        Ok(ini)
    }

    /// Parse a file, mapping every failure to a configuration load error.
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::config_load(path, e))?;
        Ini::parse(&text).map_err(|e| Error::config_load(path, e))
    }

    /// Fold `other` into `self`: sections merge by name, later keys win.
    pub fn merge(&mut self, other: Ini) {
        for section in other.sections {
            let idx = self.section_index(&section.name);
            self.sections[idx].values.extend(section.values);
        }
    }

    pub fn sections(&self) -> impl Iterator<Item = &IniSection> {
        self.sections.iter()
    }

    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    fn section_index(&mut self, name: &str) -> usize {
        if let Some(idx) = self.sections.iter().position(|s| s.name == name) {
            return idx;
        }
        self.sections.push(IniSection {
            name: name.to_string(),
            values: BTreeMap::new(),
        });
        self.sections.len() - 1
    }
}

fn is_comment(line: &str) -> bool {
    comment_parser(line).is_ok()
}

fn parse_line(line: &str) -> Option<Line<'_>> {
    if line.trim().is_empty() || is_comment(line) {
        return Some(Line::Blank);
    }
    if let Ok((tail, name)) = section_parser(line) {
        let tail = tail.trim_start();
        if tail.is_empty() || tail.starts_with([';', '#']) {
            return Some(Line::Section(name));
        }
        return None;
    }
    pair_parser(line).ok().map(|(_, (k, v))| Line::Pair(k, v))
}

fn comment_parser(input: &str) -> IResult<&str, ()> {
    let (input, _) = space0(input)?;
    value((), one_of(";#")).parse(input)
}

fn section_parser(input: &str) -> IResult<&str, &str> {
    let (input, _) = space0(input)?;
    let (input, name) = delimited(char('['), take_till1(|c: char| c == ']'), char(']')).parse(input)?;
    Ok((input, name.trim()))
}

fn pair_parser(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, _) = space0(input)?;
    let (input, key) = take_while1(|c: char| c != '=' && c != ':').parse(input)?;
    let key = key.trim();
    if key.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::TakeWhile1,
        )));
    }
    let (input, _) = one_of("=:").parse(input)?;
    let (input, val) = rest(input)?;
    let (input, _) = eof(input)?;
    Ok((input, (key, val)))
}

/// Cut at the first `;` or `#` that follows whitespace.
fn strip_inline_comment(value: &str) -> &str {
    let mut prev_ws = false;
    for (i, c) in value.char_indices() {
        if prev_ws && (c == ';' || c == '#') {
            return &value[..i];
        }
        prev_ws = c.is_whitespace();
    }
    value
}
