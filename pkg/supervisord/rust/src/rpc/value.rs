// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! The XML-RPC value kinds supervisord exchanges, and the `methodCall` /
//! `methodResponse` documents that carry them.

use quick_xml::Reader;
use quick_xml::escape::{escape, resolve_xml_entity};
use quick_xml::events::Event;
use std::collections::BTreeMap;

use crate::errors::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    String(String),
    Double(f64),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
    Nil,
}

impl Value {
    /// Build a struct from `(member, value)` pairs.
    pub fn members<I, K>(members: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Struct(members.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Struct member lookup.
    pub fn get(&self, member: &str) -> Option<&Value> {
        match self {
            Value::Struct(members) => members.get(member),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "boolean",
            Value::String(_) => "string",
            Value::Double(_) => "double",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
            Value::Nil => "nil",
        }
    }

    fn write(&self, out: &mut String) {
        out.push_str("<value>");
        match self {
            Value::Int(n) => out.push_str(&format!("<int>{n}</int>")),
            Value::Bool(b) => out.push_str(&format!("<boolean>{}</boolean>", u8::from(*b))),
            Value::String(s) => {
                out.push_str("<string>");
                out.push_str(&escape(s.as_str()));
                out.push_str("</string>");
            }
            Value::Double(d) => out.push_str(&format!("<double>{d}</double>")),
            Value::Array(items) => {
                out.push_str("<array><data>");
                for item in items {
                    item.write(out);
                }
                out.push_str("</data></array>");
            }
            Value::Struct(members) => {
                out.push_str("<struct>");
                for (name, value) in members {
                    out.push_str("<member><name>");
                    out.push_str(&escape(name.as_str()));
                    out.push_str("</name>");
                    value.write(out);
                    out.push_str("</member>");
                }
                out.push_str("</struct>");
            }
            Value::Nil => out.push_str("<nil/>"),
        }
        out.push_str("</value>");
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n.into())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

const PROLOG: &str = "<?xml version=\"1.0\"?>\n";

pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::from(PROLOG);
    out.push_str("<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        param.write(&mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>\n");
    out
}

pub fn encode_response(value: &Value) -> String {
    let mut out = String::from(PROLOG);
    out.push_str("<methodResponse><params><param>");
    value.write(&mut out);
    out.push_str("</param></params></methodResponse>\n");
    out
}

pub fn encode_fault(code: i32, message: &str) -> String {
    let mut out = String::from(PROLOG);
    out.push_str("<methodResponse><fault>");
    Value::members([("faultCode", Value::from(code)), ("faultString", message.into())])
        .write(&mut out);
    out.push_str("</fault></methodResponse>\n");
    out
}

/// Decode a `methodCall` into its method name and parameters.
pub fn decode_call(xml: &str) -> Result<(String, Vec<Value>)> {
    let root = parse_document(xml)?;
    if root.name != "methodCall" {
        return Err(malformed(format!("expected methodCall, got <{}>", root.name)));
    }
    let method = root.child("methodName")?.text.trim().to_string();
    if method.is_empty() {
        return Err(malformed("empty methodName"));
    }
    let params = match root.children.iter().find(|c| c.name == "params") {
        Some(params) => params
            .children_named("param")
            .map(|p| value_of(p.child("value")?))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    Ok((method, params))
}

/// Decode a `methodResponse`. A fault comes back as [`Error::Fault`].
pub fn decode_response(xml: &str) -> Result<Value> {
    let root = parse_document(xml)?;
    if root.name != "methodResponse" {
        return Err(malformed(format!(
            "expected methodResponse, got <{}>",
            root.name
        )));
    }
    if let Some(fault) = root.children.iter().find(|c| c.name == "fault") {
        let fault = value_of(fault.child("value")?)?;
        let code = fault
            .get("faultCode")
            .and_then(Value::as_int)
            .ok_or_else(|| malformed("fault without faultCode"))?;
        return Err(Error::Fault {
            code: i32::try_from(code).unwrap_or(i32::MAX),
            message: fault
                .get("faultString")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }
    value_of(root.child("params")?.child("param")?.child("value")?)
}

pub(crate) fn malformed(reason: impl ToString) -> Error {
    Error::MalformedReply(reason.to_string())
}

#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn child(&self, name: &str) -> Result<&Element> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| malformed(format!("<{}> has no <{name}>", self.name)))
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn value_of(value: &Element) -> Result<Value> {
    let Some(typed) = value.children.first() else {
        return Ok(Value::String(value.text.clone()));
    };
    let text = typed.text.trim();
    match typed.name.as_str() {
        "int" | "i4" | "i8" => text
            .parse()
            .map(Value::Int)
            .map_err(|_| malformed(format!("bad int {text:?}"))),
        "boolean" => match text {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            _ => Err(malformed(format!("bad boolean {text:?}"))),
        },
        "double" => text
            .parse()
            .map(Value::Double)
            .map_err(|_| malformed(format!("bad double {text:?}"))),
        "string" | "base64" | "dateTime.iso8601" => Ok(Value::String(typed.text.clone())),
        "nil" => Ok(Value::Nil),
        "array" => match typed.children.iter().find(|c| c.name == "data") {
            Some(data) => data
                .children_named("value")
                .map(value_of)
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            None => Ok(Value::Array(Vec::new())),
        },
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.children_named("member") {
                let name = member.child("name")?.text.trim().to_string();
                members.insert(name, value_of(member.child("value")?)?);
            }
            Ok(Value::Struct(members))
        }
        other => Err(malformed(format!("unsupported value type <{other}>"))),
    }
}

fn tag_name(raw: &[u8]) -> Result<String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| malformed(e.to_string()))
}

/// Text of a `&name;` or `&#NN;` reference.
pub(crate) fn resolve_reference(name: &str) -> Result<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => num.parse().ok(),
        };
        return code
            .and_then(char::from_u32)
            .map(String::from)
            .ok_or_else(|| malformed(format!("bad character reference &{name};")));
    }
    resolve_xml_entity(name)
        .map(str::to_string)
        .ok_or_else(|| malformed(format!("unknown entity &{name};")))
}

fn parse_document(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event().map_err(|e| {
            malformed(format!("at byte {}: {e}", reader.error_position()))
        })? {
            Event::Start(e) => stack.push(Element {
                name: tag_name(e.name().as_ref())?,
                ..Default::default()
            }),
            Event::Empty(e) => {
                let element = Element {
                    name: tag_name(e.name().as_ref())?,
                    ..Default::default()
                };
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed("unbalanced end tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text
                        .push_str(std::str::from_utf8(&t).map_err(|e| malformed(e.to_string()))?);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    let raw = c.into_inner();
                    top.text
                        .push_str(std::str::from_utf8(&raw).map_err(|e| malformed(e.to_string()))?);
                }
            }
            Event::GeneralRef(r) => {
                if let Some(top) = stack.last_mut() {
                    let name = std::str::from_utf8(&r).map_err(|e| malformed(e.to_string()))?;
                    top.text.push_str(&resolve_reference(name)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(malformed(format!("unclosed <{}>", open.name)));
    }
    root.ok_or_else(|| malformed("empty document"))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(malformed("more than one root element")),
    }
    Ok(())
}
