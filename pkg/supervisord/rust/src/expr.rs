// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! `%(name)s` placeholder substitution for configuration values.

use crate::errors::{Error, Result};
use std::collections::HashMap;

/// Widest field a placeholder may pad to.
pub const MAX_PAD_WIDTH: usize = 256;

/// A fixed set of name → value bindings applied to configuration strings.
///
/// Substitution is single pass: a substituted value is never scanned again.
#[derive(Debug, Clone, Default)]
pub struct Expression {
    bindings: HashMap<String, String>,
}

impl Expression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.bind(name, value);
        self
    }

    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.bindings.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.bindings.get(name).map(String::as_str)
    }

    /// Substitute every `%(name)<width><conv>` in `input`.
    ///
    /// `conv` is `s` or `d`; `width` is optional and zero-pads `d` values when
    /// it starts with `0`. A `%` not followed by `(` is kept as is.
    pub fn eval(&self, input: &str) -> Result<String> {
        let malformed = || Error::MalformedPlaceholder {
            expr: input.to_string(),
        };

        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(pos) = rest.find("%(") {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 2..];
            let close = after.find(')').ok_or_else(malformed)?;
            let name = &after[..close];
            let spec = &after[close + 1..];
            let width_len = spec.bytes().take_while(u8::is_ascii_digit).count();
            let width = &spec[..width_len];
            let conv = spec[width_len..].chars().next().ok_or_else(malformed)?;

            let value = self
                .bindings
                .get(name)
                .ok_or_else(|| Error::UnknownPlaceholder {
                    name: name.to_string(),
                })?;
            let pad: usize = if width.is_empty() {
                0
            } else {
                width.parse().map_err(|_| malformed())?
            };
            if pad > MAX_PAD_WIDTH {
                return Err(malformed());
            }

            match conv {
                's' => out.push_str(&format!("{value:>pad$}")),
                'd' | 'i' => {
                    let n: i64 = value.trim().parse().map_err(|_| malformed())?;
                    if width.starts_with('0') {
                        out.push_str(&format!("{n:0pad$}"));
                    } else {
                        out.push_str(&format!("{n:pad$}"));
                    }
                }
                _ => return Err(malformed()),
            }
            rest = &spec[width_len + conv.len_utf8()..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Host name bound as `host_node_name`.
pub fn host_node_name() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "Unknown".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn env() -> Expression {
        Expression::new()
            .with("program_name", "web")
            .with("process_num", "3")
            .with("here", "/etc/supervisor")
    }

    #[test]
    fn test_substitutes_string_and_number() {
        assert_eq!(
            env().eval("%(program_name)s_%(process_num)d").unwrap(),
            "web_3"
        );
        assert_eq!(
            env().eval("%(here)s/conf.d/*.conf").unwrap(),
            "/etc/supervisor/conf.d/*.conf"
        );
    }

    #[test]
    fn test_zero_padded_width() {
        assert_eq!(env().eval("w%(process_num)02d").unwrap(), "w03");
        assert_eq!(env().eval("[%(process_num)3d]").unwrap(), "[  3]");
    }

    #[test]
    fn test_oversized_width_is_malformed() {
        for bad in ["%(process_num)999999999999d", "%(program_name)257s"] {
            assert!(
                matches!(env().eval(bad), Err(Error::MalformedPlaceholder { .. })),
                "{bad} should be malformed"
            );
        }
        assert_eq!(env().eval("%(process_num)0256d").unwrap().len(), 256);
    }

    #[test]
    fn test_unknown_placeholder() {
        let err = env().eval("%(group_name)s").unwrap_err();
        assert!(matches!(err, Error::UnknownPlaceholder { ref name } if name == "group_name"));
    }

    #[test]
    fn test_malformed_placeholders() {
        for bad in ["%(program_name", "%(program_name)", "%(program_name)x", "%(program_name)d"] {
            assert!(
                matches!(env().eval(bad), Err(Error::MalformedPlaceholder { .. })),
                "{bad} should be malformed"
            );
        }
    }

    #[test]
    fn test_lone_percent_is_literal() {
        assert_eq!(env().eval("date +%s 100%").unwrap(), "date +%s 100%");
    }

    #[test]
    fn test_not_recursive() {
        let e = Expression::new()
            .with("a", "%(b)s")
            .with("b", "never");
        assert_eq!(e.eval("x%(a)sy").unwrap(), "x%(b)sy");
    }

    #[test]
    fn test_no_placeholders() {
        assert_eq!(Expression::new().eval("/bin/cat").unwrap(), "/bin/cat");
    }

    #[test]
    fn test_host_node_name_is_not_empty() {
        assert!(!host_node_name().is_empty());
    }
}
