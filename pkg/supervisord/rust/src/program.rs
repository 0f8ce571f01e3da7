// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till, take_while1},
    character::complete::{anychar, char},
    combinator::{map, opt},
    multi::{many0, many1},
    sequence::{delimited, preceded},
};
use std::path::PathBuf;

use crate::entry::{ConfigEntry, EntryKind};
use crate::errors::{Error, Result};

pub const DEFAULT_PRIORITY: i64 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoRestart {
    Always,
    Never,
    /// Restart unless the exit code is listed in `exitcodes`.
    Unexpected,
}

impl AutoRestart {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => AutoRestart::Always,
            "false" | "no" | "off" | "0" => AutoRestart::Never,
            _ => AutoRestart::Unexpected,
        }
    }

    pub fn should_restart(self, exit_code: Option<i32>, exitcodes: &[i32]) -> bool {
        match self {
            AutoRestart::Always => true,
            AutoRestart::Never => false,
            AutoRestart::Unexpected => !exit_code.is_some_and(|c| exitcodes.contains(&c)),
        }
    }
}

/// Everything needed to run one process instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDescriptor {
    pub name: String,
    pub group: String,
    pub kind: EntryKind,
    pub command: String,
    pub argv: Vec<String>,
    pub directory: Option<PathBuf>,
    pub environment: Vec<(String, String)>,
    pub autostart: bool,
    pub autorestart: AutoRestart,
    pub exitcodes: Vec<i32>,
    pub startsecs: u64,
    pub startretries: u32,
    pub stopsignal: String,
    pub stopwaitsecs: u64,
    pub stdout_logfile: Option<PathBuf>,
    pub stderr_logfile: Option<PathBuf>,
    pub redirect_stderr: bool,
    pub priority: i64,
    pub description: Option<String>,
}

impl ProgramDescriptor {
    /// A descriptor with default settings, running `command`.
    pub fn new(name: &str, command: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            group: name.to_string(),
            kind: EntryKind::Program,
            command: command.to_string(),
            argv: split_command(command).map_err(|e| Error::config_load(name, e))?,
            directory: None,
            environment: Vec::new(),
            autostart: true,
            autorestart: AutoRestart::Unexpected,
            exitcodes: vec![0],
            startsecs: 1,
            startretries: 3,
            stopsignal: "TERM".to_string(),
            stopwaitsecs: 10,
            stdout_logfile: None,
            stderr_logfile: None,
            redirect_stderr: false,
            priority: DEFAULT_PRIORITY,
            description: None,
        })
    }

    /// Build from an expanded program or event listener entry.
    pub fn from_entry(entry: &ConfigEntry) -> Result<Self> {
        let name = entry.process_name().ok_or_else(|| {
            Error::config_load(entry.config_dir(), format!("{} is not a program", entry.name))
        })?;
        let command = entry.get("command").unwrap_or_default().trim();
        if command.is_empty() {
            return Err(Error::config_load(
                entry.config_dir(),
                format!("[{name}] no command"),
            ));
        }

        let mut descriptor = ProgramDescriptor::new(name, command)?;
        if descriptor.argv.is_empty() {
            return Err(Error::config_load(
                entry.config_dir(),
                format!("[{name}] no command"),
            ));
        }
        descriptor.group = if entry.group.is_empty() {
            name.to_string()
        } else {
            entry.group.clone()
        };
        descriptor.kind = entry.kind();
        descriptor.directory = path_value(entry, "directory")?;
        descriptor.environment = entry.get_env("environment");
        descriptor.autostart = entry.get_bool("autostart", true);
        descriptor.autorestart = entry
            .get("autorestart")
            .map_or(AutoRestart::Unexpected, AutoRestart::parse);
        let exitcodes: Vec<i32> = entry
            .get_string_array("exitcodes", ',')
            .iter()
            .filter_map(|c| c.parse().ok())
            .collect();
        if !exitcodes.is_empty() {
            descriptor.exitcodes = exitcodes;
        }
        descriptor.startsecs = non_negative(entry.get_int("startsecs", 1));
        descriptor.startretries = u32::try_from(entry.get_int("startretries", 3)).unwrap_or(3);
        descriptor.stopsignal = entry.get_string("stopsignal", "TERM");
        descriptor.stopwaitsecs = non_negative(entry.get_int("stopwaitsecs", 10));
        descriptor.stdout_logfile = path_value(entry, "stdout_logfile")?;
        descriptor.stderr_logfile = path_value(entry, "stderr_logfile")?;
        descriptor.redirect_stderr = entry.get_bool("redirect_stderr", false);
        descriptor.priority = entry.get_int("priority", DEFAULT_PRIORITY);
        descriptor.description = entry.get("description").map(str::to_string);
        Ok(descriptor)
    }

    /// Whether an exit with `exit_code` is followed by a restart.
    pub fn should_restart(&self, exit_code: Option<i32>) -> bool {
        self.autorestart.should_restart(exit_code, &self.exitcodes)
    }

    pub fn is_expected_exit(&self, exit_code: Option<i32>) -> bool {
        exit_code.is_some_and(|c| self.exitcodes.contains(&c))
    }
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// A path setting, evaluated strictly and made absolute against the config
/// directory. `NONE` and `AUTO` mean no file.
fn path_value(entry: &ConfigEntry, key: &str) -> Result<Option<PathBuf>> {
    let Some(value) = entry.get_string_expression_strict(key)? else {
        return Ok(None);
    };
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") || value.eq_ignore_ascii_case("auto")
    {
        return Ok(None);
    }
    Ok(Some(entry.config_dir().join(value)))
}

/// Split a command line with shell-style quoting. No variable expansion.
pub fn split_command(command: &str) -> std::result::Result<Vec<String>, String> {
    let mut argv = Vec::new();
    let mut input = command;
    loop {
        input = input.trim_start();
        if input.is_empty() {
            return Ok(argv);
        }
        match word(input) {
            Ok((rest, arg)) => {
                argv.push(arg);
                input = rest;
            }
            Err(_) => return Err(format!("unterminated quote in {command:?}")),
        }
    }
}

fn word(input: &str) -> IResult<&str, String> {
    map(
        many1(alt((single_quoted, double_quoted, escaped, bare))),
        |parts: Vec<String>| parts.concat(),
    )
    .parse(input)
}

fn single_quoted(input: &str) -> IResult<&str, String> {
    map(
        delimited(char('\''), take_till(|c: char| c == '\''), char('\'')),
        str::to_string,
    )
    .parse(input)
}

/// Inside double quotes a backslash only escapes `"`, `\`, `$` and `` ` ``.
fn double_quoted(input: &str) -> IResult<&str, String> {
    let escape = map(preceded(char('\\'), anychar), |c| match c {
        '"' | '\\' | '$' | '`' => c.to_string(),
        c => format!("\\{c}"),
    });
    let plain = map(take_while1(|c: char| c != '"' && c != '\\'), str::to_string);
    map(
        delimited(char('"'), many0(alt((escape, plain))), char('"')),
        |parts: Vec<String>| parts.concat(),
    )
    .parse(input)
}

fn escaped(input: &str) -> IResult<&str, String> {
    map(preceded(char('\\'), opt(anychar)), |c| {
        c.map(String::from).unwrap_or_default()
    })
    .parse(input)
}

fn bare(input: &str) -> IResult<&str, String> {
    map(
        take_while1(|c: char| !c.is_whitespace() && !matches!(c, '\'' | '"' | '\\')),
        str::to_string,
    )
    .parse(input)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn entry(name: &str, pairs: &[(&str, &str)]) -> ConfigEntry {
        let values: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConfigEntry::new(name, "/etc/supervisor", values)
    }

    #[test]
    fn test_defaults() {
        let d = ProgramDescriptor::from_entry(&entry("program:web", &[("command", "/bin/web -p 80")]))
            .unwrap();
        assert_eq!(d.name, "web");
        assert_eq!(d.group, "web");
        assert_eq!(d.kind, EntryKind::Program);
        assert_eq!(d.argv, ["/bin/web", "-p", "80"]);
        assert!(d.autostart);
        assert_eq!(d.autorestart, AutoRestart::Unexpected);
        assert_eq!(d.exitcodes, [0]);
        assert_eq!(d.startsecs, 1);
        assert_eq!(d.startretries, 3);
        assert_eq!(d.stopsignal, "TERM");
        assert_eq!(d.stopwaitsecs, 10);
        assert_eq!(d.priority, 999);
        assert!(d.directory.is_none());
        assert!(d.stdout_logfile.is_none());
    }

    #[test]
    fn test_values() {
        let mut e = entry(
            "program:web",
            &[
                ("command", "/bin/web"),
                ("directory", "%(here)s/run"),
                ("environment", "A=1,B=\"two\""),
                ("autostart", "false"),
                ("autorestart", "true"),
                ("exitcodes", "0, 2"),
                ("startsecs", "0"),
                ("startretries", "5"),
                ("stopsignal", "INT"),
                ("stopwaitsecs", "2"),
                ("stdout_logfile", "logs/%(program_name)s.out"),
                ("stderr_logfile", "NONE"),
                ("redirect_stderr", "true"),
                ("priority", "5"),
            ],
        );
        e.group = "core".to_string();
        let d = ProgramDescriptor::from_entry(&e).unwrap();
        assert_eq!(d.group, "core");
        assert_eq!(d.directory, Some(PathBuf::from("/etc/supervisor/run")));
        assert_eq!(
            d.environment,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two".to_string())
            ]
        );
        assert!(!d.autostart);
        assert_eq!(d.autorestart, AutoRestart::Always);
        assert_eq!(d.exitcodes, [0, 2]);
        assert_eq!(d.startsecs, 0);
        assert_eq!(d.startretries, 5);
        assert_eq!(d.stopsignal, "INT");
        assert_eq!(d.stopwaitsecs, 2);
        assert_eq!(
            d.stdout_logfile,
            Some(PathBuf::from("/etc/supervisor/logs/web.out"))
        );
        assert_eq!(d.stderr_logfile, None);
        assert!(d.redirect_stderr);
        assert_eq!(d.priority, 5);
    }

    #[test]
    fn test_bad_path_is_an_error() {
        let e = entry(
            "program:web",
            &[("command", "/bin/web"), ("stdout_logfile", "%(nope)s.log")],
        );
        assert!(ProgramDescriptor::from_entry(&e).is_err());
    }

    #[test]
    fn test_missing_command() {
        assert!(ProgramDescriptor::from_entry(&entry("program:web", &[])).is_err());
        assert!(ProgramDescriptor::from_entry(&entry("program:web", &[("command", "  ")])).is_err());
        assert!(ProgramDescriptor::from_entry(&entry("group:web", &[("command", "/x")])).is_err());
    }

    #[test]
    fn test_restart_policy() {
        assert!(AutoRestart::Always.should_restart(Some(0), &[0]));
        assert!(!AutoRestart::Never.should_restart(Some(1), &[0]));
        assert!(!AutoRestart::Unexpected.should_restart(Some(0), &[0]));
        assert!(AutoRestart::Unexpected.should_restart(Some(1), &[0]));
        assert!(AutoRestart::Unexpected.should_restart(None, &[0]));
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("/bin/sh -c 'echo hi; exit 3'").unwrap(), [
            "/bin/sh",
            "-c",
            "echo hi; exit 3"
        ]);
        assert_eq!(
            split_command(r#"run "a \"b\" c" d\ e ''"#).unwrap(),
            ["run", "a \"b\" c", "d e", ""]
        );
        assert_eq!(split_command("  spaced   out  ").unwrap(), ["spaced", "out"]);
        assert!(split_command("").unwrap().is_empty());
        assert!(split_command("echo 'oops").is_err());
        assert!(split_command(r#"echo "half"#).is_err());
        assert!(split_command("a'b").is_err());
        assert_eq!(split_command(r#"say "it\'s \$HOME""#).unwrap(), ["say", "it\\'s $HOME"]);
        assert_eq!(split_command("x'y'\"z\"").unwrap(), ["xyz"]);
    }
}
