//! Multi-command command-line parsing.
//!
//! Parses `program command [arguments]`, where each command owns its own
//! clap argument set and the set answers `help` the way `go help` does.

use clap::{ArgMatches, Command};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use thiserror::Error;

/// Command names are padded to at least this width in the usage table.
const MIN_NAME_WIDTH: usize = 10;

/// Errors from [`CmdSet::parse_from`].
#[derive(Debug, Error)]
pub enum CmdSetError {
    /// Help was requested; the payload is the text to show.
    #[error("{0}")]
    Help(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error(transparent)]
    Args(#[from] clap::Error),
}

/// One command in a [`CmdSet`].
#[derive(Debug, Clone)]
pub struct Cmd {
    name: String,
    explain: String,
    command: Command,
}

impl Cmd {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn explain(&self) -> &str {
        &self.explain
    }

    /// Rendered help for this command's arguments.
    pub fn help(&self) -> String {
        self.command.clone().render_help().to_string()
    }
}

/// The command selected by a successful parse, with its parsed arguments.
#[derive(Debug, Clone)]
pub struct Winning {
    pub name: String,
    pub matches: ArgMatches,
}

/// A set of named commands.
#[derive(Debug, Clone)]
pub struct CmdSet {
    name: String,
    cmds: BTreeMap<String, Cmd>,
}

impl CmdSet {
    /// `name` is the program name shown in usage.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cmds: BTreeMap::new(),
        }
    }

    /// Define a command. `configure` adds its arguments.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        explain: impl Into<String>,
        configure: impl FnOnce(Command) -> Command,
    ) -> &mut Self {
        let name = name.into();
        let explain = explain.into();
        let command = configure(
            Command::new(name.clone())
                .bin_name(format!("{} {}", self.name, name))
                .about(explain.clone()),
        );
        self.cmds.insert(name.clone(), Cmd { name, explain, command });
        self
    }

    pub fn lookup(&self, name: &str) -> Option<&Cmd> {
        self.cmds.get(name)
    }

    /// Command names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.cmds.keys().map(String::as_str).collect()
    }

    /// Parse arguments following the program name.
    pub fn parse_from<I, T>(&self, args: I) -> Result<Winning, CmdSetError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let Some(first) = args.first() else {
            return Err(CmdSetError::Help(self.usage()));
        };

        let Some(cmd) = self.cmds.get(first) else {
            return Err(match first.as_str() {
                "-h" | "-help" | "--help" => CmdSetError::Help(self.usage()),
                "help" => match args.get(1).and_then(|name| self.cmds.get(name)) {
                    Some(cmd) => CmdSetError::Help(cmd.help()),
                    None => CmdSetError::Help(self.usage()),
                },
                _ => CmdSetError::UnknownCommand(first.clone()),
            });
        };

        match cmd.command.clone().try_get_matches_from(&args) {
            Ok(matches) => Ok(Winning {
                name: cmd.name.clone(),
                matches,
            }),
            Err(e) if e.kind() == clap::error::ErrorKind::DisplayHelp => {
                Err(CmdSetError::Help(e.to_string()))
            }
            Err(e) => Err(CmdSetError::Args(e)),
        }
    }

    /// The command table.
    pub fn usage(&self) -> String {
        let width = self
            .cmds
            .keys()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max(MIN_NAME_WIDTH);

        let mut out = String::new();
        let _ = writeln!(out, "\nUsage:\n\n{} command [arguments]\n\nThe commands are:\n", self.name);
        for cmd in self.cmds.values() {
            let _ = writeln!(out, "    {:width$}  {}", cmd.name, cmd.explain, width = width);
        }
        let _ = writeln!(
            out,
            "\nUse \"{} help [command]\" for more information about a command.\n",
            self.name
        );
        out
    }
}
