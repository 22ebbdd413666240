use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use log::warn;

use crate::action::{Action, parse_pid};
use crate::config::default_config_path;

pub fn build_cli() -> Command {
    Command::new("pidtimer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Wait for a duration, then terminate processes or open files")
        .arg(
            Arg::new("duration")
                .required(true)
                .value_name("DURATION")
                .help("[[[days:]hours:]minutes:]seconds[.milliseconds]"),
        )
        .arg(
            Arg::new("kill")
                .short('k')
                .long("kill")
                .value_name("PID")
                .help("Gracefully terminate a process")
                .allow_hyphen_values(true)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("force")
                .short('f')
                .long("force")
                .value_name("PID")
                .help("Force close a process")
                .allow_hyphen_values(true)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("open")
                .short('o')
                .long("open")
                .value_name("FILE + ARGS")
                .help("Open a file or run a command line (quote paths with spaces)")
                .allow_hyphen_values(true)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .help("Reject duration fields that are not plain digits")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Path to the config file")
                .value_parser(value_parser!(PathBuf)),
        )
        .after_help(
            "Examples:\n  \
             pidtimer 3:07:42:13.962 --kill 3479\n  \
             pidtimer 420:69 -k 42069 -o \"\\\"funky music.mp3\\\"\" -f 19573\n  \
             pidtimer 1:30:00 -o \"send_message.exe \\\"This is a message string!\\\"\"",
        )
}

/// An action flag as it appeared on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Kill(String),
    Force(String),
    Open(String),
}

impl Request {
    pub fn into_action(self) -> Option<Action> {
        match self {
            Request::Kill(raw) => terminate(&raw, false),
            Request::Force(raw) => terminate(&raw, true),
            Request::Open(cmdline) => Some(Action::launch(&cmdline)),
        }
    }
}

fn terminate(raw: &str, force: bool) -> Option<Action> {
    match parse_pid(raw) {
        Some(pid) => Some(Action::Terminate { pid, force }),
        None => {
            warn!("Invalid PID value: {raw}");
            None
        }
    }
}

#[derive(Debug)]
pub struct Invocation {
    pub duration: String,
    pub requests: Vec<Request>,
    pub strict: bool,
    pub config: Option<PathBuf>,
}

impl Invocation {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let mut indexed = Vec::new();
        indexed.extend(collect(matches, "kill", Request::Kill));
        indexed.extend(collect(matches, "force", Request::Force));
        indexed.extend(collect(matches, "open", Request::Open));
        indexed.sort_by_key(|(index, _)| *index);

        Self {
            duration: matches
                .get_one::<String>("duration")
                .cloned()
                .unwrap_or_default(),
            requests: indexed.into_iter().map(|(_, request)| request).collect(),
            strict: matches.get_flag("strict"),
            config: matches.get_one::<PathBuf>("config").cloned(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }
}

// Pairs each value with its argv position so mixed flags keep their order.
fn collect(
    matches: &ArgMatches,
    id: &str,
    make: fn(String) -> Request,
) -> Vec<(usize, Request)> {
    match (matches.get_many::<String>(id), matches.indices_of(id)) {
        (Some(values), Some(indices)) => indices
            .zip(values)
            .map(|(index, value)| (index, make(value.clone())))
            .collect(),
        _ => Vec::new(),
    }
}
