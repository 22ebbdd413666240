mod action;
mod cli;
mod config;
mod duration;
mod timer;

use std::io;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::action::{Action, DispatchReport, Dispatcher};
use crate::cli::{Invocation, Request};
use crate::config::Config;
use crate::duration::{FieldPolicy, format_duration, parse_duration};
use crate::timer::{Countdown, SystemClock, TerminalDisplay};

const EXIT_USAGE: i32 = 1;
const EXIT_ACTION_FAILED: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

// Set once the countdown is over and actions start running.
static DISPATCHING: AtomicBool = AtomicBool::new(false);

fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("ERROR: {err:#}");
            EXIT_USAGE
        }
    };
    process::exit(code);
}

fn run() -> Result<i32> {
    let matches = match cli::build_cli().try_get_matches() {
        Ok(matches) => matches,
        Err(err) => {
            let _ = err.print();
            return Ok(if err.use_stderr() { EXIT_USAGE } else { 0 });
        }
    };
    let invocation = Invocation::from_matches(&matches);

    let config = Config::load(&invocation.config_path());
    let policy = resolve_policy(invocation.strict, &config);

    let duration = match parse_duration(&invocation.duration, policy) {
        Ok(duration) => duration,
        Err(err) => {
            eprintln!("ERROR: Invalid duration value: {err}\n");
            let _ = cli::build_cli().print_help();
            return Ok(EXIT_USAGE);
        }
    };

    let mut dispatcher = Dispatcher::new();
    let actions = resolve_actions(invocation.requests, &mut dispatcher);
    if let Some(code) = missing_actions_code(&actions) {
        eprintln!("ERROR: No valid actions were entered!\n");
        let _ = cli::build_cli().print_help();
        return Ok(code);
    }

    ctrlc::set_handler(|| {
        println!("\n\n{}", interrupt_message(DISPATCHING.load(Ordering::SeqCst)));
        process::exit(EXIT_INTERRUPTED);
    })
    .context("Error setting Ctrl-C handler")?;

    info!(
        "waiting {} ({duration}ms) before {} action(s)",
        format_duration(duration),
        actions.len()
    );
    let mut display = TerminalDisplay::new(io::stdout(), config.prompt.clone(), config.bell);
    Countdown::new(duration).run(
        &mut SystemClock::new(),
        |tick| display.render(tick),
        || info!("countdown finished"),
    )?;

    DISPATCHING.store(true, Ordering::SeqCst);
    let report = dispatcher.dispatch(&actions);
    info!(
        "{} action(s) succeeded, {} failed",
        report.succeeded, report.failed
    );
    Ok(exit_code(&report))
}

/// `--strict` wins over the config file.
fn resolve_policy(strict: bool, config: &Config) -> FieldPolicy {
    if strict {
        FieldPolicy::Strict
    } else {
        config.field_policy
    }
}

/// Turns requests into actions, dropping invalid PIDs and PIDs that are not running.
fn resolve_actions(requests: Vec<Request>, dispatcher: &mut Dispatcher) -> Vec<Action> {
    requests
        .into_iter()
        .filter_map(Request::into_action)
        .filter(|action| match action {
            Action::Terminate { pid, .. } if !dispatcher.is_running(*pid) => {
                warn!("Process doesn't exist or cannot be accessed for termination: {pid}");
                false
            }
            _ => true,
        })
        .collect()
}

fn missing_actions_code(actions: &[Action]) -> Option<i32> {
    actions.is_empty().then_some(EXIT_USAGE)
}

fn exit_code(report: &DispatchReport) -> i32 {
    if report.failed > 0 {
        EXIT_ACTION_FAILED
    } else {
        0
    }
}

fn interrupt_message(dispatching: bool) -> &'static str {
    if dispatching {
        "Interrupted! Some actions may already have been executed."
    } else {
        "Interrupted! No actions were executed."
    }
}
