use std::fmt;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow, bail};
use log::{info, warn};
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};

/// Something to do once the countdown runs out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Terminate { pid: u32, force: bool },
    Launch { program: String, cmdline: String },
}

impl Action {
    pub fn launch(cmdline: &str) -> Self {
        Action::Launch {
            program: program_path(cmdline),
            cmdline: cmdline.to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Terminate { pid, .. } => write!(f, "PID {pid}"),
            Action::Launch { program, .. } => f.write_str(program),
        }
    }
}

/// Parses a process id; zero and anything that is not a plain integer are rejected.
pub fn parse_pid(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|pid| *pid > 0)
}

/// First token of a command line. Double quotes group spaces and are removed.
pub fn program_path(cmdline: &str) -> String {
    let mut program = String::new();
    let mut quoted = false;
    for ch in cmdline.trim_start_matches(' ').chars() {
        match ch {
            '"' => quoted = !quoted,
            ' ' if !quoted => break,
            _ => program.push(ch),
        }
    }
    program
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Runs actions against the live process table.
pub struct Dispatcher {
    system: System,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    pub fn is_running(&mut self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
        self.system.process(pid).is_some()
    }

    /// Runs every action in order. A failed action is reported and the rest still run.
    pub fn dispatch(&mut self, actions: &[Action]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for action in actions {
            info!("dispatching {action:?}");
            let result = match action {
                Action::Terminate { pid, force } => self.terminate(*pid, *force),
                Action::Launch { cmdline, .. } => launch(cmdline),
            };
            match result {
                Ok(message) => {
                    println!("{action}: {message}");
                    report.succeeded += 1;
                }
                Err(err) => {
                    warn!("{action}: {err:#}");
                    println!("{action}: {err:#}");
                    report.failed += 1;
                }
            }
        }
        report
    }

    fn terminate(&mut self, pid: u32, force: bool) -> Result<&'static str> {
        let sys_pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[sys_pid]));
        let process = self
            .system
            .process(sys_pid)
            .ok_or_else(|| anyhow!("Process already closed!"))?;

        if force {
            if !process.kill() {
                bail!("Process could not be terminated!");
            }
            return Ok("Process terminated successfully!");
        }

        match process.kill_with(Signal::Term) {
            Some(true) => Ok("Termination requested successfully!"),
            Some(false) => bail!("Termination request was not delivered!"),
            None => {
                request_close(pid)?;
                Ok("Termination requested successfully!")
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

// Platforms without SIGTERM get asked politely through taskkill.
fn request_close(pid: u32) -> Result<()> {
    let status = Command::new("taskkill")
        .arg("/PID")
        .arg(pid.to_string())
        .status()
        .context("failed to run taskkill")?;
    if !status.success() {
        bail!("taskkill exited with {status}");
    }
    Ok(())
}

fn launch(cmdline: &str) -> Result<&'static str> {
    shell_command(cmdline)
        .stdin(Stdio::null())
        .spawn()
        .with_context(|| format!("New process failed to open: {cmdline}"))?;
    Ok("Attempted to open/execute successfully!")
}

#[cfg(windows)]
fn shell_command(cmdline: &str) -> Command {
    use std::os::windows::process::CommandExt;

    const DETACHED_PROCESS: u32 = 0x0000_0008;
    let mut command = Command::new("cmd.exe");
    command
        .raw_arg(format!("/s /c \"{cmdline}\""))
        .creation_flags(DETACHED_PROCESS);
    command
}

#[cfg(not(windows))]
fn shell_command(cmdline: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(cmdline);
    command
}

// Above any kernel's pid_max.
#[cfg(test)]
pub(crate) const MISSING_PID: u32 = 999_999_999;
