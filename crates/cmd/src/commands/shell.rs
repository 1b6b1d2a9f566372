// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Drive a [`Shell`] from the terminal.
//!
//! The shell is single threaded and never blocks, so everything runs on a
//! current-thread runtime: a ticker calls `update`, a reader task forwards
//! stdin lines over a channel, and Ctrl-C becomes a break request.

use anyhow::{Result, anyhow};
use diagnostics::{log_debug, log_info};
use shell::{Shell, ShellState};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::MissedTickBehavior;

use crate::common::{LOCAL_IDENTITY, Workspace};

/// Host frame interval
pub const TICK: Duration = Duration::from_millis(16);

/// Upper bound on ticks a batch line may take
pub const MAX_BATCH_TICKS: usize = 10_000;

fn flush_output(shell: &mut Shell, out: &mut impl Write) -> Result<()> {
    let text = shell.take_output();
    if !text.is_empty() {
        out.write_all(text.as_bytes())?;
        out.flush()?;
    }
    Ok(())
}

/// Submit each line and tick until the shell is no longer running.
///
/// Scripts that wait on keys or time never finish here, so a line that is
/// still running after [`MAX_BATCH_TICKS`] is an error.
pub fn run_lines<I>(shell: &mut Shell, lines: I, out: &mut impl Write) -> Result<()>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    for line in lines {
        let line = line.as_ref();
        shell.submit_line(line);
        let mut ticks = 0;
        while shell.state() == ShellState::Running {
            if ticks == MAX_BATCH_TICKS {
                return Err(anyhow!("still running after {MAX_BATCH_TICKS} ticks: {line}"));
            }
            shell.update();
            ticks += 1;
        }
        flush_output(shell, out)?;
    }
    Ok(())
}

async fn read_stdin(tx: UnboundedSender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).is_err() {
            break;
        }
    }
}

/// Run one program in real time, returning once it finishes
pub async fn run_script(shell: &mut Shell, path: &str, out: &mut impl Write) -> Result<()> {
    shell.request_run(path);
    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    while shell.state() == ShellState::Running {
        tokio::select! {
            _ = ticker.tick() => shell.update(),
            result = tokio::signal::ctrl_c() => {
                result?;
                _ = shell.request_break();
                shell.update();
            }
        }
        flush_output(shell, out)?;
    }
    Ok(())
}

/// Interactive session until stdin closes and the shell is idle
pub async fn interactive(shell: &mut Shell, out: &mut impl Write) -> Result<()> {
    let (tx, mut lines) = mpsc::unbounded_channel();
    let reader = tokio::spawn(read_stdin(tx));

    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                shell.update();
                if !stdin_open && shell.state() != ShellState::Running {
                    break;
                }
            }
            line = lines.recv(), if stdin_open => match line {
                Some(line) => shell.submit_line(&line),
                None => {
                    log_debug!("stdin closed");
                    stdin_open = false;
                }
            },
            result = tokio::signal::ctrl_c() => {
                result?;
                if !shell.request_break() {
                    log_info!("break ignored: disabled or nothing running");
                }
            }
        }
        flush_output(shell, out)?;
    }

    reader.abort();
    writeln!(out)?;
    Ok(())
}

pub async fn shell_command(workspace: &Workspace, commands: &[String], script: Option<&str>) -> Result<()> {
    let registry = workspace.registry()?;
    let mut shell = Shell::new(workspace.config.shell.clone(), registry);
    log_info!("booting shell for participant {identity}", identity: LOCAL_IDENTITY);
    shell.boot();

    let mut stdout = std::io::stdout();
    if !commands.is_empty() {
        // let the user startup finish first
        let mut ticks = 0;
        while shell.state() == ShellState::Running && ticks < MAX_BATCH_TICKS {
            shell.update();
            ticks += 1;
        }
        if shell.state() == ShellState::Running {
            return Err(anyhow!("user startup still running after {MAX_BATCH_TICKS} ticks"));
        }
        flush_output(&mut shell, &mut stdout)?;
        return run_lines(&mut shell, commands, &mut stdout);
    }
    if let Some(path) = script {
        return run_script(&mut shell, path, &mut stdout).await;
    }
    interactive(&mut shell, &mut stdout).await
}
