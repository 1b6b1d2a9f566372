// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Cooperative shell driven one tick at a time.
//!
//! The host calls [`Shell::update`] once per frame. Depending on the state
//! the shell prints a prompt, does nothing while a line is being typed, or
//! resumes the running script for one time slice. Nothing here blocks.

use crate::agent::AgentContext;
use crate::compiler::{Mode, compile};
use crate::config::ShellConfig;
use crate::console::Console;
use crate::env::{CURDIR, Environment, PropertyOutcome, SetProperty};
use crate::error::ScriptError;
use crate::intrinsics::{ShellHost, ShellRequest};
use crate::value::Value;
use crate::vm::{Machine, RunOutcome};
use diagnostics::{log_debug, log_info, log_warn};
use diskfs::{DiskRegistry, resolve_path};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

/// Globals that survive a run request or reset, besides those the system
/// startup defines
pub const PRESERVED_GLOBALS: &[&str] = &["env", STACK_AT_BREAK, "statusColor", "textColor"];

/// Global holding the call stack captured at the last break or error
pub const STACK_AT_BREAK: &str = "_stackAtBreak";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    /// Ready to show a prompt
    Idle,
    /// Prompt shown; waiting for a committed line
    AwaitingLineInput,
    /// A script is executing across ticks
    Running,
}

pub struct Shell {
    config: ShellConfig,
    registry: Rc<DiskRegistry>,
    env: Environment,
    console: Console,
    machine: Machine,
    state: ShellState,
    agent: Option<Weak<dyn AgentContext>>,
    started: Instant,
    allow_break: bool,
    break_requested: bool,
    /// Immediate-mode lines of a block that is still open
    pending_source: String,
    request: Option<ShellRequest>,
    /// Globals defined by the system startup, kept across runs
    system_globals: Vec<String>,
}

impl Shell {
    #[must_use]
    pub fn new(config: ShellConfig, registry: Rc<DiskRegistry>) -> Self {
        let mut env = Environment::new();
        env.insert(CURDIR, config.initial_dir.clone());
        Self {
            allow_break: config.allow_break,
            config,
            registry,
            env,
            console: Console::new(),
            machine: Machine::new(),
            state: ShellState::Idle,
            agent: None,
            started: Instant::now(),
            break_requested: false,
            pending_source: String::new(),
            request: None,
            system_globals: Vec::new(),
        }
    }

    /// Shell that runs on behalf of an in-world agent
    #[must_use]
    pub fn for_agent(config: ShellConfig, registry: Rc<DiskRegistry>, agent: Weak<dyn AgentContext>) -> Self {
        let mut shell = Self::new(config, registry);
        shell.agent = Some(agent);
        shell
    }

    #[must_use]
    pub fn state(&self) -> ShellState {
        self.state
    }

    #[must_use]
    pub fn registry(&self) -> &Rc<DiskRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn env(&self) -> &Environment {
        &self.env
    }

    #[must_use]
    pub fn current_dir(&self) -> &str {
        self.env.get(CURDIR).unwrap_or("/")
    }

    #[must_use]
    pub fn allow_break(&self) -> bool {
        self.allow_break
    }

    #[must_use]
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.machine.global(name)
    }

    /// Everything printed since the last call
    pub fn take_output(&mut self) -> String {
        self.console.take_output()
    }

    pub fn push_key(&mut self, key: char) {
        self.console.push_key(key);
    }

    /// True while an immediate-mode block is still open
    #[must_use]
    pub fn needs_more_input(&self) -> bool {
        !self.pending_source.is_empty()
    }

    fn set_state(&mut self, state: ShellState) {
        if self.state != state {
            log_debug!(
                "shell {from} -> {to}",
                from: format!("{:?}", self.state),
                to: format!("{state:?}")
            );
            self.state = state;
        }
    }

    fn prompt(&self) -> String {
        let (key, fallback) = if self.needs_more_input() {
            ("morePrompt", self.config.more_prompt.as_str())
        } else {
            ("prompt", self.config.prompt.as_str())
        };
        self.env.get(key).unwrap_or(fallback).to_string()
    }

    /// Run the system startup script to completion, then start the user's.
    pub fn boot(&mut self) {
        let system = self.config.system_startup.clone();
        match self.registry.read_text(&system) {
            Some(source) => self.run_startup(&system, &source),
            None => log_debug!("no system startup at {system}", system: system.as_str()),
        }
        self.system_globals = self.machine.global_names();

        if self.state != ShellState::Running {
            let user = self.config.user_startup.clone();
            if self.registry.exists(&user) {
                self.start_run(&user);
            }
        }
    }

    fn run_startup(&mut self, path: &str, source: &str) {
        let program = match compile(source, Mode::Program) {
            Ok(program) => program,
            Err(err) => {
                self.report(path, &err);
                return;
            }
        };
        self.machine.load(program);
        match self.run_slice(None) {
            Ok(RunOutcome::Finished | RunOutcome::OutOfTime) => {}
            Ok(RunOutcome::Waiting) => {
                let function = self
                    .machine
                    .pending()
                    .map(|call| call.function.clone())
                    .unwrap_or_default();
                let err = ScriptError::Runtime {
                    line: 0,
                    message: format!("{function} cannot wait during startup"),
                };
                self.report(path, &err);
            }
            Ok(RunOutcome::Stopped) => self.take_request(),
            Err(err) => self.report(path, &err),
        }
    }

    /// Advance by one host tick
    pub fn update(&mut self) {
        if std::mem::take(&mut self.break_requested) && self.state == ShellState::Running {
            self.apply_break();
        }
        match self.state {
            ShellState::Idle => {
                let prompt = self.prompt();
                self.console.write(&prompt);
                self.set_state(ShellState::AwaitingLineInput);
            }
            ShellState::AwaitingLineInput => {}
            ShellState::Running => self.resume(),
        }
    }

    /// Commit a typed line: input for a running script, otherwise a command
    pub fn submit_line(&mut self, line: &str) {
        if self.state == ShellState::Running {
            self.console.push_line(line);
        } else {
            self.handle_command(line);
        }
    }

    /// Compile and start one immediate-mode line
    pub fn handle_command(&mut self, line: &str) {
        self.pending_source.push_str(line);
        self.pending_source.push('\n');

        match compile(&self.pending_source, Mode::Immediate) {
            Ok(program) => {
                self.pending_source.clear();
                self.machine.load(program);
                self.set_state(ShellState::Running);
                self.resume();
            }
            Err(ScriptError::NeedMoreInput) => self.set_state(ShellState::Idle),
            Err(err) => {
                self.pending_source.clear();
                self.console.print(&err.to_string());
                log_warn!("command failed: {err}", err: err.to_string().as_str());
                self.set_state(ShellState::Idle);
            }
        }
    }

    /// Discard whatever is running and start the program at `path`
    pub fn request_run(&mut self, path: &str) {
        match resolve_path(self.current_dir(), path) {
            Ok(path) => self.start_run(&path),
            Err(err) => {
                self.console.print(&err.to_string());
                self.set_state(ShellState::Idle);
            }
        }
    }

    fn start_run(&mut self, path: &str) {
        self.machine.abort();
        self.pending_source.clear();

        let Some(source) = self.registry.read_text(path) else {
            self.console.print(&diskfs::Error::FileNotFound.to_string());
            self.set_state(ShellState::Idle);
            return;
        };
        match compile(&source, Mode::Program) {
            Ok(program) => {
                log_info!("running {path}", path);
                self.reset_globals();
                self.machine.load(program);
                self.set_state(ShellState::Running);
            }
            Err(err) => {
                self.report(path, &err);
            }
        }
    }

    /// Ask the running script to stop at the next tick.
    ///
    /// Refused while break is disabled or when nothing is running.
    pub fn request_break(&mut self) -> bool {
        if !self.allow_break || self.state != ShellState::Running {
            log_debug!("break ignored while {state}", state: format!("{:?}", self.state));
            return false;
        }
        self.break_requested = true;
        true
    }

    fn apply_break(&mut self) {
        log_info!("break while {state}", state: format!("{:?}", self.state));
        self.capture_stack();
        self.machine.abort();
        self.console.clear_keys();
        self.pending_source.clear();
        self.console.print("BREAK");
        self.set_state(ShellState::Idle);
    }

    /// Script-style property write made by the host
    pub fn set_property(&mut self, command: SetProperty) -> PropertyOutcome {
        let mut host = ShellHost {
            registry: &self.registry,
            env: &mut self.env,
            console: &mut self.console,
            agent: self.agent.as_ref().and_then(Weak::upgrade),
            started: self.started,
            allow_break: &mut self.allow_break,
            request: &mut self.request,
        };
        host.set_property(command)
    }

    fn run_slice(&mut self, budget: Option<Duration>) -> Result<RunOutcome, ScriptError> {
        let mut host = ShellHost {
            registry: &self.registry,
            env: &mut self.env,
            console: &mut self.console,
            agent: self.agent.as_ref().and_then(Weak::upgrade),
            started: self.started,
            allow_break: &mut self.allow_break,
            request: &mut self.request,
        };
        self.machine.run(&mut host, budget)
    }

    fn resume(&mut self) {
        match self.run_slice(Some(self.config.time_slice())) {
            Ok(RunOutcome::Finished) => self.set_state(ShellState::Idle),
            Ok(RunOutcome::OutOfTime | RunOutcome::Waiting) => {}
            Ok(RunOutcome::Stopped) => {
                self.set_state(ShellState::Idle);
                self.take_request();
            }
            Err(err) => self.report("script", &err),
        }
    }

    fn take_request(&mut self) {
        match self.request.take() {
            Some(ShellRequest::Run(path)) => self.start_run(&path),
            Some(ShellRequest::Reset) => {
                self.machine.abort();
                self.reset_globals();
                self.set_state(ShellState::Idle);
            }
            None => self.machine.abort(),
        }
    }

    fn reset_globals(&mut self) {
        let mut keep: Vec<&str> = PRESERVED_GLOBALS.to_vec();
        keep.extend(self.system_globals.iter().map(String::as_str));
        self.machine.reset_globals(&keep);
    }

    fn capture_stack(&mut self) {
        let frames = self.machine.stack_snapshot().into_iter().map(Value::str).collect();
        self.machine.set_global(STACK_AT_BREAK, Value::list(frames));
    }

    fn report(&mut self, source: &str, err: &ScriptError) {
        log_warn!("{source}: {err}", source, err: err.to_string().as_str());
        self.capture_stack();
        self.machine.abort();
        self.console.print(&err.to_string());
        self.set_state(ShellState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diskfs::{MemoryDirectoryTree, MemoryDisk};

    fn registry(system: &[(&str, &str)], user: &[(&str, &str)]) -> Rc<DiskRegistry> {
        let sys = MemoryDisk::with_tree("sys", MemoryDirectoryTree::new(), true);
        for (path, text) in system {
            diskfs::Disk::write_text(&sys, path, text).unwrap();
        }
        let registry = DiskRegistry::new(7, Rc::new(sys));
        let usr = Rc::new(MemoryDisk::with_tree("usr", MemoryDirectoryTree::new(), true));
        registry.mount(usr).unwrap();
        for (path, text) in user {
            registry.write_text(&format!("/usr/{path}"), text).unwrap();
        }
        Rc::new(registry)
    }

    fn shell(system: &[(&str, &str)], user: &[(&str, &str)]) -> Shell {
        Shell::new(ShellConfig::default(), registry(system, user))
    }

    #[test]
    fn test_idle_prints_prompt_once() {
        let mut sh = shell(&[], &[]);
        sh.update();
        assert_eq!(sh.state(), ShellState::AwaitingLineInput);
        sh.update();
        assert_eq!(sh.take_output(), "]");
    }

    #[test]
    fn test_immediate_command_echoes() {
        let mut sh = shell(&[], &[]);
        sh.update();
        sh.submit_line("x = 6 * 7");
        sh.submit_line("x");
        assert_eq!(sh.state(), ShellState::Idle);
        assert_eq!(sh.take_output(), "]42\n");
        assert_eq!(sh.global("x"), Some(&Value::Number(42.0)));
    }

    #[test]
    fn test_open_block_uses_more_prompt() {
        let mut sh = shell(&[], &[]);
        sh.submit_line("for i in [1, 2]");
        assert!(sh.needs_more_input());
        sh.update();
        assert_eq!(sh.take_output(), "...]");
        sh.submit_line("print i");
        sh.submit_line("end for");
        assert!(!sh.needs_more_input());
        assert_eq!(sh.take_output(), "1\n2\n");
        sh.update();
        assert_eq!(sh.take_output(), "]");
    }

    #[test]
    fn test_compile_error_returns_to_idle() {
        let mut sh = shell(&[], &[]);
        sh.submit_line("x = = 1");
        assert_eq!(sh.state(), ShellState::Idle);
        assert!(sh.take_output().starts_with("Compiler Error:"));
    }

    #[test]
    fn test_boot_runs_both_startups() {
        let mut sh = shell(
            &[("startup.ms", "greeting = \"hi\"")],
            &[("startup.ms", "print greeting + \" there\"")],
        );
        sh.boot();
        assert_eq!(sh.state(), ShellState::Running);
        assert_eq!(sh.global("greeting"), Some(&Value::str("hi")));
        sh.update();
        assert_eq!(sh.state(), ShellState::Idle);
        assert_eq!(sh.take_output(), "hi there\n");
    }

    #[test]
    fn test_startup_cannot_wait() {
        let mut sh = shell(&[("startup.ms", "k = key")], &[]);
        sh.boot();
        assert_eq!(sh.state(), ShellState::Idle);
        assert!(sh.take_output().contains("cannot wait during startup"));
    }

    #[test]
    fn test_key_wait_spans_ticks() {
        let mut sh = shell(&[], &[]);
        sh.submit_line("k = key");
        assert_eq!(sh.state(), ShellState::Running);
        sh.update();
        assert_eq!(sh.state(), ShellState::Running);
        sh.push_key('z');
        sh.update();
        assert_eq!(sh.state(), ShellState::Idle);
        assert_eq!(sh.global("k"), Some(&Value::str("z")));
    }

    #[test]
    fn test_input_reads_submitted_line() {
        let mut sh = shell(&[], &[]);
        sh.submit_line("name = input(\"who? \")");
        assert_eq!(sh.state(), ShellState::Running);
        sh.submit_line("ada");
        sh.update();
        assert_eq!(sh.global("name"), Some(&Value::str("ada")));
        assert_eq!(sh.take_output(), "who? ");
    }

    #[test]
    fn test_break_stops_and_keeps_globals() {
        let mut sh = shell(&[], &[("loop.ms", "n = 0\nwhile true\n  n = n + 1\nend while")]);
        sh.submit_line("keep = 1");
        sh.request_run("loop.ms");
        assert_eq!(sh.state(), ShellState::Running);
        assert!(sh.global("keep").is_none());
        sh.update();
        sh.push_key('x');
        assert!(sh.request_break());
        sh.update();
        assert_eq!(sh.state(), ShellState::AwaitingLineInput);
        assert!(sh.take_output().contains("BREAK"));
        assert!(matches!(sh.global("n"), Some(Value::Number(_))));
        let Some(Value::List(stack)) = sh.global(STACK_AT_BREAK) else {
            panic!("no stack captured");
        };
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_break_can_be_disabled() {
        let mut sh = shell(&[], &[]);
        sh.submit_line("env_set \"allowBreak\", \"false\"");
        assert!(!sh.allow_break());
        assert!(!sh.request_break());
        assert_eq!(
            sh.set_property(SetProperty::new("allowBreak", "true")),
            PropertyOutcome::Handled(crate::env::SideEffect::AllowBreak(true))
        );
        assert!(!sh.request_break());
        sh.submit_line("k = key");
        assert!(sh.request_break());
    }

    #[test]
    fn test_idle_break_keeps_error_stack() {
        let mut sh = shell(&[], &[]);
        sh.submit_line("f = function");
        sh.submit_line("  return 1 / 0");
        sh.submit_line("end function");
        sh.submit_line("f");
        let before = sh.global(STACK_AT_BREAK).cloned();
        assert!(matches!(&before, Some(Value::List(frames)) if frames.len() == 2));
        _ = sh.take_output();

        assert!(!sh.request_break());
        sh.update();
        assert_eq!(sh.global(STACK_AT_BREAK).cloned(), before);
        assert_eq!(sh.take_output(), "]");
    }

    #[test]
    fn test_missing_program_keeps_globals() {
        let mut sh = shell(&[], &[]);
        sh.submit_line("keep = 1");
        sh.request_run("nope.ms");
        assert_eq!(sh.state(), ShellState::Idle);
        assert_eq!(sh.take_output(), "Error: file not found\n");
        assert_eq!(sh.global("keep"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_run_intrinsic_replaces_program() {
        let mut sh = shell(&[], &[("next.ms", "done = 1")]);
        sh.submit_line("temp = 5");
        sh.submit_line("run \"next.ms\"");
        assert_eq!(sh.state(), ShellState::Running);
        sh.update();
        assert_eq!(sh.global("done"), Some(&Value::Number(1.0)));
        assert!(sh.global("temp").is_none());
    }

    #[test]
    fn test_runtime_error_captures_stack() {
        let mut sh = shell(&[], &[]);
        sh.submit_line("f = function\n");
        sh.submit_line("  return 1 / 0");
        sh.submit_line("end function");
        sh.submit_line("f");
        assert!(sh.take_output().contains("Runtime Error: division by zero"));
        let Some(Value::List(stack)) = sh.global(STACK_AT_BREAK) else {
            panic!("no stack captured");
        };
        assert_eq!(stack.len(), 2);
    }
}
