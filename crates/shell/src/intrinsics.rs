// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Native functions visible to scripts.
//!
//! File operations follow the script error convention: a failure comes
//! back as an `"Error: ..."` string (or `null` for a lookup that found
//! nothing) so the calling script keeps running and can branch on it.
//! Bad argument types are runtime errors instead.

use crate::agent::AgentContext;
use crate::console::Console;
use crate::env::{CURDIR, Environment, PropertyOutcome, SetProperty, SideEffect};
use crate::value::Value;
use crate::vm::{Host, NativeResult};
use diagnostics::{log_debug, log_warn};
use diskfs::{DiskRegistry, OpenFileHandle, resolve_path};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

const NATIVES: &[&str] = &[
    "print",
    "str",
    "len",
    "time",
    "wait",
    "key",
    "key_available",
    "input",
    "file_read",
    "file_write",
    "file_list",
    "file_exists",
    "file_delete",
    "file_mkdir",
    "file_move",
    "file_copy",
    "file_info",
    "open",
    "handle_write",
    "handle_read",
    "handle_readline",
    "handle_readchars",
    "handle_close",
    "handle_at_end",
    "env_get",
    "env_set",
    "cd",
    "pwd",
    "run",
    "reset",
    "agent_name",
    "agent_wait",
];

/// Work a script hands back to the shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellRequest {
    /// Start the program at this absolute path
    Run(String),
    /// Forget the running program and user globals
    Reset,
}

type NativeCall = std::result::Result<NativeResult, String>;

/// Everything a script can reach during one slice
pub(crate) struct ShellHost<'a> {
    pub registry: &'a DiskRegistry,
    pub env: &'a mut Environment,
    pub console: &'a mut Console,
    pub agent: Option<Rc<dyn AgentContext>>,
    pub started: Instant,
    pub allow_break: &'a mut bool,
    pub request: &'a mut Option<ShellRequest>,
}

fn done(value: Value) -> NativeCall {
    Ok(NativeResult::Done(value))
}

/// `null` on success, the error text otherwise
fn status(result: diskfs::Result<()>) -> NativeCall {
    done(match result {
        Ok(()) => Value::Null,
        Err(err) => Value::str(err.to_string()),
    })
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn text(name: &str, args: &[Value], index: usize) -> std::result::Result<String, String> {
    match arg(args, index) {
        Value::Str(s) => Ok(s.to_string()),
        Value::Number(n) => Ok(Value::Number(n).to_string()),
        other => Err(format!(
            "{name} expects a string for argument {}, got {}",
            index + 1,
            other.type_name()
        )),
    }
}

fn number(name: &str, args: &[Value], index: usize) -> std::result::Result<f64, String> {
    arg(args, index)
        .as_number()
        .map_err(|err| format!("{name}: {err}"))
}

fn handle(name: &str, args: &[Value]) -> std::result::Result<Rc<RefCell<OpenFileHandle>>, String> {
    match arg(args, 0) {
        Value::Handle(h) => Ok(h),
        other => Err(format!("{name} expects a file handle, got {}", other.type_name())),
    }
}

impl ShellHost<'_> {
    fn curdir(&self) -> String {
        self.env.get(CURDIR).unwrap_or("/").to_string()
    }

    fn resolve(&self, path: &str) -> diskfs::Result<String> {
        resolve_path(&self.curdir(), path)
    }

    /// Move the current directory; the target must be an existing directory
    pub(crate) fn change_directory(&mut self, path: &str) -> diskfs::Result<String> {
        let target = self.resolve(path)?;
        let is_dir = target == "/"
            || self
                .registry
                .stat(&target)
                .is_some_and(|meta| meta.is_directory);
        if !is_dir {
            return Err(diskfs::Error::FileNotFound);
        }
        log_debug!("current directory {target}", target: target.as_str());
        self.env.insert(CURDIR, target.clone());
        Ok(target)
    }

    /// Store a property or carry out its side effect
    pub(crate) fn set_property(&mut self, command: SetProperty) -> PropertyOutcome {
        let outcome = self.env.apply(command);
        match &outcome {
            PropertyOutcome::Handled(SideEffect::ChangeDirectory(path)) => {
                if let Err(err) = self.change_directory(path) {
                    return PropertyOutcome::Rejected(err.to_string());
                }
            }
            PropertyOutcome::Handled(SideEffect::AllowBreak(flag)) => *self.allow_break = *flag,
            PropertyOutcome::Accepted | PropertyOutcome::Rejected(_) => {}
        }
        outcome
    }

    /// Resolve the first argument as a path and run `op` on it
    fn with_path<T>(
        &self,
        name: &str,
        args: &[Value],
        op: impl FnOnce(&str) -> T,
    ) -> std::result::Result<diskfs::Result<T>, String> {
        let raw = text(name, args, 0)?;
        Ok(self.resolve(&raw).map(|path| op(&path)))
    }

    fn file_call(&mut self, name: &str, args: &[Value]) -> NativeCall {
        let registry = self.registry;
        match name {
            "file_read" => done(match self.with_path(name, args, |p| registry.read_text(p))? {
                Ok(Some(content)) => Value::str(content),
                Ok(None) => Value::Null,
                Err(err) => Value::str(err.to_string()),
            }),
            "file_write" => {
                let content = arg(args, 1).to_string();
                status(self.with_path(name, args, |p| registry.write_text(p, &content))?.and_then(|r| r))
            }
            "file_list" => done(match self.with_path(name, args, |p| registry.list(p))? {
                Ok(Some(names)) => Value::list(names.into_iter().map(Value::str).collect()),
                Ok(None) => Value::Null,
                Err(err) => Value::str(err.to_string()),
            }),
            "file_exists" => done(Value::bool(
                self.with_path(name, args, |p| registry.exists(p))?.unwrap_or(false),
            )),
            "file_delete" => status(self.with_path(name, args, |p| registry.delete(p))?.and_then(|r| r)),
            "file_mkdir" => status(self.with_path(name, args, |p| registry.make_dir(p))?.and_then(|r| r)),
            "file_move" | "file_copy" => {
                let source = self.resolve(&text(name, args, 0)?);
                let target = self.resolve(&text(name, args, 1)?);
                let overwrite = arg(args, 2).is_truthy();
                let result = match (source, target) {
                    (Ok(source), Ok(target)) => {
                        registry.move_or_copy(&source, &target, name == "file_move", overwrite)
                    }
                    (Err(err), _) | (_, Err(err)) => Err(err),
                };
                status(result)
            }
            // [size, isDirectory, modified, comment]
            _ => done(match self.with_path(name, args, |p| registry.stat(p))? {
                Ok(Some(meta)) => Value::list(vec![
                    Value::Number(meta.size as f64),
                    Value::bool(meta.is_directory),
                    Value::str(meta.modified_at.to_rfc3339()),
                    Value::str(meta.comment),
                ]),
                Ok(None) => Value::Null,
                Err(err) => Value::str(err.to_string()),
            }),
        }
    }

    fn handle_call(&mut self, name: &str, args: &[Value]) -> NativeCall {
        let shared = handle(name, args)?;
        let Ok(mut file) = shared.try_borrow_mut() else {
            return Err(format!("{name}: file handle is busy"));
        };
        let value = match name {
            "handle_write" => {
                let content = arg(args, 1).to_string();
                match file.write(&content) {
                    Ok(()) => Value::Null,
                    Err(err) => Value::str(err.to_string()),
                }
            }
            "handle_read" => match file.read_to_end() {
                Ok(content) => Value::str(content),
                Err(err) => Value::str(err.to_string()),
            },
            "handle_readline" => match file.read_line() {
                Ok(Some(line)) => Value::str(line),
                Ok(None) => Value::Null,
                Err(err) => Value::str(err.to_string()),
            },
            "handle_readchars" => {
                let count = number(name, args, 1)?.max(0.0) as usize;
                match file.read_chars(count) {
                    Ok(content) => Value::str(content),
                    Err(err) => Value::str(err.to_string()),
                }
            }
            "handle_at_end" => match file.at_end() {
                Ok(flag) => Value::bool(flag),
                Err(err) => Value::str(err.to_string()),
            },
            _ => match file.close() {
                Ok(()) => Value::Null,
                Err(err) => Value::str(err.to_string()),
            },
        };
        done(value)
    }
}

impl Host for ShellHost<'_> {
    fn has_native(&self, name: &str) -> bool {
        NATIVES.contains(&name)
    }

    fn call_native(&mut self, name: &str, args: &[Value], state: Option<&Value>) -> NativeCall {
        match name {
            "print" => {
                let parts: Vec<String> = args.iter().map(Value::to_string).collect();
                self.console.print(&parts.join(" "));
                done(Value::Null)
            }
            "str" => done(Value::str(arg(args, 0).to_string())),
            "len" => {
                let value = arg(args, 0);
                let len = value.iter_len().map_err(|err| format!("len: {err}"))?;
                done(Value::Number(len as f64))
            }
            "time" => done(Value::Number(self.started.elapsed().as_secs_f64())),
            "wait" => {
                let now = self.started.elapsed().as_secs_f64();
                let deadline = match state {
                    Some(deadline) => deadline.as_number()?,
                    None => now + number(name, args, 0)?.max(0.0),
                };
                if now >= deadline {
                    done(Value::Null)
                } else {
                    Ok(NativeResult::Pending(Value::Number(deadline)))
                }
            }
            "key" => match self.console.next_key() {
                Some(key) => done(Value::str(key.to_string())),
                None => Ok(NativeResult::Pending(Value::Null)),
            },
            "key_available" => done(Value::bool(self.console.has_key())),
            "input" => {
                if state.is_none() && !args.is_empty() {
                    self.console.write(&arg(args, 0).to_string());
                }
                match self.console.next_line() {
                    Some(line) => done(Value::str(line)),
                    None => Ok(NativeResult::Pending(Value::Null)),
                }
            }
            "file_read" | "file_write" | "file_list" | "file_exists" | "file_delete"
            | "file_mkdir" | "file_move" | "file_copy" | "file_info" => self.file_call(name, args),
            "open" => {
                let mode = match arg(args, 1) {
                    Value::Null => "r".to_string(),
                    _ => text(name, args, 1)?,
                };
                let registry = self.registry;
                done(match self.with_path(name, args, |p| registry.open(p, &mode))? {
                    Ok(Ok(file)) => Value::Handle(Rc::new(RefCell::new(file))),
                    Ok(Err(err)) | Err(err) => Value::str(err.to_string()),
                })
            }
            "handle_write" | "handle_read" | "handle_readline" | "handle_readchars"
            | "handle_close" | "handle_at_end" => self.handle_call(name, args),
            "env_get" => {
                let key = text(name, args, 0)?;
                done(self.env.get(&key).map(Value::str).unwrap_or_default())
            }
            "env_set" => {
                let command = SetProperty::new(text(name, args, 0)?, arg(args, 1).to_string());
                done(match self.set_property(command) {
                    PropertyOutcome::Rejected(reason) => Value::str(reason),
                    PropertyOutcome::Accepted | PropertyOutcome::Handled(_) => Value::Null,
                })
            }
            "cd" => {
                let path = match arg(args, 0) {
                    Value::Null => "/usr".to_string(),
                    _ => text(name, args, 0)?,
                };
                done(match self.change_directory(&path) {
                    Ok(_) => Value::Null,
                    Err(err) => Value::str(err.to_string()),
                })
            }
            "pwd" => done(Value::str(self.curdir())),
            "run" => {
                let raw = text(name, args, 0)?;
                match self.resolve(&raw) {
                    Ok(path) if self.registry.exists(&path) => {
                        *self.request = Some(ShellRequest::Run(path));
                        Ok(NativeResult::Stop)
                    }
                    Ok(_) => done(Value::str(diskfs::Error::FileNotFound.to_string())),
                    Err(err) => done(Value::str(err.to_string())),
                }
            }
            "reset" => {
                *self.request = Some(ShellRequest::Reset);
                Ok(NativeResult::Stop)
            }
            "agent_name" => done(self.agent.as_ref().map(|a| Value::str(a.name())).unwrap_or_default()),
            "agent_wait" => match &self.agent {
                Some(agent) if agent.is_busy() => Ok(NativeResult::Pending(Value::Null)),
                _ => done(Value::Null),
            },
            other => {
                log_warn!("unknown native {other}", other);
                Err(format!("undefined identifier '{other}'"))
            }
        }
    }

    fn echo(&mut self, value: &Value) {
        self.console.print(&value.to_string());
    }
}
