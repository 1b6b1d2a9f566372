// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Resumable bytecode machine.
//!
//! All execution state (frames, instruction pointers, operand stack and the
//! one outstanding native call) lives in [`Machine`], so a run can stop at
//! any instruction boundary and pick up again on a later tick.

use crate::compiler::{FunctionProto, OpCode};
use crate::error::{Result, ScriptError};
use crate::value::Value;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

const MAX_CALL_DEPTH: usize = 200;

/// Instructions executed between wall-clock checks
const CLOCK_STRIDE: u32 = 64;

/// What a native function reports back
#[derive(Debug, Clone, PartialEq)]
pub enum NativeResult {
    Done(Value),
    /// Not finished; call again next slice with this state
    Pending(Value),
    /// Finished, and the shell must take over before anything else runs
    Stop,
}

/// The services a running script can reach
pub trait Host {
    fn has_native(&self, name: &str) -> bool;

    /// Invoke a native function; `state` is the previous partial result
    /// when re-polling a pending call. `Err` becomes a runtime error.
    fn call_native(
        &mut self,
        name: &str,
        args: &[Value],
        state: Option<&Value>,
    ) -> std::result::Result<NativeResult, String>;

    /// Output of an immediate-mode expression statement
    fn echo(&mut self, value: &Value);
}

/// A native call waiting to be polled again
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub function: String,
    pub args: Vec<Value>,
    pub state: Value,
}

/// Why [`Machine::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing left to execute
    Finished,
    /// The time slice ran out mid-program
    OutOfTime,
    /// A native call is pending
    Waiting,
    /// A native call asked the shell to take over
    Stopped,
}

#[derive(Debug)]
struct Frame {
    proto: Rc<FunctionProto>,
    ip: usize,
    locals: BTreeMap<String, Value>,
    base: usize,
}

#[derive(Debug, Default)]
pub struct Machine {
    globals: BTreeMap<String, Value>,
    frames: Vec<Frame>,
    stack: Vec<Value>,
    pending: Option<PendingCall>,
}

enum Step {
    Continue,
    Yield(RunOutcome),
}

impl Machine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start executing `program` from its first instruction
    pub fn load(&mut self, program: Rc<FunctionProto>) {
        self.abort();
        self.frames.push(Frame {
            proto: program,
            ip: 0,
            locals: BTreeMap::new(),
            base: 0,
        });
    }

    /// Drop the running program, keeping the globals
    pub fn abort(&mut self) {
        self.frames.clear();
        self.stack.clear();
        self.pending = None;
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.frames.is_empty()
    }

    #[must_use]
    pub fn pending(&self) -> Option<&PendingCall> {
        self.pending.as_ref()
    }

    #[must_use]
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        _ = self.globals.insert(name.into(), value);
    }

    #[must_use]
    pub fn global_names(&self) -> Vec<String> {
        self.globals.keys().cloned().collect()
    }

    /// Forget every global not named in `keep`
    pub fn reset_globals(&mut self, keep: &[&str]) {
        self.globals.retain(|name, _| keep.contains(&name.as_str()));
    }

    /// Innermost call first, one line per frame
    #[must_use]
    pub fn stack_snapshot(&self) -> Vec<String> {
        self.frames
            .iter()
            .rev()
            .map(|frame| {
                let line = frame.proto.chunk.line_at(frame.ip.saturating_sub(1));
                format!("{} line {}", frame.proto.name, line)
            })
            .collect()
    }

    fn current_line(&self) -> usize {
        self.frames
            .last()
            .map_or(0, |f| f.proto.chunk.line_at(f.ip.saturating_sub(1)))
    }

    fn fail<T>(&self, message: impl Into<String>) -> Result<T> {
        Err(ScriptError::runtime(self.current_line(), message))
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value> {
        match self.stack.pop() {
            Some(value) => Ok(value),
            None => self.fail("stack underflow"),
        }
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        if self.frames.len() > 1
            && let Some(frame) = self.frames.last()
            && let Some(value) = frame.locals.get(name)
        {
            return Some(value.clone());
        }
        self.globals.get(name).cloned()
    }

    fn store(&mut self, name: &str, value: Value) {
        if self.frames.len() > 1
            && let Some(frame) = self.frames.last_mut()
        {
            _ = frame.locals.insert(name.to_string(), value);
            return;
        }
        _ = self.globals.insert(name.to_string(), value);
    }

    /// Run until the program finishes, yields, or `budget` is used up.
    ///
    /// A pending native call is polled once before any bytecode runs; if it
    /// is still pending the slice ends there.
    pub fn run(&mut self, host: &mut dyn Host, budget: Option<Duration>) -> Result<RunOutcome> {
        let started = Instant::now();

        if let Some(call) = self.pending.take() {
            let result = host
                .call_native(&call.function, &call.args, Some(&call.state))
                .or_else(|message| self.fail(message))?;
            if let Step::Yield(outcome) = self.native_result(call.function, call.args, result) {
                return Ok(outcome);
            }
        }

        let mut executed: u32 = 0;
        loop {
            if self.frames.is_empty() {
                return Ok(RunOutcome::Finished);
            }
            executed = executed.wrapping_add(1);
            if executed % CLOCK_STRIDE == 0
                && let Some(budget) = budget
                && started.elapsed() >= budget
            {
                return Ok(RunOutcome::OutOfTime);
            }
            if let Step::Yield(outcome) = self.step(host)? {
                return Ok(outcome);
            }
        }
    }

    fn native_result(&mut self, function: String, args: Vec<Value>, result: NativeResult) -> Step {
        match result {
            NativeResult::Done(value) => {
                self.push(value);
                Step::Continue
            }
            NativeResult::Pending(state) => {
                self.pending = Some(PendingCall {
                    function,
                    args,
                    state,
                });
                Step::Yield(RunOutcome::Waiting)
            }
            NativeResult::Stop => {
                self.push(Value::Null);
                Step::Yield(RunOutcome::Stopped)
            }
        }
    }

    fn call(&mut self, host: &mut dyn Host, name: &str, args: Vec<Value>) -> Result<Step> {
        match self.lookup(name) {
            Some(Value::Function(proto)) => self.enter(proto, args),
            Some(other) if args.is_empty() => {
                self.push(other);
                Ok(Step::Continue)
            }
            Some(other) => self.fail(format!("'{name}' is a {}, not a function", other.type_name())),
            None if host.has_native(name) => {
                let result = host
                    .call_native(name, &args, None)
                    .or_else(|message| self.fail(message))?;
                Ok(self.native_result(name.to_string(), args, result))
            }
            None => self.fail(format!("undefined identifier '{name}'")),
        }
    }

    fn enter(&mut self, proto: Rc<FunctionProto>, args: Vec<Value>) -> Result<Step> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return self.fail("call stack too deep");
        }
        if args.len() > proto.params.len() {
            return self.fail(format!(
                "too many arguments for {} ({} given, {} expected)",
                proto.name,
                args.len(),
                proto.params.len()
            ));
        }
        let mut locals = BTreeMap::new();
        let mut args = args.into_iter();
        for param in &proto.params {
            _ = locals.insert(param.clone(), args.next().unwrap_or_default());
        }
        self.frames.push(Frame {
            proto,
            ip: 0,
            locals,
            base: self.stack.len(),
        });
        Ok(Step::Continue)
    }

    fn leave(&mut self, value: Value) -> Step {
        if let Some(frame) = self.frames.pop() {
            self.stack.truncate(frame.base);
        }
        if self.frames.is_empty() {
            self.stack.clear();
            return Step::Yield(RunOutcome::Finished);
        }
        self.push(value);
        Step::Continue
    }

    fn jump(&mut self, target: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.ip = target;
        }
    }

    fn step(&mut self, host: &mut dyn Host) -> Result<Step> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(Step::Yield(RunOutcome::Finished));
        };
        let proto = frame.proto.clone();
        let Some(op) = proto.chunk.ops.get(frame.ip) else {
            return Ok(self.leave(Value::Null));
        };
        frame.ip += 1;

        match op {
            OpCode::Constant(value) => self.push(value.clone()),
            OpCode::LoadVar(name) => match self.lookup(name) {
                Some(Value::Function(proto)) => return self.enter(proto, Vec::new()),
                Some(value) => self.push(value),
                None => return self.call(host, name, Vec::new()),
            },
            OpCode::LoadRaw(name) => match self.lookup(name) {
                Some(value) => self.push(value),
                None => return self.fail(format!("undefined identifier '{name}'")),
            },
            OpCode::StoreVar(name) => {
                let value = self.pop()?;
                self.store(name, value);
            }
            OpCode::Pop => {
                _ = self.pop()?;
            }
            OpCode::Echo => {
                let value = self.pop()?;
                if !value.is_null() {
                    host.echo(&value);
                }
            }
            OpCode::Binary(op) => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let value = op.apply(&lhs, &rhs).or_else(|message| self.fail(message))?;
                self.push(value);
            }
            OpCode::Negate => {
                let value = self.pop()?;
                let n = value.as_number().or_else(|message| self.fail(message))?;
                self.push(Value::Number(-n));
            }
            OpCode::Not => {
                let value = self.pop()?;
                self.push(Value::bool(!value.is_truthy()));
            }
            OpCode::MakeList(count) => {
                let at = self.stack.len().saturating_sub(*count);
                let items = self.stack.split_off(at);
                self.push(Value::list(items));
            }
            OpCode::Index => {
                let index = self.pop()?;
                let target = self.pop()?;
                let value = target.index(&index).or_else(|message| self.fail(message))?;
                self.push(value);
            }
            OpCode::Jump(target) => self.jump(*target),
            OpCode::JumpIfFalse(target) => {
                if !self.pop()?.is_truthy() {
                    self.jump(*target);
                }
            }
            OpCode::JumpIfFalseKeep(target) => {
                if self.stack.last().is_some_and(Value::is_truthy) {
                    _ = self.pop()?;
                } else {
                    self.jump(*target);
                }
            }
            OpCode::JumpIfTrueKeep(target) => {
                if self.stack.last().is_some_and(Value::is_truthy) {
                    self.jump(*target);
                } else {
                    _ = self.pop()?;
                }
            }
            OpCode::ForNext {
                list,
                index,
                var,
                exit,
            } => {
                let items = self.lookup(list).unwrap_or_default();
                let position = self
                    .lookup(index)
                    .unwrap_or_default()
                    .as_number()
                    .or_else(|message| self.fail(message))? as usize;
                let len = items.iter_len().or_else(|message| self.fail(message))?;
                if position < len {
                    let item = items
                        .index(&Value::Number(position as f64))
                        .or_else(|message| self.fail(message))?;
                    self.store(var, item);
                    self.store(index, Value::Number((position + 1) as f64));
                } else {
                    self.jump(*exit);
                }
            }
            OpCode::Call { name, argc } => {
                let at = self.stack.len().saturating_sub(*argc);
                let args = self.stack.split_off(at);
                return self.call(host, name, args);
            }
            OpCode::Return => {
                let value = self.pop()?;
                return Ok(self.leave(value));
            }
        }
        Ok(Step::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Mode, compile};

    /// Records output; `tick` stays pending for `remaining` polls
    #[derive(Default)]
    struct TestHost {
        output: Vec<String>,
        remaining: u32,
        polls: u32,
    }

    impl Host for TestHost {
        fn has_native(&self, name: &str) -> bool {
            matches!(name, "print" | "tick" | "stop")
        }

        fn call_native(
            &mut self,
            name: &str,
            args: &[Value],
            state: Option<&Value>,
        ) -> std::result::Result<NativeResult, String> {
            match name {
                "print" => {
                    let text: Vec<String> = args.iter().map(Value::to_string).collect();
                    self.output.push(text.join(" "));
                    Ok(NativeResult::Done(Value::Null))
                }
                "tick" => {
                    self.polls += 1;
                    if state.is_none() {
                        self.remaining = 2;
                    }
                    if self.remaining == 0 {
                        Ok(NativeResult::Done(Value::str("ticked")))
                    } else {
                        self.remaining -= 1;
                        Ok(NativeResult::Pending(Value::Number(f64::from(self.remaining))))
                    }
                }
                "stop" => Ok(NativeResult::Stop),
                other => Err(format!("no native {other}")),
            }
        }

        fn echo(&mut self, value: &Value) {
            self.output.push(format!("echo {value}"));
        }
    }

    fn run_all(source: &str) -> (Machine, TestHost) {
        let mut machine = Machine::new();
        let mut host = TestHost::default();
        machine.load(compile(source, Mode::Program).unwrap());
        let outcome = machine.run(&mut host, None).unwrap();
        assert_eq!(outcome, RunOutcome::Finished);
        (machine, host)
    }

    #[test]
    fn test_loops_and_functions() {
        let (machine, host) = run_all(
            "\
fib = function(n)
  if n < 2 then
    return n
  end if
  return fib(n - 1) + fib(n - 2)
end function
out = []
for i in [1, 2, 3, 4, 5, 6]
  if i == 3 then
    continue
  end if
  if i > 5 then
    break
  end if
  out = out + [fib(i)]
end for
n = 0
while n < 10
  n = n + 3
end while
print out, n
",
        );
        assert_eq!(host.output, vec!["[1, 1, 3, 5] 12"]);
        assert_eq!(machine.global("n"), Some(&Value::Number(12.0)));
    }

    #[test]
    fn test_locals_do_not_leak() {
        let (machine, _) = run_all("f = function(a)\n  b = a * 2\n  return b\nend function\nc = f(4)");
        assert_eq!(machine.global("c"), Some(&Value::Number(8.0)));
        assert!(machine.global("b").is_none());
        assert!(machine.global("a").is_none());
    }

    #[test]
    fn test_logic_short_circuits() {
        let (machine, host) = run_all("x = 0 and missing\ny = 1 or missing\nz = not x");
        assert!(host.output.is_empty());
        assert_eq!(machine.global("x"), Some(&Value::Number(0.0)));
        assert_eq!(machine.global("y"), Some(&Value::Number(1.0)));
        assert_eq!(machine.global("z"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_pending_call_resumes() {
        let mut machine = Machine::new();
        let mut host = TestHost::default();
        machine.load(compile("r = tick\nprint r", Mode::Program).unwrap());

        assert_eq!(machine.run(&mut host, None).unwrap(), RunOutcome::Waiting);
        assert_eq!(machine.pending().unwrap().function, "tick");
        assert_eq!(machine.run(&mut host, None).unwrap(), RunOutcome::Waiting);
        assert_eq!(machine.run(&mut host, None).unwrap(), RunOutcome::Finished);
        assert_eq!(host.polls, 3);
        assert_eq!(host.output, vec!["ticked"]);
        assert!(machine.pending().is_none());
    }

    #[test]
    fn test_time_slice_yields() {
        let mut machine = Machine::new();
        let mut host = TestHost::default();
        machine.load(compile("while true\nend while", Mode::Program).unwrap());
        let outcome = machine.run(&mut host, Some(Duration::from_millis(5))).unwrap();
        assert_eq!(outcome, RunOutcome::OutOfTime);
        assert!(machine.is_running());
        let snapshot = machine.stack_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].starts_with("main line "));
    }

    #[test]
    fn test_runtime_error_reports_line() {
        let mut machine = Machine::new();
        let mut host = TestHost::default();
        machine.load(compile("x = 1\ny = x / 0", Mode::Program).unwrap());
        let err = machine.run(&mut host, None).unwrap_err();
        assert_eq!(err.to_string(), "Runtime Error: division by zero [line 2]");
    }

    #[test]
    fn test_stack_snapshot_inside_function() {
        let mut machine = Machine::new();
        let mut host = TestHost::default();
        machine.load(compile("f = function\n  tick\nend function\nf", Mode::Program).unwrap());
        assert_eq!(machine.run(&mut host, None).unwrap(), RunOutcome::Waiting);
        assert_eq!(machine.stack_snapshot(), vec!["f line 2", "main line 4"]);
    }

    #[test]
    fn test_stop_and_reset_globals() {
        let mut machine = Machine::new();
        let mut host = TestHost::default();
        machine.load(compile("keep = 1\ndrop = 2\nstop\nprint 3", Mode::Program).unwrap());
        assert_eq!(machine.run(&mut host, None).unwrap(), RunOutcome::Stopped);
        machine.abort();
        machine.reset_globals(&["keep"]);
        assert_eq!(machine.global_names(), vec!["keep"]);
        assert!(host.output.is_empty());
    }
}
