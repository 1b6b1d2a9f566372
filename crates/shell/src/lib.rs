// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Script shell for the virtual computer.
//!
//! A [`Shell`] owns one resumable [`Machine`], an environment and a
//! console. The host ticks it once per frame; running scripts get a fixed
//! time slice per tick and reach the disks through the participant's
//! [`diskfs::DiskRegistry`].

pub mod agent;
pub mod compiler;
pub mod config;
pub mod console;
pub mod env;
pub mod error;
pub mod intrinsics;
pub mod lexer;
pub mod shell;
pub mod value;
pub mod vm;

pub use agent::AgentContext;
pub use compiler::{Mode, compile};
pub use config::ShellConfig;
pub use console::Console;
pub use env::{Environment, PropertyOutcome, SetProperty, SideEffect};
pub use error::{Result, ScriptError};
pub use intrinsics::ShellRequest;
pub use shell::{PRESERVED_GLOBALS, STACK_AT_BREAK, Shell, ShellState};
pub use value::Value;
pub use vm::{Host, Machine, NativeResult, PendingCall, RunOutcome};
