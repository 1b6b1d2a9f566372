// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Failures while compiling or running a script
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Compiler Error: {message} [line {line}]")]
    Compile { line: usize, message: String },

    /// The source ends inside an open block; more lines are needed
    #[error("Compiler Error: unexpected end of input")]
    NeedMoreInput,

    #[error("Runtime Error: {message} [line {line}]")]
    Runtime { line: usize, message: String },
}

impl ScriptError {
    pub(crate) fn compile(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Compile {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn runtime(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Runtime {
            line,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn line(&self) -> Option<usize> {
        match self {
            ScriptError::Compile { line, .. } | ScriptError::Runtime { line, .. } => Some(*line),
            ScriptError::NeedMoreInput => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScriptError>;
