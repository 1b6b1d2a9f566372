// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Text display plus the pending input a shell consumes.

use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct Console {
    output: String,
    keys: VecDeque<char>,
    lines: VecDeque<String>,
}

impl Console {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text` and a newline
    pub fn print(&mut self, text: &str) {
        self.output.push_str(text);
        self.output.push('\n');
    }

    /// Append `text` as is
    pub fn write(&mut self, text: &str) {
        self.output.push_str(text);
    }

    /// Everything written since the last call
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn push_key(&mut self, key: char) {
        self.keys.push_back(key);
    }

    pub fn next_key(&mut self) -> Option<char> {
        self.keys.pop_front()
    }

    #[must_use]
    pub fn has_key(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn clear_keys(&mut self) {
        self.keys.clear();
    }

    /// Queue a committed line for a script waiting in `input`
    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push_back(line.into());
    }

    pub fn next_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }
}
