// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Boot options for a [`Shell`](crate::Shell)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellConfig {
    /// Wall-clock budget for one running tick, in milliseconds
    #[serde(default = "default_time_slice_ms")]
    pub time_slice_ms: u64,

    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Prompt shown while an open block waits for more lines
    #[serde(default = "default_more_prompt")]
    pub more_prompt: String,

    /// Executed to completion during boot
    #[serde(default = "default_system_startup")]
    pub system_startup: String,

    /// Started as a run after the system script, when present
    #[serde(default = "default_user_startup")]
    pub user_startup: String,

    /// Whether a break request may cancel a running script
    #[serde(default = "default_allow_break")]
    pub allow_break: bool,

    #[serde(default = "default_initial_dir")]
    pub initial_dir: String,
}

fn default_time_slice_ms() -> u64 {
    30
}

fn default_prompt() -> String {
    "]".to_string()
}

fn default_more_prompt() -> String {
    "...]".to_string()
}

fn default_system_startup() -> String {
    "/sys/startup.ms".to_string()
}

fn default_user_startup() -> String {
    "/usr/startup.ms".to_string()
}

fn default_allow_break() -> bool {
    true
}

fn default_initial_dir() -> String {
    "/usr".to_string()
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            time_slice_ms: default_time_slice_ms(),
            prompt: default_prompt(),
            more_prompt: default_more_prompt(),
            system_startup: default_system_startup(),
            user_startup: default_user_startup(),
            allow_break: default_allow_break(),
            initial_dir: default_initial_dir(),
        }
    }
}

impl ShellConfig {
    #[must_use]
    pub fn time_slice(&self) -> Duration {
        Duration::from_millis(self.time_slice_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: ShellConfig = serde_yaml_ng::from_str("prompt: \"> \"\nallow_break: false\n").unwrap();
        assert_eq!(config.prompt, "> ");
        assert!(!config.allow_break);
        assert_eq!(config.more_prompt, "...]");
        assert_eq!(config.time_slice(), Duration::from_millis(30));
        assert_eq!(config.initial_dir, "/usr");
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: Result<ShellConfig, _> = serde_yaml_ng::from_str("promt: x\n");
        assert!(result.is_err());
    }
}
