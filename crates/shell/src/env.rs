// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Shell environment and the property writes scripts make to it.
//!
//! A write is a [`SetProperty`] command. Most keys are simply stored, a
//! few are refused, and some are handled by the shell as a
//! [`SideEffect`] instead of landing in the map.

use std::collections::BTreeMap;

/// Key holding the current directory
pub const CURDIR: &str = "curdir";

/// Key that toggles interactive break
pub const ALLOW_BREAK: &str = "allowBreak";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetProperty {
    pub key: String,
    pub value: String,
}

impl SetProperty {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Value is the requested directory, not yet resolved
    ChangeDirectory(String),
    AllowBreak(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyOutcome {
    Accepted,
    /// Reason in the script error convention
    Rejected(String),
    Handled(SideEffect),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Store without dispatch; for values the shell itself owns
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        _ = self.vars.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.vars.keys().map(String::as_str).collect()
    }

    /// Decide what a script-level write means
    pub fn apply(&mut self, command: SetProperty) -> PropertyOutcome {
        let SetProperty { key, value } = command;
        match key.as_str() {
            "" => PropertyOutcome::Rejected("Error: empty property name".to_string()),
            k if k.starts_with('_') => PropertyOutcome::Rejected(format!("Error: {k} is read-only")),
            CURDIR => PropertyOutcome::Handled(SideEffect::ChangeDirectory(value)),
            ALLOW_BREAK => match value.as_str() {
                "1" | "true" => PropertyOutcome::Handled(SideEffect::AllowBreak(true)),
                "0" | "false" => PropertyOutcome::Handled(SideEffect::AllowBreak(false)),
                other => PropertyOutcome::Rejected(format!(
                    "Error: allowBreak expects true or false, got {other}"
                )),
            },
            _ => {
                _ = self.vars.insert(key.clone(), value);
                PropertyOutcome::Accepted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_keys_are_stored() {
        let mut env = Environment::new();
        assert_eq!(env.apply(SetProperty::new("color", "green")), PropertyOutcome::Accepted);
        assert_eq!(env.get("color"), Some("green"));
    }

    #[test]
    fn test_special_keys() {
        let mut env = Environment::new();
        assert_eq!(
            env.apply(SetProperty::new(CURDIR, "../net")),
            PropertyOutcome::Handled(SideEffect::ChangeDirectory("../net".into()))
        );
        assert_eq!(
            env.apply(SetProperty::new(ALLOW_BREAK, "0")),
            PropertyOutcome::Handled(SideEffect::AllowBreak(false))
        );
        assert!(matches!(
            env.apply(SetProperty::new(ALLOW_BREAK, "maybe")),
            PropertyOutcome::Rejected(_)
        ));
        assert!(env.get(CURDIR).is_none());
    }

    #[test]
    fn test_hidden_keys_rejected() {
        let mut env = Environment::new();
        assert!(matches!(env.apply(SetProperty::new("_secret", "x")), PropertyOutcome::Rejected(_)));
        assert!(matches!(env.apply(SetProperty::new("", "x")), PropertyOutcome::Rejected(_)));
        assert!(env.keys().is_empty());
    }
}
