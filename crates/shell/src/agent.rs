// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

/// The in-world agent a shell runs on behalf of, if any.
///
/// The shell holds this weakly; once the agent is gone the related
/// intrinsics behave as if no agent were attached.
pub trait AgentContext {
    fn name(&self) -> String;

    /// True while the agent is busy with an action scripts must wait for
    fn is_busy(&self) -> bool;
}
