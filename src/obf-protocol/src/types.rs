// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Transport DTOs for the JSON line protocol.

use serde::{Deserialize, Serialize};

use obf_core::{BuildStatus, ParameterSnapshot};

/// Command received from operator clients (JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum OperatorCommand {
    GetStatus,
    GetParameters,
    SetParameter { name: String, value: i64 },
}

/// Envelope for operator commands with optional authentication token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorEnvelope {
    pub token: Option<String>,
    #[serde(flatten)]
    pub cmd: OperatorCommand,
}

/// Response sent to operator clients over TCP.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorResponse {
    pub success: bool,
    pub status: Option<BuildStatus>,
    pub parameters: Option<ParameterSnapshot>,
    pub error: Option<String>,
}

impl OperatorResponse {
    pub fn status(status: BuildStatus) -> Self {
        Self {
            success: true,
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn parameters(parameters: ParameterSnapshot) -> Self {
        Self {
            success: true,
            parameters: Some(parameters),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }
}
