// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Envelope parsing and response framing.

use crate::types::{OperatorCommand, OperatorEnvelope, OperatorResponse};

/// Parse a JSON line into an OperatorEnvelope.
///
/// Falls back to a bare OperatorCommand without a token.
pub fn parse_envelope(input: &str) -> Result<OperatorEnvelope, serde_json::Error> {
    match serde_json::from_str::<OperatorEnvelope>(input) {
        Ok(envelope) => Ok(envelope),
        Err(_) => {
            let cmd = serde_json::from_str::<OperatorCommand>(input)?;
            Ok(OperatorEnvelope { token: None, cmd })
        }
    }
}

/// Serialize a response as one newline-terminated JSON line.
pub fn encode_response(response: &OperatorResponse) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    Ok(line)
}
