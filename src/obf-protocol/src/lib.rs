// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Operator protocol for obf-rs.
//!
//! JSON line DTOs exchanged with operator clients, envelope parsing and
//! token validation.

pub mod auth;
pub mod codec;
pub mod types;

pub use auth::{SimpleTokenValidator, TokenValidator};
pub use codec::{encode_response, parse_envelope};
pub use types::{OperatorCommand, OperatorEnvelope, OperatorResponse};
