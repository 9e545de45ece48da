// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Operator token checks.

use std::collections::HashSet;

/// Strip a case-insensitive "Bearer " prefix; the result is trimmed.
pub fn strip_bearer(value: &str) -> &str {
    let trimmed = value.trim();
    let prefix = "bearer ";
    match trimmed.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => trimmed[prefix.len()..].trim_start(),
        _ => trimmed,
    }
}

/// Decides whether an operator request may proceed.
pub trait TokenValidator: Send + Sync {
    /// Returns the rejection message for an unauthorized token.
    fn validate(&self, token: Option<&str>) -> Result<(), String>;
}

/// Accepts any of a fixed set of tokens; an empty set accepts everything.
pub struct SimpleTokenValidator {
    tokens: HashSet<String>,
}

impl SimpleTokenValidator {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenValidator for SimpleTokenValidator {
    fn validate(&self, token: Option<&str>) -> Result<(), String> {
        if self.tokens.is_empty() {
            return Ok(());
        }
        let Some(token) = token else {
            return Err("missing authorization token".into());
        };
        if self.tokens.contains(strip_bearer(token)) {
            Ok(())
        } else {
            Err("invalid authorization token".into())
        }
    }
}
