// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

/// Registry key for a machine backend: its ASCII letters and digits, lowercased,
/// so `Arcam-A2X` and `arcam_a2x` select the same backend.
pub fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Simulated"), "simulated");
        assert_eq!(normalize_name("arcam-a2x"), "arcama2x");
        assert_eq!(normalize_name("freemelt_one"), "freemeltone");
        assert_eq!(normalize_name("Arcam-A2X"), normalize_name("arcam_a2x"));
    }
}
