// CLASSIFICATION: COMMUNITY
// Filename: args.rs v0.3
// Date Modified: 2026-10-19
// Author: Lukas Bower
//
// ─────────────────────────────────────────────────────────────
// ofboot · Firmware bootargs ingestion
//
// The firmware's `/chosen` `bootargs` string carries loader
// environment assignments separated by semicolons:
//
//   root=ieee1275/disk,2;  debug=all;prefix=/boot/grub
//
// Whitespace after a `;` is ignored.  Tokens without `=` are
// dropped; everything after the first `=` is the value.
//
// # Public API
// * [`ingest_bootargs`] – raw string → ordered `(key, value)` pairs
// * [`apply_bootargs`]  – ingest and write into an [`Environment`]
// ─────────────────────────────────────────────────────────────

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use log::debug;

use crate::bootloader::env::Environment;

/// Split a `bootargs` string into ordered environment assignments.
///
/// # Examples
///
/// ```
/// use ofboot::bootloader::args::ingest_bootargs;
///
/// let pairs = ingest_bootargs("root=/dev/sda1;quiet");
/// assert_eq!(pairs, vec![("root".to_string(), "/dev/sda1".to_string())]);
/// ```
pub fn ingest_bootargs(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .enumerate()
        .map(|(i, token)| if i == 0 { token } else { token.trim_start() })
        .filter_map(|token| token.split_once('='))
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

/// Ingest `raw` and set each pair in order; returns the number applied.
pub fn apply_bootargs<E: Environment + ?Sized>(env: &mut E, raw: &str) -> usize {
    let pairs = ingest_bootargs(raw);
    for (key, value) in &pairs {
        debug!("bootargs: {key}={value}");
        env.set(key, value);
    }
    pairs.len()
}

// ───────────────────────────── tests ─────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootloader::env::EnvMap;

    #[test]
    fn tokens_without_equals_are_dropped() {
        assert_eq!(
            ingest_bootargs("root=/dev/sda1;quiet"),
            vec![("root".to_string(), "/dev/sda1".to_string())]
        );
    }

    #[test]
    fn whitespace_after_separator_is_skipped() {
        let pairs = ingest_bootargs("a=1;   b=2;\tc=x=y");
        assert_eq!(pairs[1], ("b".to_string(), "2".to_string()));
        assert_eq!(pairs[2], ("c".to_string(), "x=y".to_string()));
    }

    #[test]
    fn leading_whitespace_of_first_token_is_kept() {
        assert_eq!(
            ingest_bootargs("  a=1; b=2"),
            vec![
                ("  a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn later_keys_overwrite_earlier() {
        let mut env = EnvMap::new();
        assert_eq!(apply_bootargs(&mut env, "debug=none;debug=all"), 2);
        assert_eq!(env.get("debug"), Some("all"));
    }

    #[test]
    fn empty_value_is_kept() {
        assert_eq!(
            ingest_bootargs("prefix="),
            vec![("prefix".to_string(), String::new())]
        );
    }
}
