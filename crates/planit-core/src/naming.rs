//! Local-to-remote identifier translation.
//!
//! Remote method names are the camel-case form of the local snake_case
//! operation names. The rule is a wire-level compatibility contract: there are
//! no per-method overrides.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Character stripped before translation.
const STRIPPED_CHAR: char = '>';

/// An underscore followed by an ASCII letter.
static UNDERSCORE_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_([a-zA-Z])").expect("identifier regex must compile"));

/// Translate a local identifier into the engine's method naming convention.
///
/// # Rules Applied
/// 1. Remove every `>` character
/// 2. Replace each `_x` (underscore followed by a letter) with `X`
/// 3. A match at position 0 is left alone, so a leading underscore survives
///
/// Applying the rule to its own output is a no-op, except for a run of
/// underscores before a letter inside the name: each pass consumes one
/// underscore, so `set__max` becomes `set_Max` and then `setMax`.
///
/// # Examples
///
/// ```
/// use planit_core::naming::to_remote_identifier;
///
/// assert_eq!(to_remote_identifier("set_max_iterations"), "setMaxIterations");
/// assert_eq!(to_remote_identifier("setMaxIterations"), "setMaxIterations");
/// assert_eq!(to_remote_identifier("_private_field"), "_privateField");
/// ```
pub fn to_remote_identifier(local: &str) -> String {
    let stripped: String = local.chars().filter(|&c| c != STRIPPED_CHAR).collect();

    UNDERSCORE_LETTER
        .replace_all(&stripped, |caps: &Captures| {
            let whole = &caps[0];
            let at_start = caps.get(0).map(|m| m.start() == 0).unwrap_or(false);
            if at_start {
                whole.to_string()
            } else {
                caps[1].to_uppercase()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case_to_camel_case() {
        assert_eq!(to_remote_identifier("set_max_iterations"), "setMaxIterations");
        assert_eq!(to_remote_identifier("get_settings"), "getSettings");
        assert_eq!(to_remote_identifier("run"), "run");
    }

    #[test]
    fn test_already_camel_case_is_unchanged() {
        assert_eq!(to_remote_identifier("setMaxIterations"), "setMaxIterations");
    }

    #[test]
    fn test_mixed_case_segments() {
        // Upper-case letters after an underscore are kept upper-case.
        assert_eq!(
            to_remote_identifier("set_persist_only_final_Iteration"),
            "setPersistOnlyFinalIteration"
        );
    }

    #[test]
    fn test_leading_underscore_preserved() {
        assert_eq!(to_remote_identifier("_hidden"), "_hidden");
        assert_eq!(to_remote_identifier("_hidden_value"), "_hiddenValue");
    }

    #[test]
    fn test_angle_bracket_stripped() {
        assert_eq!(to_remote_identifier("get>_network"), "getNetwork");
        assert_eq!(to_remote_identifier(">run"), "run");
    }

    #[test]
    fn test_underscore_before_digit_is_kept() {
        assert_eq!(to_remote_identifier("time_period_1"), "timePeriod_1");
    }

    #[test]
    fn test_translation_is_idempotent() {
        for local in [
            "set_max_iterations",
            "create_and_register_traffic_assignment",
            "_leading_underscore",
            "is_output_type_active",
            "get>_value",
            "time_period_1",
        ] {
            let once = to_remote_identifier(local);
            assert_eq!(to_remote_identifier(&once), once, "not idempotent for {local}");
        }
    }

    #[test]
    fn test_repeated_underscores_collapse_one_per_pass() {
        let once = to_remote_identifier("set__max");
        assert_eq!(once, "set_Max");
        assert_eq!(to_remote_identifier(&once), "setMax");

        // A leading run keeps its first underscore and settles after one pass.
        let once = to_remote_identifier("__init");
        assert_eq!(once, "_Init");
        assert_eq!(to_remote_identifier(&once), once);
    }
}
