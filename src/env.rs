//! Configuration read from environment variables.

use tracing::warn;

/// Interpret a string value such as "1" or "no" as a boolean.
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Return whether a flag controlled by an environment variable is enabled.
///
/// Unrecognized values are logged and treated as `default`.
pub fn env_flag(name: &str, default: bool) -> bool {
    let Ok(value) = std::env::var(name) else {
        return default;
    };
    parse_bool(&value).unwrap_or_else(|| {
        warn!(var = name, value = %value, "unrecognized boolean value");
        default
    })
}

fn parse_usize(s: &str) -> Option<usize> {
    s.trim().parse().ok()
}

/// Return a size limit controlled by an environment variable.
///
/// Unrecognized values are logged and treated as `default`.
pub fn env_usize(name: &str, default: usize) -> usize {
    let Ok(value) = std::env::var(name) else {
        return default;
    };
    parse_usize(&value).unwrap_or_else(|| {
        warn!(var = name, value = %value, "unrecognized integer value");
        default
    })
}

#[cfg(test)]
mod tests {
    use super::{env_flag, env_usize, parse_bool, parse_usize};

    #[test]
    fn test_parse_bool() {
        for s in ["1", "true", "TRUE", "yes", " y ", "on"] {
            assert_eq!(parse_bool(s), Some(true), "{s}");
        }
        for s in ["0", "false", "No", "n", "off"] {
            assert_eq!(parse_bool(s), Some(false), "{s}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_parse_usize() {
        assert_eq!(parse_usize("16"), Some(16));
        assert_eq!(parse_usize(" 4\n"), Some(4));
        assert_eq!(parse_usize("-1"), None);
        assert_eq!(parse_usize(""), None);
    }

    #[test]
    fn test_unset_var_uses_default() {
        let name = "RTEN_DIMS_TEST_VAR_WHICH_IS_NEVER_SET";
        assert!(env_flag(name, true));
        assert!(!env_flag(name, false));
        assert_eq!(env_usize(name, 7), 7);
    }
}
