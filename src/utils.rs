//! # Utility Functions Module
//!
//! Small helpers shared by the converter and the manifest code.

use std::time::SystemTime;

/// Builds a `Vec<String>` argument list from heterogeneous expressions.
///
/// Command lines for external tools mix literals, numbers and paths;
/// every item only needs to implement `Display`.
///
/// ```rust,ignore
/// let quality = 85;
/// let args = args!["-q", quality, "-resize", format!("{}x>", 1200)];
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        vec![$($item.to_string()),*]
    };
}

/// Seconds since the Unix epoch, 0 if the clock is before it
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    #[test]
    fn test_args_macro_mixed_types() {
        let width = 300;
        let path = std::path::Path::new("a b.png").to_string_lossy();
        let result = args!["-resize", format!("{}x>", width), path];
        assert_eq!(result, vec!["-resize", "300x>", "a b.png"]);
    }

    #[test]
    fn test_args_macro() {
        let quality = 85;
        let result = args!["-q", quality, "-m", 6u8];
        assert_eq!(result, vec!["-q", "85", "-m", "6"]);
    }

    #[test]
    fn test_unix_now_is_recent() {
        // 2020-01-01
        assert!(unix_now() > 1_577_836_800);
    }
}
