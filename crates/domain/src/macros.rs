//! Macro for implementing Display and FromStr for status enums
//!
//! Eliminates boilerplate for status enum conversions by providing a single
//! implementation for both Display and FromStr traits. Parsing is
//! case-insensitive; string output is always the canonical lowercase form.

/// Implements Display and FromStr traits for status enums
///
/// # Arguments
///
/// * `$enum_name` - The name of the enum type
/// * `$variant => $str` - Mapping of enum variants to their string
///   representations
#[macro_export]
macro_rules! impl_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestStatus {
        Pending,
        Sent,
        Failed,
    }

    impl_status_conversions!(TestStatus {
        Pending => "pending",
        Sent => "sent",
        Failed => "failed",
    });

    #[test]
    fn display_uses_lowercase() {
        assert_eq!(TestStatus::Pending.to_string(), "pending");
        assert_eq!(TestStatus::Sent.to_string(), "sent");
        assert_eq!(TestStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn fromstr_is_case_insensitive() {
        assert_eq!(TestStatus::from_str("PENDING").unwrap(), TestStatus::Pending);
        assert_eq!(TestStatus::from_str("Sent").unwrap(), TestStatus::Sent);
        assert_eq!(TestStatus::from_str("faILed").unwrap(), TestStatus::Failed);
    }

    #[test]
    fn fromstr_rejects_unknown_values() {
        let result = TestStatus::from_str("bogus");
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Invalid TestStatus: bogus"));
    }

    #[test]
    fn roundtrip() {
        for status in [TestStatus::Pending, TestStatus::Sent, TestStatus::Failed] {
            let parsed = TestStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(status, parsed);
        }
    }
}
