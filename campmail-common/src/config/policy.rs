use serde::{Deserialize, Serialize};

/// How the client treats replies that the minimal conversation does not need.
///
/// The reply to the base64 username and the reply to `MAIL FROM` are read in
/// both modes. Only [`ReplyPolicy::Strict`] checks their codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReplyPolicy {
    /// Log the username and `MAIL FROM` replies and carry on.
    #[default]
    Lenient,

    /// Require `334` after the username and `250` after `MAIL FROM`.
    Strict,
}

impl ReplyPolicy {
    #[must_use]
    pub const fn is_strict(self) -> bool {
        matches!(self, Self::Strict)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_lenient() {
        assert_eq!(ReplyPolicy::default(), ReplyPolicy::Lenient);
        assert!(!ReplyPolicy::default().is_strict());
    }

    #[test]
    fn test_deserialize_snake_case() {
        let policy: ReplyPolicy = ron::from_str("strict").unwrap();
        assert!(policy.is_strict());
    }
}
