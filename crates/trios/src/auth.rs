use std::collections::HashSet;

/// Membership check for role "b" shared-secret tokens.
///
/// The accepted set is parsed once at startup from a comma-delimited string;
/// `accepts` is a pure function of that set and the presented token.
#[derive(Debug, Clone, Default)]
pub struct TokenValidator {
    accepted: HashSet<String>,
}

impl TokenValidator {
    /// Build the accepted set from a comma-delimited string.
    ///
    /// Entries are trimmed; empty entries are discarded.
    #[must_use]
    pub fn from_csv(csv: &str) -> Self {
        let accepted = csv
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .collect();
        Self { accepted }
    }

    /// Returns `true` iff `token` is present and a member of the accepted set.
    #[must_use]
    pub fn accepts(&self, token: Option<&str>) -> bool {
        token.is_some_and(|t| self.accepted.contains(t))
    }

    /// Number of accepted tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    /// Returns `true` when no tokens are accepted (role "b" can then never
    /// register).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}
