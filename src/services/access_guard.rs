//! Shared-secret gate in front of every page except the favicon.

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Admit,
    Deny,
}

/// Compares request-supplied tokens against the one configured at start-up.
///
/// Stateless: each call is judged on its own, with no session, expiry or
/// attempt counting.
#[derive(Clone, Default)]
pub struct AccessGuard {
    expected: Option<String>,
}

impl AccessGuard {
    pub fn new(expected: Option<String>) -> Self {
        Self {
            expected: expected.filter(|t| !t.is_empty()),
        }
    }

    /// The configured token, if any. Pages embed it in links and forms.
    pub fn token(&self) -> Option<&str> {
        self.expected.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.expected.is_some()
    }

    pub fn verdict(&self, supplied: Option<&str>) -> Verdict {
        match (&self.expected, supplied) {
            (None, _) => Verdict::Admit,
            (Some(expected), Some(supplied)) if expected.as_bytes() == supplied.as_bytes() => {
                Verdict::Admit
            }
            _ => Verdict::Deny,
        }
    }

    /// `Ok(())` to proceed, otherwise the 401 the caller should return.
    pub fn check(&self, supplied: Option<&str>) -> Result<(), AppError> {
        match self.verdict(supplied) {
            Verdict::Admit => Ok(()),
            Verdict::Deny => {
                tracing::warn!(token_supplied = supplied.is_some(), "rejected request token");
                Err(AppError::unauthorized())
            }
        }
    }
}

impl std::fmt::Debug for AccessGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGuard")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
