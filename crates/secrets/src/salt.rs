//! Salt configuration for secret fingerprinting with rotation support

/// Salt configuration for secret fingerprinting with rotation support
#[derive(Debug, Clone, Default)]
pub struct SaltConfig {
    /// Current salt (used for writing new fingerprints)
    pub current: Option<String>,
    /// Previous salt (accepted for reading during rotation)
    pub previous: Option<String>,
}

impl SaltConfig {
    /// Create a new salt config with only a current salt
    #[must_use]
    pub fn new(current: Option<String>) -> Self {
        Self {
            current,
            previous: None,
        }
    }

    /// Create a salt config with rotation support
    #[must_use]
    pub fn with_rotation(current: Option<String>, previous: Option<String>) -> Self {
        Self { current, previous }
    }

    /// Check if any salt is available
    #[must_use]
    pub fn has_salt(&self) -> bool {
        self.current.is_some() || self.previous.is_some()
    }

    /// Get the current salt for writing (returns current, or previous if current is None)
    #[must_use]
    pub fn write_salt(&self) -> Option<&str> {
        self.current.as_deref().or(self.previous.as_deref())
    }
}
