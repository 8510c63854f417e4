//! Validation error aggregate.

use serde::Serialize;

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    /// Rule that failed (`required`, `related_min_size`, `transaction`, ...).
    pub rule: String,
    /// Formatted message, including the configured delimiters.
    pub message: String,
}

/// Errors recorded on an entity by validation and persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorSet {
    pub items: Vec<FieldError>,
}

impl ErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn push(
        &mut self,
        field: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.items.push(FieldError {
            field: field.into(),
            rule: rule.into(),
            message: message.into(),
        });
    }

    /// The latest message recorded for `field`.
    pub fn field(&self, field: &str) -> Option<&str> {
        self.items
            .iter()
            .rev()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    /// Every message, in the order recorded.
    pub fn all(&self) -> Vec<&str> {
        self.items.iter().map(|e| e.message.as_str()).collect()
    }

    /// All messages concatenated.
    pub fn string(&self) -> String {
        self.items.iter().map(|e| e.message.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl std::fmt::Display for ErrorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.all().join("; "))
    }
}
