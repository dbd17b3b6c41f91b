use serde::{Deserialize, Serialize};

/// One entry in a 400 response's `details` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Checks a decoded request body beyond what its types already guarantee.
pub trait Validate {
    fn validate(&self) -> Result<(), Vec<FieldError>>;
}

/// Accumulates field errors so a response can report all of them at once.
#[derive(Debug, Default)]
pub struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    /// Character-count bounds (not bytes), inclusive.
    pub fn length(&mut self, value: &str, field: &str, min: usize, max: usize) -> &mut Self {
        let len = value.trim().chars().count();
        if len < min {
            let message = if min == 1 {
                "must not be empty".to_string()
            } else {
                format!("must be at least {} characters", min)
            };
            self.errors.push(FieldError::new(field, message));
        } else if value.chars().count() > max {
            self.errors
                .push(FieldError::new(field, format!("must be at most {} characters", max)));
        }
        self
    }

    pub fn optional_length(
        &mut self,
        value: Option<&str>,
        field: &str,
        max: usize,
    ) -> &mut Self {
        if let Some(value) = value {
            if value.chars().count() > max {
                self.errors
                    .push(FieldError::new(field, format!("must be at most {} characters", max)));
            }
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), Vec<FieldError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_every_failure() {
        let errors = Checker::new()
            .length("", "title", 1, 10)
            .length("abcdefghijkl", "quantity", 1, 10)
            .check(false, "latitude", "out of range")
            .finish()
            .unwrap_err();

        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["title", "quantity", "latitude"]);
        assert_eq!(errors[0].message, "must not be empty");
    }

    #[test]
    fn whitespace_only_counts_as_empty() {
        assert!(Checker::new().length("   ", "content", 1, 10).finish().is_err());
        assert!(Checker::new().length("hi", "content", 1, 10).finish().is_ok());
    }
}
