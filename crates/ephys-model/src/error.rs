// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Model assembly error types.

Validation failures (bad names, bounds, templates, unknown keys) are kept
apart from state failures (unfrozen or conflicting parameters, double
instantiation) so callers can tell a mis-built model from a mis-used one.
*/

use thiserror::Error;

use crate::host::HostError;
use crate::numeric::Numeric;

/// Errors raised while building, freezing, rendering or instantiating models
#[derive(Error, Debug)]
pub enum ModelError {
    /// Name is not a valid host identifier
    #[error("Invalid name '{0}': names must start with a letter or underscore and contain only letters, digits and underscores")]
    InvalidName(String),

    #[error("Invalid bounds for {name}: lower {lower} is greater than upper {upper}")]
    InvalidBounds { name: String, lower: f64, upper: f64 },

    #[error("Value {value} of {name} is outside bounds [{lower}, {upper}]")]
    OutOfBounds {
        name: String,
        value: Numeric,
        lower: f64,
        upper: f64,
    },

    /// Distribution template could not be parsed
    #[error("Malformed distribution template '{template}': {reason}")]
    Template { template: String, reason: String },

    /// A coefficient used by a distribution has no value yet
    #[error("Coefficient '{0}' has no value")]
    MissingCoefficient(String),

    #[error("Unknown coefficient '{0}'")]
    UnknownCoefficient(String),

    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("Duplicate parameter '{0}'")]
    DuplicateParameter(String),

    /// Numeric formula failed to evaluate
    #[error("Cannot evaluate '{formula}': {reason}")]
    Formula { formula: String, reason: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Parameter is already frozen at a different value
    #[error("Parameter {name} is frozen at {current}, cannot freeze at {requested}")]
    FrozenConflict {
        name: String,
        current: Numeric,
        requested: Numeric,
    },

    #[error("Values of parameters [{}] need to be frozen before the model can be used", .names.join(", "))]
    Unfrozen { names: Vec<String> },

    #[error("Model {0} is already instantiated")]
    AlreadyInstantiated(String),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    /// True for errors caused by malformed input rather than call order
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ModelError::InvalidName(_)
                | ModelError::InvalidBounds { .. }
                | ModelError::OutOfBounds { .. }
                | ModelError::Template { .. }
                | ModelError::UnknownCoefficient(_)
                | ModelError::UnknownParameter(_)
                | ModelError::DuplicateParameter(_)
                | ModelError::Validation(_)
        )
    }

    /// True for errors caused by the freeze/instantiate lifecycle
    pub fn is_state(&self) -> bool {
        matches!(
            self,
            ModelError::MissingCoefficient(_)
                | ModelError::FrozenConflict { .. }
                | ModelError::Unfrozen { .. }
                | ModelError::AlreadyInstantiated(_)
        )
    }
}

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Host identifier rule: `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Fails with [`ModelError::InvalidName`] unless `name` is a valid identifier
pub fn validate_name(name: &str) -> ModelResult<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(ModelError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rule() {
        for name in ["test", "_x", "CellModel", "cell_2"] {
            assert!(is_valid_identifier(name), "{}", name);
        }
        for name in ["3test", "", "test$", "test 3", "a-b"] {
            assert!(!is_valid_identifier(name), "{}", name);
        }
    }

    #[test]
    fn test_error_classes() {
        assert!(validate_name("3test").unwrap_err().is_validation());
        let err = ModelError::Unfrozen {
            names: vec!["gnabar".into(), "cm".into()],
        };
        assert!(err.is_state());
        assert!(err.to_string().contains("gnabar, cm"));
    }
}
