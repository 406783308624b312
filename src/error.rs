use thiserror::Error;

pub type FormulaResult<T> = Result<T, FormulaError>;

pub type DocumentResult<T> = Result<T, DocumentError>;

/// Message shown in place of a blank value when `sqrt` receives a negative number
pub const SQRT_NEGATIVE_MESSAGE: &str = "Cannot calculate square root of negative number";

/// Errors produced while parsing or evaluating a formula.
///
/// These are values, not exceptions: they are cached per field and compared
/// in tests, hence `Clone + PartialEq`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("Invalid reference: {path}")]
    InvalidReference { path: String },

    #[error("Circular reference: {}", .cycle.join(" -> "))]
    CircularReference { cycle: Vec<String> },

    #[error("Type error in {operation}: {operands}")]
    Type { operation: String, operands: String },

    #[error("{operation}: {reason}")]
    Domain { operation: String, reason: String },

    #[error("Cannot convert '{input}' to a number")]
    Conversion { input: String },
}

impl FormulaError {
    pub fn parse(message: impl Into<String>, position: usize) -> Self {
        FormulaError::Parse {
            position,
            message: message.into(),
        }
    }

    pub fn invalid_reference(path: impl Into<String>) -> Self {
        FormulaError::InvalidReference { path: path.into() }
    }

    pub fn type_error(operation: impl Into<String>, operands: impl Into<String>) -> Self {
        FormulaError::Type {
            operation: operation.into(),
            operands: operands.into(),
        }
    }

    pub fn domain(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        FormulaError::Domain {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// The product-defined text a field shows instead of going blank, if any.
    pub fn display_message(&self) -> Option<&str> {
        match self {
            FormulaError::Domain { operation, reason } if operation == "sqrt" => Some(reason),
            _ => None,
        }
    }
}

/// Errors from loading documents and configuration, and from the CLI.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Formula(#[from] FormulaError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_reference_display() {
        let err = FormulaError::CircularReference {
            cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "Circular reference: a -> b -> a");
    }

    #[test]
    fn test_display_message_only_for_sqrt() {
        let sqrt = FormulaError::domain("sqrt", SQRT_NEGATIVE_MESSAGE);
        assert_eq!(sqrt.display_message(), Some(SQRT_NEGATIVE_MESSAGE));

        let pow = FormulaError::domain("pow", "Result is not a real number");
        assert_eq!(pow.display_message(), None);
        assert_eq!(FormulaError::invalid_reference("x").display_message(), None);
    }
}
