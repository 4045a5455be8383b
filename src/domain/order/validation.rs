use std::fmt;

use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use super::model::Order;

// ============================================================================
// Order Validation
// ============================================================================
//
// The field rules live on the model as `validator` attributes. This module
// runs them and flattens the nested result into one list of violations so a
// caller sees every broken field at once, addressed by its dotted path.
//
// ============================================================================

/// A single broken rule on a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// Dotted path into the order, e.g. `payment.amount` or `items[0].sale`.
    pub field: String,
    /// Rule code reported by the validator (`length`, `range`, `email`).
    pub code: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.field, self.code)
    }
}

/// Every rule the order violates, sorted by field path with list indices
/// compared numerically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    pub fn has_violation(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} field violation(s): ", self.violations.len())?;
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", violation)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationErrors> for ValidationError {
    fn from(errors: ValidationErrors) -> Self {
        let mut violations = Vec::new();
        flatten("", &errors, &mut violations);
        violations.sort_by(|a, b| {
            path_key(&a.field)
                .cmp(&path_key(&b.field))
                .then_with(|| a.code.cmp(&b.code))
        });
        Self { violations }
    }
}

/// Check an order against its structural and business rules.
pub fn validate(order: &Order) -> Result<(), ValidationError> {
    order.validate().map_err(ValidationError::from)
}

/// `items[10].sale` -> `[("items", Some(10)), ("sale", None)]`, so list
/// indices compare as numbers.
fn path_key(path: &str) -> Vec<(&str, Option<usize>)> {
    path.split('.')
        .map(|segment| {
            segment
                .strip_suffix(']')
                .and_then(|s| s.split_once('['))
                .and_then(|(name, index)| index.parse::<usize>().ok().map(|i| (name, Some(i))))
                .unwrap_or((segment, None))
        })
        .collect()
}

fn flatten(prefix: &str, errors: &ValidationErrors, out: &mut Vec<FieldViolation>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    out.push(FieldViolation {
                        field: path.clone(),
                        code: error.code.to_string(),
                    });
                }
            }
            ValidationErrorsKind::Struct(nested) => flatten(&path, nested, out),
            ValidationErrorsKind::List(entries) => {
                for (index, nested) in entries {
                    flatten(&format!("{}[{}]", path, index), nested, out);
                }
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
