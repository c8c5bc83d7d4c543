//! Drift detection between a desired spec and observed remote state.

use crate::types::ResourceKind;
use crate::variables::{InputVariable, VariableType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Observed state that diverges from the desired spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drift {
    pub kind: ResourceKind,
    /// Name of the drifted entity
    pub name: String,
    /// First field found to differ
    pub field: String,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} drifted on {}: expected {}, found {}",
            self.kind, self.name, self.field, self.expected, self.actual
        )
    }
}

/// Field-by-field comparison that stops at the first difference.
///
/// ```
/// use waypointkit::drift::DriftCheck;
/// use waypointkit::ResourceKind;
///
/// let drift = DriftCheck::new(ResourceKind::Project, "demo")
///     .field("description", "desired", "observed")
///     .finish();
/// assert_eq!(drift.unwrap().field, "description");
/// ```
#[derive(Debug)]
pub struct DriftCheck {
    kind: ResourceKind,
    name: String,
    found: Option<Drift>,
}

impl DriftCheck {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            found: None,
        }
    }

    fn record(&mut self, field: &str, expected: String, actual: String) {
        if self.found.is_none() {
            self.found = Some(Drift {
                kind: self.kind,
                name: self.name.clone(),
                field: field.to_string(),
                expected,
                actual,
            });
        }
    }

    /// Compare a single field.
    #[must_use]
    pub fn field<T: fmt::Debug + PartialEq + ?Sized>(
        mut self,
        field: &str,
        expected: &T,
        actual: &T,
    ) -> Self {
        if self.found.is_none() && expected != actual {
            self.record(field, format!("{expected:?}"), format!("{actual:?}"));
        }
        self
    }

    /// Compare two string collections ignoring order.
    #[must_use]
    pub fn set<'s, I, J>(mut self, field: &str, expected: I, actual: J) -> Self
    where
        I: IntoIterator<Item = &'s String>,
        J: IntoIterator<Item = &'s String>,
    {
        if self.found.is_some() {
            return self;
        }
        let expected: BTreeSet<&String> = expected.into_iter().collect();
        let actual: BTreeSet<&String> = actual.into_iter().collect();
        if expected != actual {
            self.record(field, format!("{expected:?}"), format!("{actual:?}"));
        }
        self
    }

    /// Compare variable lists by name, type and value, ignoring order.
    #[must_use]
    pub fn variables(mut self, field: &str, expected: &[InputVariable], actual: &[InputVariable]) -> Self {
        if self.found.is_some() {
            return self;
        }
        let key = |v: &InputVariable| (v.name.clone(), v.variable_type(), v.value.to_wire());
        let mut want: Vec<_> = expected.iter().map(key).collect();
        let mut have: Vec<_> = actual.iter().map(key).collect();
        want.sort();
        have.sort();
        if want != have {
            let render = |vars: &[(String, VariableType, String)]| {
                let parts: Vec<String> = vars
                    .iter()
                    .map(|(name, ty, value)| format!("{name}:{ty}={value}"))
                    .collect();
                format!("[{}]", parts.join(", "))
            };
            self.record(field, render(&want), render(&have));
        }
        self
    }

    /// The first difference found, if any.
    pub fn finish(self) -> Option<Drift> {
        self.found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::VariableValue;

    #[test]
    fn test_no_drift() {
        let drift = DriftCheck::new(ResourceKind::Template, "starter")
            .field("summary", "a", "a")
            .set("labels", &["x".to_string(), "y".to_string()], &["y".to_string(), "x".to_string()])
            .finish();
        assert!(drift.is_none());
    }

    #[test]
    fn test_first_difference_wins() {
        let drift = DriftCheck::new(ResourceKind::Template, "starter")
            .field("summary", "a", "b")
            .field("description", "c", "d")
            .finish()
            .unwrap();
        assert_eq!(drift.field, "summary");
        assert_eq!(
            drift.to_string(),
            "template \"starter\" drifted on summary: expected \"a\", found \"b\""
        );
    }

    #[test]
    fn test_variable_order_is_ignored() {
        let a = vec![
            InputVariable::string("x", "1"),
            InputVariable::new("y", VariableValue::Bool(true)),
        ];
        let b = vec![a[1].clone(), a[0].clone()];
        assert!(
            DriftCheck::new(ResourceKind::Application, "app1")
                .variables("application_input_variables", &a, &b)
                .finish()
                .is_none()
        );

        let c = vec![InputVariable::string("x", "2"), a[1].clone()];
        let drift = DriftCheck::new(ResourceKind::Application, "app1")
            .variables("application_input_variables", &a, &c)
            .finish()
            .unwrap();
        assert!(drift.actual.contains("x:string=2"));
    }
}
