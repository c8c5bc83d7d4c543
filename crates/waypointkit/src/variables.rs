//! Typed input variables and template variable options.
//!
//! The API moves variables around as `(name, variable_type, value)` string
//! triples. Here they are parsed into a tagged [`VariableValue`] so that an
//! application's inputs can be checked against the template's declared
//! [`VariableOption`]s by exhaustive match instead of string comparison.

use crate::error::{Error, Result};
use crate::types::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Template input variable the service injects into every application.
pub const APPLICATION_NAME_VARIABLE: &str = "waypoint_application";

/// Declared type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    String,
    Number,
    Bool,
    List,
    Map,
}

impl VariableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableType::String => "string",
            VariableType::Number => "number",
            VariableType::Bool => "bool",
            VariableType::List => "list",
            VariableType::Map => "map",
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariableType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" => Ok(VariableType::String),
            "number" => Ok(VariableType::Number),
            "bool" | "boolean" => Ok(VariableType::Bool),
            "list" => Ok(VariableType::List),
            "map" => Ok(VariableType::Map),
            other => Err(format!("unknown variable type {other:?}")),
        }
    }
}

/// A typed variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    String(String),
    Number(f64),
    Bool(bool),
    List(Vec<VariableValue>),
    Map(BTreeMap<String, VariableValue>),
}

impl VariableValue {
    /// Type tag of this value.
    pub fn variable_type(&self) -> VariableType {
        match self {
            VariableValue::String(_) => VariableType::String,
            VariableValue::Number(_) => VariableType::Number,
            VariableValue::Bool(_) => VariableType::Bool,
            VariableValue::List(_) => VariableType::List,
            VariableValue::Map(_) => VariableType::Map,
        }
    }

    /// Parse the raw wire string for a declared type.
    ///
    /// Lists and maps are JSON encoded.
    pub fn parse(variable_type: VariableType, raw: &str) -> std::result::Result<Self, String> {
        match variable_type {
            VariableType::String => Ok(VariableValue::String(raw.to_string())),
            VariableType::Number => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(VariableValue::Number)
                .ok_or_else(|| format!("{raw:?} is not a number")),
            VariableType::Bool => match raw.trim() {
                "true" => Ok(VariableValue::Bool(true)),
                "false" => Ok(VariableValue::Bool(false)),
                _ => Err(format!("{raw:?} is not a bool")),
            },
            VariableType::List | VariableType::Map => {
                let json: serde_json::Value =
                    serde_json::from_str(raw).map_err(|e| format!("{raw:?} is not valid JSON: {e}"))?;
                let value = Self::from_json(json)?;
                if value.variable_type() != variable_type {
                    return Err(format!("{raw:?} is not a {variable_type}"));
                }
                Ok(value)
            }
        }
    }

    fn from_json(json: serde_json::Value) -> std::result::Result<Self, String> {
        use serde_json::Value;
        match json {
            Value::String(s) => Ok(VariableValue::String(s)),
            Value::Bool(b) => Ok(VariableValue::Bool(b)),
            Value::Number(n) => n
                .as_f64()
                .map(VariableValue::Number)
                .ok_or_else(|| format!("{n} is out of range")),
            Value::Array(items) => items
                .into_iter()
                .map(Self::from_json)
                .collect::<std::result::Result<_, _>>()
                .map(VariableValue::List),
            Value::Object(entries) => entries
                .into_iter()
                .map(|(k, v)| Self::from_json(v).map(|v| (k, v)))
                .collect::<std::result::Result<_, _>>()
                .map(VariableValue::Map),
            Value::Null => Err("null is not a valid variable value".to_string()),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            VariableValue::String(s) => Value::String(s.clone()),
            VariableValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            VariableValue::Bool(b) => Value::Bool(*b),
            VariableValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            VariableValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Raw wire string for this value.
    pub fn to_wire(&self) -> String {
        match self {
            VariableValue::String(s) => s.clone(),
            VariableValue::Number(n) => n.to_string(),
            VariableValue::Bool(b) => b.to_string(),
            VariableValue::List(_) | VariableValue::Map(_) => self.to_json().to_string(),
        }
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// A named, typed input variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawInputVariable", into = "RawInputVariable")]
pub struct InputVariable {
    pub name: String,
    pub value: VariableValue,
}

impl InputVariable {
    pub fn new(name: impl Into<String>, value: VariableValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Shorthand for a string variable.
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, VariableValue::String(value.into()))
    }

    pub fn variable_type(&self) -> VariableType {
        self.value.variable_type()
    }
}

/// Wire form of an input variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawInputVariable {
    name: String,
    variable_type: VariableType,
    value: String,
}

impl TryFrom<RawInputVariable> for InputVariable {
    type Error = String;

    fn try_from(raw: RawInputVariable) -> std::result::Result<Self, Self::Error> {
        let value = VariableValue::parse(raw.variable_type, &raw.value)
            .map_err(|e| format!("variable {:?}: {e}", raw.name))?;
        Ok(Self {
            name: raw.name,
            value,
        })
    }
}

impl From<InputVariable> for RawInputVariable {
    fn from(var: InputVariable) -> Self {
        Self {
            variable_type: var.value.variable_type(),
            value: var.value.to_wire(),
            name: var.name,
        }
    }
}

/// A variable a template declares for its applications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableOption {
    pub name: String,
    pub variable_type: VariableType,
    /// Whether applications may set the value
    #[serde(default)]
    pub user_editable: bool,
    /// Allowed values; empty means unconstrained
    #[serde(default)]
    pub options: Vec<String>,
}

impl VariableOption {
    pub fn new(name: impl Into<String>, variable_type: VariableType) -> Self {
        Self {
            name: name.into(),
            variable_type,
            user_editable: true,
            options: Vec::new(),
        }
    }

    pub fn fixed(mut self) -> Self {
        self.user_editable = false;
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }
}

/// Variables an application ends up with once its template is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedInputs {
    /// Set by the application
    pub application: Vec<InputVariable>,
    /// Fixed by the template or injected by the service
    pub template: Vec<InputVariable>,
}

/// Combine a template's variable options with an application's inputs.
///
/// Inputs matching an option must have its type, must respect
/// `user_editable`, and must be one of `options` when those are given.
/// Unset non-editable options with a value become template variables,
/// and the service's `waypoint_application` variable is added. Both
/// lists come back sorted by name.
pub fn resolve_inputs(
    options: &[VariableOption],
    inputs: &[InputVariable],
    application_name: &str,
) -> Result<ResolvedInputs> {
    let invalid = |name: &str, message: String| {
        Error::validation(
            ResourceKind::Application,
            application_name,
            format!("application_input_variables.{name}"),
            message,
        )
    };

    let mut seen = HashSet::new();
    for input in inputs {
        if !seen.insert(input.name.as_str()) {
            return Err(invalid(&input.name, "variable is set more than once".to_string()));
        }

        let Some(option) = options.iter().find(|o| o.name == input.name) else {
            continue;
        };

        if input.variable_type() != option.variable_type {
            return Err(invalid(
                &input.name,
                format!(
                    "template declares type {}, got {}",
                    option.variable_type,
                    input.variable_type()
                ),
            ));
        }

        let wire = input.value.to_wire();
        if !option.user_editable && option.options.first() != Some(&wire) {
            return Err(invalid(
                &input.name,
                "variable is not user editable on this template".to_string(),
            ));
        }

        if !option.options.is_empty() && !option.options.contains(&wire) {
            return Err(invalid(
                &input.name,
                format!("{wire:?} is not one of {:?}", option.options),
            ));
        }
    }

    let mut template = Vec::new();
    for option in options {
        if option.user_editable || seen.contains(option.name.as_str()) {
            continue;
        }
        let Some(first) = option.options.first() else {
            continue;
        };
        let value = VariableValue::parse(option.variable_type, first).map_err(|e| {
            Error::validation(
                ResourceKind::Application,
                application_name,
                format!("template_input_variables.{}", option.name),
                e,
            )
        })?;
        template.push(InputVariable::new(option.name.clone(), value));
    }

    if !template.iter().any(|v| v.name == APPLICATION_NAME_VARIABLE) {
        template.push(InputVariable::string(APPLICATION_NAME_VARIABLE, application_name));
    }

    let mut application = inputs.to_vec();
    application.sort_by(|a, b| a.name.cmp(&b.name));
    template.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(ResolvedInputs {
        application,
        template,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    fn vault_dweller_options(editable: bool) -> Vec<VariableOption> {
        let mut name = VariableOption::new("vault_dweller_name", VariableType::String);
        let mut faction = VariableOption::new("faction", VariableType::String);
        if editable {
            name = name.with_options(["lucy", "courier", "lone-wanderer", "sole-survivor"]);
            faction = faction.with_options([
                "ncr",
                "brotherhood-of-steel",
                "caesars-legion",
                "raiders",
                "institute",
            ]);
        } else {
            name = name.fixed().with_options(["lone-wanderer"]);
            faction = faction.fixed().with_options(["brotherhood-of-steel"]);
        }
        vec![
            name,
            faction,
            VariableOption::new("vault_dweller_shelter", VariableType::String),
        ]
    }

    #[test]
    fn test_parse_typed_values() {
        assert_eq!(
            VariableValue::parse(VariableType::Number, "42").unwrap(),
            VariableValue::Number(42.0)
        );
        assert_eq!(
            VariableValue::parse(VariableType::Bool, "true").unwrap(),
            VariableValue::Bool(true)
        );
        assert!(VariableValue::parse(VariableType::Bool, "yes").is_err());
        assert!(VariableValue::parse(VariableType::Number, "NaN").is_err());

        let list = VariableValue::parse(VariableType::List, r#"["a", 1]"#).unwrap();
        assert_eq!(
            list,
            VariableValue::List(vec![
                VariableValue::String("a".into()),
                VariableValue::Number(1.0)
            ])
        );
        assert!(VariableValue::parse(VariableType::Map, "[1]").is_err());
    }

    #[test]
    fn test_input_variable_wire_form() {
        let json = r#"{"name":"replicas","variable_type":"number","value":"3"}"#;
        let var: InputVariable = serde_json::from_str(json).unwrap();
        assert_eq!(var.value, VariableValue::Number(3.0));

        let bad = r#"{"name":"replicas","variable_type":"number","value":"three"}"#;
        assert!(serde_json::from_str::<InputVariable>(bad).is_err());
    }

    #[test]
    fn test_resolve_application_inputs() {
        let inputs = vec![
            InputVariable::string("vault_dweller_shelter", "vault101"),
            InputVariable::string("faction", "brotherhood-of-steel"),
            InputVariable::string("vault_dweller_name", "courier"),
        ];
        let resolved = resolve_inputs(&vault_dweller_options(true), &inputs, "app1").unwrap();

        let names: Vec<&str> = resolved.application.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["faction", "vault_dweller_name", "vault_dweller_shelter"]);
        assert_eq!(
            resolved.template,
            vec![InputVariable::string(APPLICATION_NAME_VARIABLE, "app1")]
        );
    }

    #[test]
    fn test_resolve_fixed_template_options() {
        let resolved = resolve_inputs(&vault_dweller_options(false), &[], "app1").unwrap();

        assert!(resolved.application.is_empty());
        assert_eq!(
            resolved.template,
            vec![
                InputVariable::string("faction", "brotherhood-of-steel"),
                InputVariable::string("vault_dweller_name", "lone-wanderer"),
                InputVariable::string(APPLICATION_NAME_VARIABLE, "app1"),
            ]
        );
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let inputs = vec![InputVariable::new("faction", VariableValue::Number(1.0))];
        let err = resolve_inputs(&vault_dweller_options(true), &inputs, "app1").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(err.to_string().contains("application_input_variables.faction"));
    }

    #[test]
    fn test_value_outside_options_is_rejected() {
        let inputs = vec![InputVariable::string("faction", "enclave")];
        assert!(resolve_inputs(&vault_dweller_options(true), &inputs, "app1").is_err());
    }

    #[test]
    fn test_non_editable_override_is_rejected() {
        let inputs = vec![InputVariable::string("vault_dweller_name", "courier")];
        assert!(resolve_inputs(&vault_dweller_options(false), &inputs, "app1").is_err());

        let same = vec![InputVariable::string("vault_dweller_name", "lone-wanderer")];
        let resolved = resolve_inputs(&vault_dweller_options(false), &same, "app1").unwrap();
        assert_eq!(resolved.application, same);
        assert!(resolved.template.iter().all(|v| v.name != "vault_dweller_name"));
    }

    #[test]
    fn test_duplicate_inputs_are_rejected() {
        let inputs = vec![
            InputVariable::string("faction", "ncr"),
            InputVariable::string("faction", "raiders"),
        ];
        assert!(resolve_inputs(&vault_dweller_options(true), &inputs, "app1").is_err());
    }

    #[test]
    fn test_undeclared_inputs_pass_through() {
        let inputs = vec![InputVariable::string("region", "us-east-1")];
        let resolved = resolve_inputs(&[], &inputs, "app1").unwrap();
        assert_eq!(resolved.application, inputs);
    }
}
