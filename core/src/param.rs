//! State parameters.
//!
//! Each state declares its own parameters. A [`PathNode`](crate::path::PathNode)
//! holds one value per parameter of its state; values are JSON values and an
//! absent value is `Null`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Parameter values keyed by parameter id.
pub type ParamValues = BTreeMap<String, Value>;

/// Built-in parameter types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Int,
    Bool,
    Json,
    Any,
}

impl ParamType {
    pub fn name(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Int => "int",
            ParamType::Bool => "bool",
            ParamType::Json => "json",
            ParamType::Any => "any",
        }
    }

    /// Whether `value` is already a decoded value of this type. Strings accept `Null`.
    pub fn is(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_null() || value.is_string(),
            ParamType::Int => value.is_i64() || value.is_u64(),
            ParamType::Bool => value.is_boolean(),
            ParamType::Json => value.is_object() || value.is_array(),
            ParamType::Any => true,
        }
    }

    /// Decode a raw (string) value into this type.
    pub fn decode(&self, value: &Value) -> Option<Value> {
        let raw = value.as_str()?;
        match self {
            ParamType::String | ParamType::Any => Some(Value::String(raw.to_string())),
            ParamType::Int => raw.trim().parse::<i64>().ok().map(Value::from),
            ParamType::Bool => match raw {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            ParamType::Json => serde_json::from_str(raw).ok(),
        }
    }

    /// Keep values already of this type, decode the rest when possible.
    pub fn normalize(&self, value: Value) -> Value {
        if self.is(&value) {
            return value;
        }
        self.decode(&value).unwrap_or(value)
    }

    pub fn equals(&self, a: &Value, b: &Value) -> bool {
        match self {
            ParamType::Int => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x == y,
                _ => a == b,
            },
            _ => a == b,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A parameter as written in a state declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDeclaration {
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: ParamType,
    /// Changes to a dynamic parameter never cause the state to be exited and re-entered.
    #[serde(default)]
    pub dynamic: bool,
    /// Whether the value is carried over by `inherit` navigation.
    #[serde(default = "default_true")]
    pub inherit: bool,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub optional: bool,
}

impl ParamDeclaration {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ParamType::default(),
            dynamic: false,
            inherit: true,
            value: None,
            optional: false,
        }
    }

    pub fn of_type(mut self, kind: ParamType) -> Self {
        self.kind = kind;
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    pub fn no_inherit(mut self) -> Self {
        self.inherit = false;
        self
    }

    /// Set a default value; a parameter with a default is optional.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// A built parameter of a [`State`](crate::state::State).
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub id: String,
    pub kind: ParamType,
    pub dynamic: bool,
    pub inherit: bool,
    default: Option<Value>,
    optional: bool,
}

impl Param {
    pub fn from_declaration(decl: &ParamDeclaration) -> Self {
        Self {
            id: decl.id.clone(),
            kind: decl.kind,
            dynamic: decl.dynamic,
            inherit: decl.inherit,
            default: decl.value.clone(),
            optional: decl.optional || decl.value.is_some(),
        }
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn default_value(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }

    /// The value this parameter takes for a raw input; `None` or `Null` yields the default.
    pub fn value(&self, raw: Option<&Value>) -> Value {
        match raw {
            None | Some(Value::Null) => self.default_value(),
            Some(value) => self.kind.normalize(value.clone()),
        }
    }

    pub fn validates(&self, value: &Value) -> bool {
        if value.is_null() && self.optional {
            return true;
        }
        let normalized = self.kind.normalize(value.clone());
        self.kind.is(&normalized)
    }
}

/// Whether `a` and `b` agree on every parameter of `schema`.
pub fn params_equal<'a>(
    schema: impl IntoIterator<Item = &'a Param>,
    a: &ParamValues,
    b: &ParamValues,
) -> bool {
    schema.into_iter().all(|param| param_equal(param, a, b))
}

/// The parameters of `schema` whose values differ between `a` and `b`.
pub fn changed_params<'a>(
    schema: impl IntoIterator<Item = &'a Param>,
    a: &ParamValues,
    b: &ParamValues,
) -> Vec<&'a Param> {
    schema
        .into_iter()
        .filter(|param| !param_equal(param, a, b))
        .collect()
}

fn param_equal(param: &Param, a: &ParamValues, b: &ParamValues) -> bool {
    let left = a.get(&param.id).unwrap_or(&Value::Null);
    let right = b.get(&param.id).unwrap_or(&Value::Null);
    param.kind.equals(left, right)
}

/// Normalize raw values for the parameters of `schema` present in `raw`.
pub fn param_values<'a>(
    schema: impl IntoIterator<Item = &'a Param>,
    raw: &ParamValues,
) -> ParamValues {
    schema
        .into_iter()
        .map(|param| (param.id.clone(), param.value(raw.get(&param.id))))
        .collect()
}
