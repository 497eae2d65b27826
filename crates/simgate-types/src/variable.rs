//! # simgate-types::variable
//!
//! Defines the dynamic `Value` union and the `Variable` (a value tagged
//! with its `PortId`). Variables have plain value semantics: they are
//! created ad hoc, copied freely, and destroyed with the event that
//! carries them.

use crate::port::{PortId, VarType};
use std::fmt;

/// A dynamically typed value covering the ground types of the system.
///
/// `Empty` is the state of a variable that has no value yet, for example a
/// freshly allocated publisher slot of unknown type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Real(f64),
    Integer(i32),
    Boolean(bool),
    Text(String),
    Empty,
}

impl Value {
    /// The variable type this value satisfies, if any.
    pub fn ty(&self) -> Option<VarType> {
        match self {
            Value::Real(_) => Some(VarType::Real),
            Value::Integer(_) => Some(VarType::Integer),
            Value::Boolean(_) => Some(VarType::Boolean),
            Value::Text(_) => Some(VarType::String),
            Value::Empty => None,
        }
    }

    /// The neutral starting value of a port type.
    pub fn zero(ty: VarType) -> Value {
        match ty {
            VarType::Real => Value::Real(0.0),
            VarType::Integer => Value::Integer(0),
            VarType::Boolean => Value::Boolean(false),
            VarType::String => Value::Text(String::new()),
            VarType::Unknown => Value::Empty,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Real(v) => write!(f, "{v}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "\"{v}\""),
            Value::Empty => f.write_str("<empty>"),
        }
    }
}

/// A typed value tagged with the port it belongs to.
///
/// Invariant: if the port's type is not `Unknown`, the value's tag matches
/// it. `Unknown`-typed variables are carried but never queried.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub id: PortId,
    pub value: Value,
}

impl Variable {
    pub fn new(id: PortId, value: Value) -> Self {
        Self { id, value }
    }

    /// A variable of the given port carrying the type's neutral value.
    pub fn zeroed(id: PortId) -> Self {
        Self {
            value: Value::zero(id.ty),
            id,
        }
    }

    /// Checks the type invariant. Unknown-typed variables never validate.
    pub fn is_valid(&self) -> bool {
        self.value.ty() == Some(self.id.ty)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.id, self.value)
    }
}

/// Formats a variable list the way events print their payload.
pub fn fmt_variables(vars: &[Variable]) -> String {
    let mut out = String::from("{");
    for (i, var) in vars.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&var.to_string());
    }
    out.push('}');
    out
}
