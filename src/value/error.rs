use std::fmt;

use crate::value::Value;

/// Evaluation failures, carried as ordinary values.
///
/// Each variant keeps enough structured data to reconstruct a human message
/// without string matching; `Display` is the canonical rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorValue {
    /// A recomputation could not settle because two variables depend on
    /// each other.
    Circular { from: String, to: String },
    /// A dotted path could not be walked to the end. `path` holds the
    /// segments consumed so far, including the failing one.
    Reference { relative: bool, path: Vec<String> },
    /// An index fell outside its base.
    Index { index: i64, len: usize },
    /// Inputs matched a constraint's arity but not its types. `constraint`
    /// is the registry entry that matched the longest prefix; `position`
    /// is the first offending input.
    TypeMismatch {
        function: String,
        constraint: usize,
        position: usize,
        inputs: Vec<Value>,
    },
    /// No constraint accepted this number of inputs.
    InputCount { function: String, given: usize },
    DivisionByZero,
    /// Anything else that went wrong while evaluating.
    Eval { message: String },
}

impl ErrorValue {
    pub fn eval(message: impl Into<String>) -> Self {
        ErrorValue::Eval {
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorValue::Circular { from, to } => {
                write!(f, "circular dependency between `{}` and `{}`", from, to)
            }
            ErrorValue::Reference { relative, path } => {
                let prefix = if *relative { "." } else { "" };
                write!(f, "cannot resolve `{}{}`", prefix, path.join("."))
            }
            ErrorValue::Index { index, len } => {
                write!(f, "index {} out of range for length {}", index, len)
            }
            ErrorValue::TypeMismatch {
                function,
                constraint,
                position,
                inputs,
            } => {
                write!(
                    f,
                    "{}: input {} is a {}, not allowed by overload {}",
                    function,
                    position,
                    inputs
                        .get(*position)
                        .map(Value::type_name)
                        .unwrap_or("missing value"),
                    constraint,
                )
            }
            ErrorValue::InputCount { function, given } => {
                write!(f, "{}: no overload takes {} inputs", function, given)
            }
            ErrorValue::DivisionByZero => write!(f, "division by zero"),
            ErrorValue::Eval { message } => f.write_str(message),
        }
    }
}
