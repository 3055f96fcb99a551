//! Error types for the engine
//!
//! User-observable failures (`TypeError`, `RangeError`, ...) are catchable by
//! bytecode `try` regions and are turned into ordinary error objects when they
//! are. `Interrupted` and `Defect` are fatal: they skip handler discovery and
//! abort the current top-level invocation.

use thiserror::Error;

use crate::value::JsValue;

/// One entry of a captured call-stack snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    pub function_name: String,
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for StackFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line == 0 {
            write!(f, "    at {} (<bytecode>)", self.function_name)
        } else {
            write!(
                f,
                "    at {} (<bytecode>:{}:{})",
                self.function_name, self.line, self.column
            )
        }
    }
}

/// Classification of an error, independent of its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Type,
    Range,
    Reference,
    Syntax,
    Uri,
    Thrown,
    Interrupted,
    Defect,
}

/// Main error type for the engine
#[derive(Debug, Clone, Error)]
pub enum JsError {
    #[error("TypeError: {message}")]
    TypeError { message: String },

    #[error("RangeError: {message}")]
    RangeError { message: String },

    #[error("ReferenceError: {message}")]
    ReferenceError { message: String },

    /// Surfaced from the compiler collaborator; never produced by the core
    #[error("SyntaxError: {message}")]
    SyntaxError { message: String },

    #[error("URIError: {message}")]
    UriError { message: String },

    /// A user value in flight, with the stack captured where it was thrown
    #[error("Uncaught {}{}", describe_thrown(.value), format_stack(.stack))]
    Thrown {
        value: JsValue,
        stack: Vec<StackFrame>,
    },

    /// Embedder cancellation or timeout
    #[error("Execution interrupted: {reason}")]
    Interrupted { reason: String },

    /// Engine invariant violation
    #[error("Internal engine defect: {0}")]
    Defect(String),
}

fn describe_thrown(value: &JsValue) -> String {
    format!("{:?}", value)
}

fn format_stack(stack: &[StackFrame]) -> String {
    if stack.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = stack.iter().map(|f| f.to_string()).collect();
    format!("\n{}", lines.join("\n"))
}

impl JsError {
    pub fn type_error(message: impl Into<String>) -> Self {
        JsError::TypeError {
            message: message.into(),
        }
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        JsError::RangeError {
            message: message.into(),
        }
    }

    /// An unresolvable name: `"{name} is not defined"`
    pub fn reference_error(name: impl Into<String>) -> Self {
        JsError::ReferenceError {
            message: format!("{} is not defined", name.into()),
        }
    }

    /// A binding read or written while still in its temporal dead zone
    pub fn uninitialized(name: impl std::fmt::Display) -> Self {
        JsError::ReferenceError {
            message: format!("Cannot access '{}' before initialization", name),
        }
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        JsError::SyntaxError {
            message: message.into(),
        }
    }

    pub fn uri_error(message: impl Into<String>) -> Self {
        JsError::UriError {
            message: message.into(),
        }
    }

    pub fn interrupted(reason: impl Into<String>) -> Self {
        JsError::Interrupted {
            reason: reason.into(),
        }
    }

    /// Create a defect for unexpected engine states.
    /// These should never happen in correctly-written code.
    pub fn defect(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::warn!(defect = %message, "engine invariant violated");
        JsError::Defect(message)
    }

    /// Wrap a thrown value without a stack snapshot
    pub fn thrown(value: JsValue) -> Self {
        JsError::Thrown {
            value,
            stack: Vec::new(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            JsError::TypeError { .. } => ErrorKind::Type,
            JsError::RangeError { .. } => ErrorKind::Range,
            JsError::ReferenceError { .. } => ErrorKind::Reference,
            JsError::SyntaxError { .. } => ErrorKind::Syntax,
            JsError::UriError { .. } => ErrorKind::Uri,
            JsError::Thrown { .. } => ErrorKind::Thrown,
            JsError::Interrupted { .. } => ErrorKind::Interrupted,
            JsError::Defect(_) => ErrorKind::Defect,
        }
    }

    /// Whether a bytecode `try` region may observe this error
    pub fn is_catchable(&self) -> bool {
        !matches!(self, JsError::Interrupted { .. } | JsError::Defect(_))
    }

    /// The captured stack, if this error carries one
    pub fn stack(&self) -> &[StackFrame] {
        match self {
            JsError::Thrown { stack, .. } => stack,
            _ => &[],
        }
    }

    /// The thrown value, for `Thrown` errors
    pub fn thrown_value(&self) -> Option<&JsValue> {
        match self {
            JsError::Thrown { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Constructor name and message for engine-produced errors
    pub(crate) fn name_and_message(&self) -> (&'static str, String) {
        match self {
            JsError::TypeError { message } => ("TypeError", message.clone()),
            JsError::RangeError { message } => ("RangeError", message.clone()),
            JsError::ReferenceError { message } => ("ReferenceError", message.clone()),
            JsError::SyntaxError { message } => ("SyntaxError", message.clone()),
            JsError::UriError { message } => ("URIError", message.clone()),
            JsError::Thrown { value, .. } => ("Error", format!("{:?}", value)),
            JsError::Interrupted { reason } => ("InternalError", reason.clone()),
            JsError::Defect(message) => ("InternalError", message.clone()),
        }
    }
}
