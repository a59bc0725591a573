pub mod constraint;
pub mod context;
pub mod diagnostics;
pub mod graph;
pub mod syntax;
pub mod value;

pub use context::{Builtins, Context, ContextRef, FunctionFactory, NamedFunction, Namespace, Property};
pub use graph::{Engine, GraphError, VarId, VarStats};
pub use syntax::ast::Ast;
pub use syntax::error::SyntaxError;
pub use syntax::parser::parse;
pub use value::{ErrorValue, RangeValue, TypeFlags, Value};
