use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::constraint::{Constraint, ConstraintSet};
use crate::graph::VarId;
use crate::value::{ErrorValue, TypeFlags, Value};

/// Host-supplied namespace walked by references.
///
/// Contexts form a tree: `subcontext` descends a level, `property` reads a
/// leaf. A property may be a plain value or a live engine variable.
pub trait Context: Send + Sync {
    fn subcontext(&self, name: &str) -> Option<ContextRef>;
    fn property(&self, name: &str) -> Option<Property>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Value(Value),
    Variable(VarId),
}

/// Shared handle to a context; identity comparison is by pointer.
#[derive(Clone)]
pub struct ContextRef(Arc<dyn Context>);

impl ContextRef {
    pub fn new(context: impl Context + 'static) -> Self {
        ContextRef(Arc::new(context))
    }

    pub fn from_arc(context: Arc<dyn Context>) -> Self {
        ContextRef(context)
    }

    pub fn subcontext(&self, name: &str) -> Option<ContextRef> {
        self.0.subcontext(name)
    }

    pub fn property(&self, name: &str) -> Option<Property> {
        self.0.property(name)
    }

    pub fn same(&self, other: &ContextRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextRef({:p})", Arc::as_ptr(&self.0))
    }
}

/// A mutable name → entry map implementing [`Context`]; the engine-side
/// default host namespace used by tests and the REPL.
#[derive(Default)]
pub struct Namespace {
    entries: RwLock<HashMap<String, NamespaceEntry>>,
}

enum NamespaceEntry {
    Value(Value),
    Variable(VarId),
    Child(ContextRef),
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_value(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.entries
            .write()
            .insert(name.into(), NamespaceEntry::Value(value.into()));
    }

    pub fn insert_variable(&self, name: impl Into<String>, var: VarId) {
        self.entries
            .write()
            .insert(name.into(), NamespaceEntry::Variable(var));
    }

    pub fn insert_child(&self, name: impl Into<String>, child: ContextRef) {
        self.entries
            .write()
            .insert(name.into(), NamespaceEntry::Child(child));
    }
}

impl Context for Namespace {
    fn subcontext(&self, name: &str) -> Option<ContextRef> {
        match self.entries.read().get(name) {
            Some(NamespaceEntry::Child(child)) => Some(child.clone()),
            _ => None,
        }
    }

    fn property(&self, name: &str) -> Option<Property> {
        match self.entries.read().get(name) {
            Some(NamespaceEntry::Value(value)) => Some(Property::Value(value.clone())),
            Some(NamespaceEntry::Variable(var)) => Some(Property::Variable(*var)),
            _ => None,
        }
    }
}

type EvalFn = Box<dyn Fn(usize, &[Value]) -> Value + Send + Sync>;

/// A named function resolved through a [`FunctionFactory`]: a constraint
/// set plus one evaluation routine dispatched on the matched overload.
pub struct NamedFunction {
    name: String,
    constraints: ConstraintSet,
    eval: EvalFn,
}

impl NamedFunction {
    pub fn new(
        name: impl Into<String>,
        constraints: ConstraintSet,
        eval: impl Fn(usize, &[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            constraints,
            eval: Box::new(eval),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn eval(&self, constraint: usize, inputs: &[Value]) -> Value {
        (self.eval)(constraint, inputs)
    }
}

impl fmt::Debug for NamedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamedFunction({})", self.name)
    }
}

/// Resolves function-call names during compilation.
pub trait FunctionFactory: Send + Sync {
    fn create(&self, name: &str) -> Option<Arc<NamedFunction>>;
}

/// The built-in function library: `min`, `max`, `sum`, `abs`, `len`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Builtins;

impl FunctionFactory for Builtins {
    fn create(&self, name: &str) -> Option<Arc<NamedFunction>> {
        let numbers_variadic = || ConstraintSet::new(vec![Constraint::variadic(&[TypeFlags::NUMBER])]);
        let function = match name {
            "min" => NamedFunction::new(name, numbers_variadic(), |_, inputs| {
                fold_numbers(inputs, f64::min)
            }),
            "max" => NamedFunction::new(name, numbers_variadic(), |_, inputs| {
                fold_numbers(inputs, f64::max)
            }),
            "sum" => NamedFunction::new(name, numbers_variadic(), |_, inputs| {
                fold_numbers(inputs, |a, b| a + b)
            }),
            "abs" => NamedFunction::new(
                name,
                ConstraintSet::new(vec![Constraint::fixed(&[TypeFlags::NUMBER])]),
                |_, inputs| match inputs[0].as_number() {
                    Some(n) => Value::Number(n.abs()),
                    None => Value::error(ErrorValue::eval("abs: expected a number")),
                },
            ),
            "len" => NamedFunction::new(
                name,
                ConstraintSet::new(vec![Constraint::fixed(&[
                    TypeFlags::VECTOR | TypeFlags::RANGE | TypeFlags::STRING,
                ])]),
                |_, inputs| match &inputs[0] {
                    Value::Vector(elements) => Value::Number(elements.len() as f64),
                    Value::Range(r) => Value::Number(r.len() as f64),
                    Value::Str(s) => Value::Number(s.chars().count() as f64),
                    other => Value::error(ErrorValue::eval(format!(
                        "len: cannot measure a {}",
                        other.type_name()
                    ))),
                },
            ),
            _ => return None,
        };
        Some(Arc::new(function))
    }
}

fn fold_numbers(inputs: &[Value], op: impl Fn(f64, f64) -> f64) -> Value {
    let mut acc = None;
    for input in inputs {
        match input.as_number() {
            Some(n) => acc = Some(acc.map_or(n, |a| op(a, n))),
            None => return Value::error(ErrorValue::eval("expected numbers")),
        }
    }
    match acc {
        Some(n) => Value::Number(n),
        None => Value::error(ErrorValue::eval("expected at least one input")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_lookup() {
        let ns = Namespace::new();
        ns.insert_value("x", 5.0);
        let child = Namespace::new();
        child.insert_value("y", "inner");
        ns.insert_child("sub", ContextRef::new(child));

        assert_eq!(
            ns.property("x"),
            Some(Property::Value(Value::Number(5.0)))
        );
        assert!(ns.property("missing").is_none());
        let sub = ns.subcontext("sub").expect("child context");
        assert_eq!(
            sub.property("y"),
            Some(Property::Value(Value::Str("inner".into())))
        );
    }

    #[test]
    fn test_builtin_min_max() {
        let factory = Builtins;
        let min = factory.create("min").expect("min exists");
        let inputs = [Value::Number(3.0), Value::Number(1.0), Value::Number(2.0)];
        assert_eq!(min.eval(0, &inputs), Value::Number(1.0));

        let max = factory.create("max").expect("max exists");
        assert_eq!(max.eval(0, &inputs), Value::Number(3.0));
        assert!(factory.create("nope").is_none());
    }

    #[test]
    fn test_builtin_len() {
        let factory = Builtins;
        let len = factory.create("len").expect("len exists");
        assert_eq!(
            len.eval(0, &[Value::Str("abc".into())]),
            Value::Number(3.0)
        );
    }
}
