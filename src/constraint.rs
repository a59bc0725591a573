use std::collections::HashMap;
use std::sync::LazyLock;

use crate::value::{TypeFlags, Value};

/// Built-in operator kinds. Named functions come from a
/// [`FunctionFactory`](crate::context::FunctionFactory) instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Negate,
    Not,
    And,
    Or,
    Xor,
    Greater,
    Less,
    GreaterEq,
    LessEq,
    Equal,
    NotEqual,
    Ternary,
    Range,
    Index,
    Evaluate,
}

impl FunctionKind {
    pub fn name(self) -> &'static str {
        match self {
            FunctionKind::Add => "add",
            FunctionKind::Subtract => "subtract",
            FunctionKind::Multiply => "multiply",
            FunctionKind::Divide => "divide",
            FunctionKind::Power => "power",
            FunctionKind::Negate => "negate",
            FunctionKind::Not => "not",
            FunctionKind::And => "and",
            FunctionKind::Or => "or",
            FunctionKind::Xor => "xor",
            FunctionKind::Greater => "greater",
            FunctionKind::Less => "less",
            FunctionKind::GreaterEq => "greater-or-equal",
            FunctionKind::LessEq => "less-or-equal",
            FunctionKind::Equal => "equal",
            FunctionKind::NotEqual => "not-equal",
            FunctionKind::Ternary => "ternary",
            FunctionKind::Range => "range",
            FunctionKind::Index => "index",
            FunctionKind::Evaluate => "evaluate",
        }
    }
}

/// One overload: allowed type flags per position, fixed or variadic arity.
///
/// For a variadic constraint the last position's mask repeats for every
/// extra input.
#[derive(Debug, Clone)]
pub struct Constraint {
    positions: Vec<TypeFlags>,
    variadic: bool,
}

impl Constraint {
    pub fn fixed(positions: &[TypeFlags]) -> Self {
        Self {
            positions: positions.to_vec(),
            variadic: false,
        }
    }

    pub fn variadic(positions: &[TypeFlags]) -> Self {
        debug_assert!(!positions.is_empty());
        Self {
            positions: positions.to_vec(),
            variadic: true,
        }
    }

    pub fn arity_matches(&self, given: usize) -> bool {
        if self.variadic {
            given >= self.positions.len()
        } else {
            given == self.positions.len()
        }
    }

    pub fn allowed_at(&self, position: usize) -> TypeFlags {
        if position < self.positions.len() {
            self.positions[position]
        } else if self.variadic {
            *self.positions.last().expect("variadic constraint is non-empty")
        } else {
            TypeFlags(0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Index of the first fully matching constraint.
    Match { constraint: usize },
    /// Arity matched somewhere but types did not; `constraint` is the
    /// overload with the greatest matching prefix, `position` the first
    /// offending input.
    TypeMismatch { constraint: usize, position: usize },
    /// No constraint accepted this arity at all.
    CountMismatch,
}

/// Ordered list of overloads for one function kind.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
}

impl ConstraintSet {
    pub fn new(constraints: Vec<Constraint>) -> Self {
        Self { constraints }
    }

    pub fn get(&self, index: usize) -> Option<&Constraint> {
        self.constraints.get(index)
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn matches(&self, inputs: &[Value]) -> MatchOutcome {
        let mut best: Option<(usize, usize)> = None;
        for (ci, constraint) in self.constraints.iter().enumerate() {
            if !constraint.arity_matches(inputs.len()) {
                continue;
            }
            let mut prefix = 0;
            for (i, value) in inputs.iter().enumerate() {
                if constraint.allowed_at(i).accepts(value.flags()) {
                    prefix += 1;
                } else {
                    break;
                }
            }
            if prefix == inputs.len() {
                return MatchOutcome::Match { constraint: ci };
            }
            if best.is_none_or(|(_, p)| prefix > p) {
                best = Some((ci, prefix));
            }
        }
        match best {
            Some((constraint, position)) => MatchOutcome::TypeMismatch {
                constraint,
                position,
            },
            None => MatchOutcome::CountMismatch,
        }
    }
}

// Single source of truth for operator overloads; resolved once.
static REGISTRY: LazyLock<HashMap<FunctionKind, ConstraintSet>> = LazyLock::new(|| {
    use FunctionKind::*;
    use TypeFlags as T;

    let num2 = || Constraint::fixed(&[T::NUMBER, T::NUMBER]);
    let str2 = || Constraint::fixed(&[T::STRING, T::STRING]);
    let bool2 = || Constraint::fixed(&[T::BOOLEAN, T::BOOLEAN]);

    let mut registry = HashMap::new();
    registry.insert(Add, ConstraintSet::new(vec![num2(), str2()]));
    registry.insert(Subtract, ConstraintSet::new(vec![num2()]));
    registry.insert(Multiply, ConstraintSet::new(vec![num2()]));
    registry.insert(Divide, ConstraintSet::new(vec![num2()]));
    // Overload 0 is numeric power, overload 1 boolean xor.
    registry.insert(Power, ConstraintSet::new(vec![num2(), bool2()]));
    registry.insert(Negate, ConstraintSet::new(vec![Constraint::fixed(&[T::NUMBER])]));
    registry.insert(
        Not,
        ConstraintSet::new(vec![
            Constraint::fixed(&[T::BOOLEAN]),
            Constraint::fixed(&[T::NUMBER]),
        ]),
    );
    registry.insert(And, ConstraintSet::new(vec![bool2(), num2()]));
    registry.insert(Or, ConstraintSet::new(vec![bool2(), num2()]));
    registry.insert(Xor, ConstraintSet::new(vec![bool2(), num2()]));
    for kind in [Greater, Less, GreaterEq, LessEq] {
        registry.insert(kind, ConstraintSet::new(vec![num2(), str2()]));
    }
    for kind in [Equal, NotEqual] {
        registry.insert(kind, ConstraintSet::new(vec![Constraint::fixed(&[T::ANY, T::ANY])]));
    }
    registry.insert(
        Ternary,
        ConstraintSet::new(vec![Constraint::fixed(&[T::BOOLEAN, T::ANY, T::ANY])]),
    );
    registry.insert(Range, ConstraintSet::new(vec![num2()]));
    registry.insert(
        Index,
        ConstraintSet::new(vec![Constraint::fixed(&[
            T::VECTOR | T::RANGE | T::STRING,
            T::NUMBER,
        ])]),
    );
    registry.insert(
        Evaluate,
        ConstraintSet::new(vec![Constraint::fixed(&[T::ANY])]),
    );
    registry
});

pub fn constraints_for(kind: FunctionKind) -> &'static ConstraintSet {
    REGISTRY
        .get(&kind)
        .unwrap_or_else(|| panic!("no constraints registered for {:?}", kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_match_picks_first_overload() {
        let set = constraints_for(FunctionKind::Add);
        let outcome = set.matches(&[Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(outcome, MatchOutcome::Match { constraint: 0 });

        let outcome = set.matches(&[Value::Str("a".into()), Value::Str("b".into())]);
        assert_eq!(outcome, MatchOutcome::Match { constraint: 1 });
    }

    #[test]
    fn test_type_mismatch_reports_longest_prefix() {
        let set = constraints_for(FunctionKind::Add);
        let outcome = set.matches(&[Value::Number(1.0), Value::Bool(true)]);
        assert_eq!(
            outcome,
            MatchOutcome::TypeMismatch {
                constraint: 0,
                position: 1
            }
        );
    }

    #[test]
    fn test_count_mismatch() {
        let set = constraints_for(FunctionKind::Add);
        assert_eq!(set.matches(&[Value::Number(1.0)]), MatchOutcome::CountMismatch);
    }

    #[test]
    fn test_variadic_accepts_extra_inputs() {
        let variadic = Constraint::variadic(&[TypeFlags::NUMBER]);
        assert!(variadic.arity_matches(1));
        assert!(variadic.arity_matches(5));
        assert!(!variadic.arity_matches(0));
        assert_eq!(variadic.allowed_at(4), TypeFlags::NUMBER);
    }

    #[test]
    fn test_power_boolean_overload() {
        let set = constraints_for(FunctionKind::Power);
        let outcome = set.matches(&[Value::Bool(true), Value::Bool(false)]);
        assert_eq!(outcome, MatchOutcome::Match { constraint: 1 });
    }
}
