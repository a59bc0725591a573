use std::fmt;

use crate::constraint::FunctionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }

    pub fn kind(self) -> FunctionKind {
        match self {
            UnaryOp::Negate => FunctionKind::Negate,
            UnaryOp::Not | UnaryOp::BitNot => FunctionKind::Not,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    And,
    Or,
    Xor,
    Greater,
    Less,
    GreaterEq,
    LessEq,
    Equal,
    NotEqual,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Power => "^",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Greater => ">",
            BinaryOp::Less => "<",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::LessEq => "<=",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "!=",
        }
    }

    pub fn kind(self) -> FunctionKind {
        match self {
            BinaryOp::Add => FunctionKind::Add,
            BinaryOp::Subtract => FunctionKind::Subtract,
            BinaryOp::Multiply => FunctionKind::Multiply,
            BinaryOp::Divide => FunctionKind::Divide,
            BinaryOp::Power => FunctionKind::Power,
            BinaryOp::And => FunctionKind::And,
            BinaryOp::Or => FunctionKind::Or,
            BinaryOp::Xor => FunctionKind::Xor,
            BinaryOp::Greater => FunctionKind::Greater,
            BinaryOp::Less => FunctionKind::Less,
            BinaryOp::GreaterEq => FunctionKind::GreaterEq,
            BinaryOp::LessEq => FunctionKind::LessEq,
            BinaryOp::Equal => FunctionKind::Equal,
            BinaryOp::NotEqual => FunctionKind::NotEqual,
        }
    }
}

/// Where a reference path starts walking.
#[derive(Debug, Clone, PartialEq)]
pub enum RefOrigin {
    /// Bound to the root context supplied at compile time.
    Root,
    /// Leading `.`: inherits the current context of the surrounding node.
    Relative,
    /// An expression whose evaluated context is walked.
    Expr(Box<Ast>),
}

/// Parse output: a plain operand tree, instantiated into live graph nodes
/// by [`Engine::set_contents`](crate::graph::Engine::set_contents).
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Unary {
        op: UnaryOp,
        operand: Box<Ast>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Ast>,
        right: Box<Ast>,
    },
    Ternary {
        condition: Box<Ast>,
        then_branch: Box<Ast>,
        else_branch: Box<Ast>,
    },
    Range {
        from: Box<Ast>,
        to: Box<Ast>,
    },
    Index {
        base: Box<Ast>,
        index: Box<Ast>,
    },
    /// Postfix `?`.
    Evaluate {
        operand: Box<Ast>,
    },
    Call {
        name: String,
        args: Vec<Ast>,
    },
    Reference {
        origin: RefOrigin,
        path: Vec<String>,
    },
    Vector {
        elements: Vec<Ast>,
    },
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{}", n)
    }
}

fn escape(s: &str) -> String {
    s.chars()
        .flat_map(|c| match c {
            '"' => vec!['\\', '"'],
            '\\' => vec!['\\', '\\'],
            '\n' => vec!['\\', 'n'],
            '\t' => vec!['\\', 't'],
            '\r' => vec!['\\', 'r'],
            c => vec![c],
        })
        .collect()
}

// Fully parenthesized so the output re-parses to the same tree.
impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ast::Number(n) => write_number(f, *n),
            Ast::Str(s) => write!(f, "\"{}\"", escape(s)),
            Ast::Bool(b) => write!(f, "{}", b),
            Ast::Null => write!(f, "null"),
            Ast::Unary { op, operand } => write!(f, "({}{})", op.symbol(), operand),
            Ast::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Ast::Ternary {
                condition,
                then_branch,
                else_branch,
            } => write!(f, "({} ? {} : {})", condition, then_branch, else_branch),
            Ast::Range { from, to } => write!(f, "({}:{})", from, to),
            Ast::Index { base, index } => write!(f, "({}[{}])", base, index),
            Ast::Evaluate { operand } => write!(f, "({}?)", operand),
            Ast::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Ast::Reference { origin, path } => {
                match origin {
                    RefOrigin::Root => {}
                    RefOrigin::Relative => write!(f, ".")?,
                    RefOrigin::Expr(base) => write!(f, "({}).", base)?,
                }
                write!(f, "{}", path.join("."))
            }
            Ast::Vector { elements } => {
                write!(f, "{{")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Ast {
    pub fn boxed(self) -> Box<Ast> {
        Box::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_binary() {
        let ast = Ast::Binary {
            op: BinaryOp::Add,
            left: Ast::Number(3.0).boxed(),
            right: Ast::Binary {
                op: BinaryOp::Multiply,
                left: Ast::Number(4.0).boxed(),
                right: Ast::Number(2.0).boxed(),
            }
            .boxed(),
        };
        assert_eq!(ast.to_string(), "(3 + (4 * 2))");
    }

    #[test]
    fn test_display_reference() {
        let ast = Ast::Reference {
            origin: RefOrigin::Relative,
            path: vec!["a".into(), "b".into()],
        };
        assert_eq!(ast.to_string(), ".a.b");
    }

    #[test]
    fn test_display_vector() {
        let ast = Ast::Vector {
            elements: vec![Ast::Number(1.0), Ast::Bool(true)],
        };
        assert_eq!(ast.to_string(), "{1, true}");
    }
}
