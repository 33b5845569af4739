//! Guard and action expressions shared by every SFC model.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The type of integer values.
pub type Integer = i64;

/// The types a variable or an expression can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Type {
    /// Boolean type.
    Boolean,
    /// Integer type.
    Integer,
    /// String type.
    String,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Boolean => write!(f, "bool"),
            Type::Integer => write!(f, "int"),
            Type::String => write!(f, "string"),
        }
    }
}

impl Type {
    /// The value a variable of this type takes when nothing else is known about it.
    pub fn default_value(self) -> Val {
        match self {
            Type::Boolean => Val::Boolean(false),
            Type::Integer => Val::Integer(0),
            Type::String => Val::String(String::new()),
        }
    }
}

/// A value of one of the supported [`Type`]s.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Val {
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(Integer),
    /// String value.
    String(String),
}

impl Val {
    /// Returns the [`Type`] of the value.
    pub fn r#type(&self) -> Type {
        match self {
            Val::Boolean(_) => Type::Boolean,
            Val::Integer(_) => Type::Integer,
            Val::String(_) => Type::String,
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Boolean(b) => write!(f, "{b}"),
            Val::Integer(i) => write!(f, "{i}"),
            Val::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for Val {
    fn from(value: bool) -> Self {
        Val::Boolean(value)
    }
}

impl From<Integer> for Val {
    fn from(value: Integer) -> Self {
        Val::Integer(value)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    /// Arithmetic negation.
    Neg,
    /// Logical negation.
    Not,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/` (Euclidean integer division)
    Div,
    /// `mod` (Euclidean remainder)
    Mod,
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `and`
    And,
    /// `or`
    Or,
    /// `xor`
    Xor,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "mod",
            BinOp::Eq => "=",
            BinOp::Ne => "<>",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
        }
    }
}

/// Errors in typing an [`Expression`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// The expression refers to a variable that is not in scope.
    #[error("unknown variable '{0}'")]
    MissingVar(String),
    /// An operand has the wrong type.
    #[error("operator '{op}' expects {expected} operands, found {found}")]
    Operand {
        /// Operator symbol.
        op: &'static str,
        /// Type expected by the operator.
        expected: Type,
        /// Type of the offending operand.
        found: Type,
    },
    /// The two sides of a comparison have different types.
    #[error("cannot compare {0} with {1}")]
    Incomparable(Type, Type),
}

/// Errors in the concrete evaluation of an [`Expression`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// Integer arithmetic left the range of [`Integer`].
    #[error("integer overflow")]
    Overflow,
    /// An operand had an unexpected type at runtime.
    #[error("operand type mismatch")]
    TypeMismatch,
}

/// An expression over variables of type `V`.
///
/// The parser produces `Expression<String>`,
/// which the model builder resolves into `Expression<Var>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression<V> {
    /// A constant value.
    Const(Val),
    /// A variable.
    Var(V),
    /// A unary operation.
    Unary(UnOp, Box<Expression<V>>),
    /// A binary operation.
    Binary(BinOp, Box<(Expression<V>, Expression<V>)>),
}

impl<V> From<bool> for Expression<V> {
    fn from(value: bool) -> Self {
        Expression::Const(Val::Boolean(value))
    }
}

impl<V> From<Integer> for Expression<V> {
    fn from(value: Integer) -> Self {
        Expression::Const(Val::Integer(value))
    }
}

impl<V> Expression<V> {
    /// Builds the binary operation `lhs op rhs`.
    pub fn binary(op: BinOp, lhs: Self, rhs: Self) -> Self {
        Expression::Binary(op, Box::new((lhs, rhs)))
    }

    /// Builds the unary operation `op arg`.
    pub fn unary(op: UnOp, arg: Self) -> Self {
        Expression::Unary(op, Box::new(arg))
    }

    /// Computes the [`Type`] of the expression,
    /// given the types of the variables in scope.
    pub fn r#type<F>(&self, ctx: &F) -> Result<Type, TypeError>
    where
        F: Fn(&V) -> Result<Type, TypeError>,
    {
        match self {
            Expression::Const(val) => Ok(val.r#type()),
            Expression::Var(var) => ctx(var),
            Expression::Unary(op, arg) => {
                let found = arg.r#type(ctx)?;
                let (expected, sym) = match op {
                    UnOp::Neg => (Type::Integer, "-"),
                    UnOp::Not => (Type::Boolean, "not"),
                };
                if found == expected {
                    Ok(expected)
                } else {
                    Err(TypeError::Operand {
                        op: sym,
                        expected,
                        found,
                    })
                }
            }
            Expression::Binary(op, args) => {
                let lhs = args.0.r#type(ctx)?;
                let rhs = args.1.r#type(ctx)?;
                let operands = |expected: Type| {
                    [lhs, rhs]
                        .into_iter()
                        .find(|t| *t != expected)
                        .map_or(Ok(()), |found| {
                            Err(TypeError::Operand {
                                op: op.symbol(),
                                expected,
                                found,
                            })
                        })
                };
                match op {
                    BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                        operands(Type::Integer).map(|_| Type::Integer)
                    }
                    BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                        operands(Type::Integer).map(|_| Type::Boolean)
                    }
                    BinOp::And | BinOp::Or | BinOp::Xor => {
                        operands(Type::Boolean).map(|_| Type::Boolean)
                    }
                    BinOp::Eq | BinOp::Ne if lhs == rhs => Ok(Type::Boolean),
                    BinOp::Eq | BinOp::Ne => Err(TypeError::Incomparable(lhs, rhs)),
                }
            }
        }
    }

    /// Evaluates the expression, given the values of the variables.
    pub fn eval<F>(&self, vals: &F) -> Result<Val, EvalError>
    where
        F: Fn(&V) -> Val,
    {
        match self {
            Expression::Const(val) => Ok(val.clone()),
            Expression::Var(var) => Ok(vals(var)),
            Expression::Unary(UnOp::Neg, arg) => match arg.eval(vals)? {
                Val::Integer(i) => i.checked_neg().map(Val::Integer).ok_or(EvalError::Overflow),
                _ => Err(EvalError::TypeMismatch),
            },
            Expression::Unary(UnOp::Not, arg) => match arg.eval(vals)? {
                Val::Boolean(b) => Ok(Val::Boolean(!b)),
                _ => Err(EvalError::TypeMismatch),
            },
            Expression::Binary(op, args) => {
                let lhs = args.0.eval(vals)?;
                let rhs = args.1.eval(vals)?;
                apply(*op, lhs, rhs)
            }
        }
    }

    /// Iterates over the variables occurring in the expression, with repetitions.
    pub fn vars(&self) -> Box<dyn Iterator<Item = &V> + '_> {
        match self {
            Expression::Const(_) => Box::new(std::iter::empty()),
            Expression::Var(var) => Box::new(std::iter::once(var)),
            Expression::Unary(_, arg) => arg.vars(),
            Expression::Binary(_, args) => Box::new(args.0.vars().chain(args.1.vars())),
        }
    }

    /// Maps the variables of the expression through a fallible function.
    pub fn try_map_vars<W, E, F>(self, f: &mut F) -> Result<Expression<W>, E>
    where
        F: FnMut(V) -> Result<W, E>,
    {
        Ok(match self {
            Expression::Const(val) => Expression::Const(val),
            Expression::Var(var) => Expression::Var(f(var)?),
            Expression::Unary(op, arg) => Expression::unary(op, arg.try_map_vars(f)?),
            Expression::Binary(op, args) => {
                let (lhs, rhs) = *args;
                Expression::binary(op, lhs.try_map_vars(f)?, rhs.try_map_vars(f)?)
            }
        })
    }

    /// Displays the expression in infix notation,
    /// using the given function to name variables.
    pub fn display<'a, N>(&'a self, names: &'a N) -> impl fmt::Display + 'a
    where
        N: Fn(&V) -> &'a str,
    {
        Infix { expr: self, names }
    }
}

struct Infix<'a, V, N> {
    expr: &'a Expression<V>,
    names: &'a N,
}

impl<'a, V, N> fmt::Display for Infix<'a, V, N>
where
    N: Fn(&V) -> &'a str,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sub = |expr| Infix {
            expr,
            names: self.names,
        };
        match self.expr {
            Expression::Const(val) => write!(f, "{val}"),
            Expression::Var(var) => write!(f, "{}", (self.names)(var)),
            Expression::Unary(UnOp::Neg, arg) => write!(f, "-{}", sub(arg)),
            Expression::Unary(UnOp::Not, arg) => write!(f, "not {}", sub(arg)),
            Expression::Binary(op, args) => {
                write!(f, "({} {} {})", sub(&args.0), op.symbol(), sub(&args.1))
            }
        }
    }
}

/// Applies a binary operator to two concrete values.
pub(crate) fn apply(op: BinOp, lhs: Val, rhs: Val) -> Result<Val, EvalError> {
    match (op, lhs, rhs) {
        (BinOp::Add, Val::Integer(a), Val::Integer(b)) => {
            a.checked_add(b).map(Val::Integer).ok_or(EvalError::Overflow)
        }
        (BinOp::Sub, Val::Integer(a), Val::Integer(b)) => {
            a.checked_sub(b).map(Val::Integer).ok_or(EvalError::Overflow)
        }
        (BinOp::Mul, Val::Integer(a), Val::Integer(b)) => {
            a.checked_mul(b).map(Val::Integer).ok_or(EvalError::Overflow)
        }
        (BinOp::Div, Val::Integer(a), Val::Integer(b)) => {
            euclid_div(a, b).map(Val::Integer).ok_or(EvalError::Overflow)
        }
        (BinOp::Mod, Val::Integer(a), Val::Integer(b)) => {
            euclid_mod(a, b).map(Val::Integer).ok_or(EvalError::Overflow)
        }
        (BinOp::Lt, Val::Integer(a), Val::Integer(b)) => Ok(Val::Boolean(a < b)),
        (BinOp::Le, Val::Integer(a), Val::Integer(b)) => Ok(Val::Boolean(a <= b)),
        (BinOp::Gt, Val::Integer(a), Val::Integer(b)) => Ok(Val::Boolean(a > b)),
        (BinOp::Ge, Val::Integer(a), Val::Integer(b)) => Ok(Val::Boolean(a >= b)),
        (BinOp::And, Val::Boolean(a), Val::Boolean(b)) => Ok(Val::Boolean(a && b)),
        (BinOp::Or, Val::Boolean(a), Val::Boolean(b)) => Ok(Val::Boolean(a || b)),
        (BinOp::Xor, Val::Boolean(a), Val::Boolean(b)) => Ok(Val::Boolean(a ^ b)),
        (BinOp::Eq, a, b) if a.r#type() == b.r#type() => Ok(Val::Boolean(a == b)),
        (BinOp::Ne, a, b) if a.r#type() == b.r#type() => Ok(Val::Boolean(a != b)),
        _ => Err(EvalError::TypeMismatch),
    }
}

/// Euclidean division; division by zero yields zero.
pub(crate) fn euclid_div(a: Integer, b: Integer) -> Option<Integer> {
    if b == 0 { Some(0) } else { a.checked_div_euclid(b) }
}

/// Euclidean remainder, always non-negative; the remainder of a division by zero is the dividend.
pub(crate) fn euclid_mod(a: Integer, b: Integer) -> Option<Integer> {
    if b == 0 { Some(a) } else { a.checked_rem_euclid(b) }
}
