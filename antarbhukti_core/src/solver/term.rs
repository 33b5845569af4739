use crate::grammar::{BinOp, EvalError, Integer, Type, Val, apply};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// A solver-agnostic logical term over named symbols.
///
/// Subterms are reference-counted so that substitution can share them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Int(Integer),
    /// String literal.
    Str(String),
    /// A symbol of the given sort.
    Var(Arc<str>, Type),
    /// Integer negation.
    Neg(Arc<Term>),
    /// Integer sum.
    Add(Arc<Term>, Arc<Term>),
    /// Integer difference.
    Sub(Arc<Term>, Arc<Term>),
    /// Integer product.
    Mul(Arc<Term>, Arc<Term>),
    /// Euclidean quotient.
    Div(Arc<Term>, Arc<Term>),
    /// Euclidean remainder.
    Mod(Arc<Term>, Arc<Term>),
    /// Equality between terms of the same sort.
    Eq(Arc<Term>, Arc<Term>),
    /// Integer strict order.
    Lt(Arc<Term>, Arc<Term>),
    /// Integer non-strict order.
    Le(Arc<Term>, Arc<Term>),
    /// Negation.
    Not(Arc<Term>),
    /// Conjunction (true when empty).
    And(Vec<Term>),
    /// Disjunction (false when empty).
    Or(Vec<Term>),
}

#[allow(clippy::should_implement_trait)]
impl Term {
    /// A symbol of the given sort.
    pub fn var(name: impl Into<Arc<str>>, sort: Type) -> Self {
        Term::Var(name.into(), sort)
    }

    /// The literal for a value.
    pub fn val(val: &Val) -> Self {
        match val {
            Val::Boolean(b) => Term::Bool(*b),
            Val::Integer(i) => Term::Int(*i),
            Val::String(s) => Term::Str(s.clone()),
        }
    }

    /// Integer negation.
    pub fn neg(self) -> Self {
        Term::Neg(Arc::new(self))
    }

    /// Negation, folding literals and double negations.
    pub fn not(self) -> Self {
        match self {
            Term::Bool(b) => Term::Bool(!b),
            Term::Not(t) => Arc::unwrap_or_clone(t),
            t => Term::Not(Arc::new(t)),
        }
    }

    /// Equality; `true` when both sides are the same term.
    pub fn eq(self, other: Term) -> Self {
        if self == other {
            Term::Bool(true)
        } else {
            Term::Eq(Arc::new(self), Arc::new(other))
        }
    }

    /// Flattening conjunction that drops `true` and collapses on `false`.
    pub fn and(terms: impl IntoIterator<Item = Term>) -> Self {
        let mut conjuncts = Vec::new();
        for term in terms {
            match term {
                Term::Bool(true) => {}
                Term::Bool(false) => return Term::Bool(false),
                Term::And(inner) => conjuncts.extend(inner),
                t => conjuncts.push(t),
            }
        }
        match conjuncts.len() {
            0 => Term::Bool(true),
            1 => conjuncts.pop().unwrap_or(Term::Bool(true)),
            _ => Term::And(conjuncts),
        }
    }

    /// Flattening disjunction that drops `false` and collapses on `true`.
    pub fn or(terms: impl IntoIterator<Item = Term>) -> Self {
        let mut disjuncts = Vec::new();
        for term in terms {
            match term {
                Term::Bool(false) => {}
                Term::Bool(true) => return Term::Bool(true),
                Term::Or(inner) => disjuncts.extend(inner),
                t => disjuncts.push(t),
            }
        }
        match disjuncts.len() {
            0 => Term::Bool(false),
            1 => disjuncts.pop().unwrap_or(Term::Bool(false)),
            _ => Term::Or(disjuncts),
        }
    }

    /// Builds the term for `lhs op rhs`.
    pub fn binary(op: BinOp, lhs: Term, rhs: Term) -> Self {
        let (l, r) = (Arc::new(lhs), Arc::new(rhs));
        match op {
            BinOp::Add => Term::Add(l, r),
            BinOp::Sub => Term::Sub(l, r),
            BinOp::Mul => Term::Mul(l, r),
            BinOp::Div => Term::Div(l, r),
            BinOp::Mod => Term::Mod(l, r),
            BinOp::Eq => Arc::unwrap_or_clone(l).eq(Arc::unwrap_or_clone(r)),
            BinOp::Ne => Arc::unwrap_or_clone(l).eq(Arc::unwrap_or_clone(r)).not(),
            BinOp::Lt => Term::Lt(l, r),
            BinOp::Le => Term::Le(l, r),
            BinOp::Gt => Term::Lt(r, l),
            BinOp::Ge => Term::Le(r, l),
            BinOp::And => Term::and([Arc::unwrap_or_clone(l), Arc::unwrap_or_clone(r)]),
            BinOp::Or => Term::or([Arc::unwrap_or_clone(l), Arc::unwrap_or_clone(r)]),
            BinOp::Xor => Arc::unwrap_or_clone(l).eq(Arc::unwrap_or_clone(r)).not(),
        }
    }

    /// The sort of the term.
    pub fn sort(&self) -> Type {
        match self {
            Term::Bool(_)
            | Term::Eq(..)
            | Term::Lt(..)
            | Term::Le(..)
            | Term::Not(_)
            | Term::And(_)
            | Term::Or(_) => Type::Boolean,
            Term::Str(_) => Type::String,
            Term::Var(_, sort) => *sort,
            Term::Int(_)
            | Term::Neg(_)
            | Term::Add(..)
            | Term::Sub(..)
            | Term::Mul(..)
            | Term::Div(..)
            | Term::Mod(..) => Type::Integer,
        }
    }

    /// Collects the free symbols of the term with their sorts.
    pub fn symbols(&self, acc: &mut BTreeMap<Arc<str>, Type>) {
        match self {
            Term::Bool(_) | Term::Int(_) | Term::Str(_) => {}
            Term::Var(name, sort) => {
                acc.insert(name.clone(), *sort);
            }
            Term::Neg(t) | Term::Not(t) => t.symbols(acc),
            Term::Add(a, b)
            | Term::Sub(a, b)
            | Term::Mul(a, b)
            | Term::Div(a, b)
            | Term::Mod(a, b)
            | Term::Eq(a, b)
            | Term::Lt(a, b)
            | Term::Le(a, b) => {
                a.symbols(acc);
                b.symbols(acc);
            }
            Term::And(ts) | Term::Or(ts) => ts.iter().for_each(|t| t.symbols(acc)),
        }
    }

    pub(crate) fn mentions(&self, symbol: &str) -> bool {
        match self {
            Term::Bool(_) | Term::Int(_) | Term::Str(_) => false,
            Term::Var(name, _) => name.as_ref() == symbol,
            Term::Neg(t) | Term::Not(t) => t.mentions(symbol),
            Term::Add(a, b)
            | Term::Sub(a, b)
            | Term::Mul(a, b)
            | Term::Div(a, b)
            | Term::Mod(a, b)
            | Term::Eq(a, b)
            | Term::Lt(a, b)
            | Term::Le(a, b) => a.mentions(symbol) || b.mentions(symbol),
            Term::And(ts) | Term::Or(ts) => ts.iter().any(|t| t.mentions(symbol)),
        }
    }

    /// Collects integer and string literals, used to seed the model search.
    pub(crate) fn literals(&self, ints: &mut BTreeSet<Integer>, strs: &mut BTreeSet<String>) {
        match self {
            Term::Bool(_) | Term::Var(..) => {}
            Term::Int(i) => {
                ints.insert(*i);
            }
            Term::Str(s) => {
                strs.insert(s.clone());
            }
            Term::Neg(t) | Term::Not(t) => t.literals(ints, strs),
            Term::Add(a, b)
            | Term::Sub(a, b)
            | Term::Mul(a, b)
            | Term::Div(a, b)
            | Term::Mod(a, b)
            | Term::Eq(a, b)
            | Term::Lt(a, b)
            | Term::Le(a, b) => {
                a.literals(ints, strs);
                b.literals(ints, strs);
            }
            Term::And(ts) | Term::Or(ts) => ts.iter().for_each(|t| t.literals(ints, strs)),
        }
    }

    /// Replaces every occurrence of `symbol` with `by`.
    pub(crate) fn substitute(&self, symbol: &str, by: &Arc<Term>) -> Term {
        if !self.mentions(symbol) {
            return self.clone();
        }
        let sub = |t: &Arc<Term>| -> Arc<Term> {
            if let Term::Var(name, _) = t.as_ref()
                && name.as_ref() == symbol
            {
                by.clone()
            } else if t.mentions(symbol) {
                Arc::new(t.substitute(symbol, by))
            } else {
                t.clone()
            }
        };
        match self {
            Term::Var(..) => by.as_ref().clone(),
            Term::Neg(t) => Term::Neg(sub(t)),
            Term::Not(t) => Term::Not(sub(t)),
            Term::Add(a, b) => Term::Add(sub(a), sub(b)),
            Term::Sub(a, b) => Term::Sub(sub(a), sub(b)),
            Term::Mul(a, b) => Term::Mul(sub(a), sub(b)),
            Term::Div(a, b) => Term::Div(sub(a), sub(b)),
            Term::Mod(a, b) => Term::Mod(sub(a), sub(b)),
            Term::Eq(a, b) => Term::Eq(sub(a), sub(b)),
            Term::Lt(a, b) => Term::Lt(sub(a), sub(b)),
            Term::Le(a, b) => Term::Le(sub(a), sub(b)),
            Term::And(ts) => Term::And(ts.iter().map(|t| t.substitute(symbol, by)).collect()),
            Term::Or(ts) => Term::Or(ts.iter().map(|t| t.substitute(symbol, by)).collect()),
            Term::Bool(_) | Term::Int(_) | Term::Str(_) => self.clone(),
        }
    }

    /// Evaluates the term under a (total) assignment of its symbols.
    pub fn eval<F>(&self, env: &F) -> Result<Val, EvalError>
    where
        F: Fn(&str) -> Option<Val>,
    {
        let int = |t: &Term| match t.eval(env)? {
            Val::Integer(i) => Ok(i),
            _ => Err(EvalError::TypeMismatch),
        };
        let boolean = |t: &Term| match t.eval(env)? {
            Val::Boolean(b) => Ok(b),
            _ => Err(EvalError::TypeMismatch),
        };
        match self {
            Term::Bool(b) => Ok(Val::Boolean(*b)),
            Term::Int(i) => Ok(Val::Integer(*i)),
            Term::Str(s) => Ok(Val::String(s.clone())),
            Term::Var(name, sort) => Ok(env(name).unwrap_or_else(|| sort.default_value())),
            Term::Neg(t) => int(t)?
                .checked_neg()
                .map(Val::Integer)
                .ok_or(EvalError::Overflow),
            Term::Add(a, b) => apply(BinOp::Add, a.eval(env)?, b.eval(env)?),
            Term::Sub(a, b) => apply(BinOp::Sub, a.eval(env)?, b.eval(env)?),
            Term::Mul(a, b) => apply(BinOp::Mul, a.eval(env)?, b.eval(env)?),
            Term::Div(a, b) => apply(BinOp::Div, a.eval(env)?, b.eval(env)?),
            Term::Mod(a, b) => apply(BinOp::Mod, a.eval(env)?, b.eval(env)?),
            Term::Eq(a, b) => apply(BinOp::Eq, a.eval(env)?, b.eval(env)?),
            Term::Lt(a, b) => apply(BinOp::Lt, a.eval(env)?, b.eval(env)?),
            Term::Le(a, b) => apply(BinOp::Le, a.eval(env)?, b.eval(env)?),
            Term::Not(t) => Ok(Val::Boolean(!boolean(t)?)),
            Term::And(ts) => {
                for t in ts {
                    if !boolean(t)? {
                        return Ok(Val::Boolean(false));
                    }
                }
                Ok(Val::Boolean(true))
            }
            Term::Or(ts) => {
                for t in ts {
                    if boolean(t)? {
                        return Ok(Val::Boolean(true));
                    }
                }
                Ok(Val::Boolean(false))
            }
        }
    }
}

// SMT-LIB flavoured printing, used in logs.
impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nary = |f: &mut fmt::Formatter<'_>, op: &str, ts: &[Term]| {
            write!(f, "({op}")?;
            for t in ts {
                write!(f, " {t}")?;
            }
            write!(f, ")")
        };
        match self {
            Term::Bool(b) => write!(f, "{b}"),
            Term::Int(i) if *i < 0 => write!(f, "(- {})", i.unsigned_abs()),
            Term::Int(i) => write!(f, "{i}"),
            Term::Str(s) => write!(f, "{s:?}"),
            Term::Var(name, _) => write!(f, "|{name}|"),
            Term::Neg(t) => write!(f, "(- {t})"),
            Term::Add(a, b) => write!(f, "(+ {a} {b})"),
            Term::Sub(a, b) => write!(f, "(- {a} {b})"),
            Term::Mul(a, b) => write!(f, "(* {a} {b})"),
            Term::Div(a, b) => write!(f, "(div {a} {b})"),
            Term::Mod(a, b) => write!(f, "(mod {a} {b})"),
            Term::Eq(a, b) => write!(f, "(= {a} {b})"),
            Term::Lt(a, b) => write!(f, "(< {a} {b})"),
            Term::Le(a, b) => write!(f, "(<= {a} {b})"),
            Term::Not(t) => write!(f, "(not {t})"),
            Term::And(ts) => nary(f, "and", ts),
            Term::Or(ts) => nary(f, "or", ts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Term {
        Term::var("x", Type::Integer)
    }

    #[test]
    fn connectives_flatten() {
        let t = Term::and([
            Term::Bool(true),
            Term::and([x().eq(Term::Int(1)), Term::Bool(true)]),
        ]);
        assert_eq!(t, x().eq(Term::Int(1)));
        assert_eq!(Term::or([Term::Bool(false)]), Term::Bool(false));
        assert_eq!(Term::and([x().eq(x()), Term::Bool(false)]), Term::Bool(false));
        assert_eq!(x().eq(Term::Int(3)).not().not(), x().eq(Term::Int(3)));
    }

    #[test]
    fn substitution_and_eval() {
        let def = Arc::new(Term::binary(BinOp::Mod, x(), Term::Int(16)));
        let t = Term::binary(BinOp::Gt, Term::var("r", Type::Integer), Term::Int(3));
        let t = t.substitute("r", &def);
        assert!(!t.mentions("r"));
        let env = |name: &str| (name == "x").then_some(Val::Integer(20));
        assert_eq!(t.eval(&env), Ok(Val::Boolean(true)));
        assert_eq!(t.to_string(), "(< 3 (mod |x| 16))");
    }
}
