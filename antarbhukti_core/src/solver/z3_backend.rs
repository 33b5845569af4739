use super::{Limits, Model, Query, SatResult, SmtSolver, Term, UnknownReason};
use crate::grammar::{Type, Val};
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use z3::ast::{Bool, Int};

#[derive(Debug, Error)]
enum Z3Error {
    #[error("sort mismatch in {0}")]
    Sort(&'static str),
}

/// An [`SmtSolver`] backed by the Z3 theorem prover.
///
/// Every check runs on a fresh Z3 solver of the calling thread,
/// with the time left before the deadline as Z3's timeout.
/// Strings are only ever compared for equality,
/// so string literals are encoded as distinct integer codes
/// and string symbols as integer constants.
#[derive(Debug, Clone, Copy, Default)]
pub struct Z3Solver;

impl SmtSolver for Z3Solver {
    fn check(&self, query: &Query, limits: &Limits<'_>) -> SatResult {
        if let Some(reason) = limits.interrupted() {
            return SatResult::Unknown(reason);
        }
        let formula = query.formula();
        let mut symbols = BTreeMap::new();
        formula.symbols(&mut symbols);
        let mut ints = BTreeSet::new();
        let mut strs = BTreeSet::new();
        formula.literals(&mut ints, &mut strs);
        let encoder = Encoder::new(strs);
        let assertion = match encoder.translate(&formula).and_then(Z3Term::into_bool) {
            Ok(assertion) => assertion,
            Err(err) => {
                debug!(target: "solver", "cannot encode query for z3: {err}");
                return SatResult::Unknown(UnknownReason::Incomplete);
            }
        };

        let solver = z3::Solver::new();
        let mut params = z3::Params::new();
        let left = limits.deadline.saturating_duration_since(Instant::now());
        params.set_u32(
            "timeout",
            u32::try_from(left.as_millis()).unwrap_or(u32::MAX).max(1),
        );
        solver.set_params(&params);
        solver.assert(&assertion);
        match solver.check() {
            z3::SatResult::Unsat => SatResult::Unsat,
            z3::SatResult::Unknown => {
                let reason = limits.interrupted().unwrap_or(UnknownReason::Incomplete);
                trace!(target: "solver", "z3 returned unknown ({reason})");
                SatResult::Unknown(reason)
            }
            z3::SatResult::Sat => match solver.get_model() {
                Some(model) => SatResult::Sat(encoder.read_back(&model, &symbols)),
                None => SatResult::Unknown(UnknownReason::Incomplete),
            },
        }
    }
}

enum Z3Term {
    Int(Int),
    Bool(Bool),
}

impl Z3Term {
    fn into_int(self) -> Result<Int, Z3Error> {
        match self {
            Z3Term::Int(i) => Ok(i),
            Z3Term::Bool(_) => Err(Z3Error::Sort("integer operand")),
        }
    }

    fn into_bool(self) -> Result<Bool, Z3Error> {
        match self {
            Z3Term::Bool(b) => Ok(b),
            Z3Term::Int(_) => Err(Z3Error::Sort("boolean operand")),
        }
    }
}

struct Encoder {
    // Code of each string literal, and back.
    codes: BTreeMap<String, i64>,
    literals: BTreeMap<i64, String>,
}

impl Encoder {
    fn new(strs: BTreeSet<String>) -> Self {
        let codes: BTreeMap<String, i64> = strs.into_iter().zip(0..).collect();
        let literals = codes.iter().map(|(s, code)| (*code, s.clone())).collect();
        Self { codes, literals }
    }

    fn int(&self, term: &Term) -> Result<Int, Z3Error> {
        self.translate(term)?.into_int()
    }

    fn bools(&self, terms: &[Term]) -> Result<Vec<Bool>, Z3Error> {
        terms
            .iter()
            .map(|t| self.translate(t)?.into_bool())
            .collect()
    }

    fn translate(&self, term: &Term) -> Result<Z3Term, Z3Error> {
        Ok(match term {
            Term::Bool(b) => Z3Term::Bool(Bool::from_bool(*b)),
            Term::Int(i) => Z3Term::Int(Int::from_i64(*i)),
            Term::Str(s) => {
                let code = self.codes.get(s).copied().ok_or(Z3Error::Sort("string literal"))?;
                Z3Term::Int(Int::from_i64(code))
            }
            Term::Var(name, Type::Boolean) => Z3Term::Bool(Bool::new_const(name.as_ref())),
            Term::Var(name, _) => Z3Term::Int(Int::new_const(name.as_ref())),
            Term::Neg(a) => Z3Term::Int(&Int::from_i64(0) - &self.int(a)?),
            Term::Add(a, b) => Z3Term::Int(&self.int(a)? + &self.int(b)?),
            Term::Sub(a, b) => Z3Term::Int(&self.int(a)? - &self.int(b)?),
            Term::Mul(a, b) => Z3Term::Int(&self.int(a)? * &self.int(b)?),
            // Division by zero yields 0, and the dividend as remainder.
            Term::Div(a, b) | Term::Mod(a, b) => {
                let (a, b) = (self.int(a)?, self.int(b)?);
                let zero = Int::from_i64(0);
                let by_zero = b.eq(&zero);
                if matches!(term, Term::Div(..)) {
                    Z3Term::Int(by_zero.ite(&zero, &a.div(&b)))
                } else {
                    Z3Term::Int(by_zero.ite(&a, &a.modulo(&b)))
                }
            }
            Term::Eq(a, b) => match (self.translate(a)?, self.translate(b)?) {
                (Z3Term::Int(a), Z3Term::Int(b)) => Z3Term::Bool(a.eq(&b)),
                (Z3Term::Bool(a), Z3Term::Bool(b)) => Z3Term::Bool(a.eq(&b)),
                _ => return Err(Z3Error::Sort("equality")),
            },
            Term::Lt(a, b) => Z3Term::Bool(self.int(a)?.lt(&self.int(b)?)),
            Term::Le(a, b) => Z3Term::Bool(self.int(a)?.le(&self.int(b)?)),
            Term::Not(a) => Z3Term::Bool(self.translate(a)?.into_bool()?.not()),
            Term::And(terms) => {
                let bools = self.bools(terms)?;
                let refs: Vec<&Bool> = bools.iter().collect();
                Z3Term::Bool(Bool::and(&refs))
            }
            Term::Or(terms) => {
                let bools = self.bools(terms)?;
                let refs: Vec<&Bool> = bools.iter().collect();
                Z3Term::Bool(Bool::or(&refs))
            }
        })
    }

    // A string for a code no literal has.
    fn fresh(&self, code: i64) -> String {
        let mut s = format!("#{code}");
        while self.codes.contains_key(&s) {
            s.insert(0, '#');
        }
        s
    }

    fn read_back(&self, model: &z3::Model, symbols: &BTreeMap<Arc<str>, Type>) -> Model {
        let mut values = Model::new();
        for (name, sort) in symbols {
            let val = match sort {
                Type::Boolean => model
                    .eval::<Bool>(&Bool::new_const(name.as_ref()), true)
                    .and_then(|v| v.as_bool())
                    .map(Val::Boolean),
                Type::Integer => model
                    .eval::<Int>(&Int::new_const(name.as_ref()), true)
                    .and_then(|v| v.as_i64())
                    .map(Val::Integer),
                Type::String => model
                    .eval::<Int>(&Int::new_const(name.as_ref()), true)
                    .and_then(|v| v.as_i64())
                    .map(|code| match self.literals.get(&code) {
                        Some(s) => Val::String(s.clone()),
                        None => Val::String(self.fresh(code)),
                    }),
            };
            if let Some(val) = val {
                values.insert(name.to_string(), val);
            }
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::BinOp;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn check(assertions: Vec<Term>) -> SatResult {
        let cancelled = AtomicBool::new(false);
        let limits = Limits {
            deadline: Instant::now() + Duration::from_secs(10),
            bound: 4096,
            cancelled: &cancelled,
        };
        Z3Solver.check(&Query::new(assertions), &limits)
    }

    fn int(name: &str) -> Term {
        Term::var(name, Type::Integer)
    }

    #[test]
    fn linear_model() {
        let sum = Term::binary(BinOp::Add, int("x"), int("y"));
        let diff = Term::binary(BinOp::Sub, int("x"), int("y"));
        let result = check(vec![sum.eq(Term::Int(1000)), diff.eq(Term::Int(500))]);
        let SatResult::Sat(model) = result else {
            panic!("expected a model, got {result:?}");
        };
        assert_eq!(model.get("x"), Some(&Val::Integer(750)));
        assert_eq!(model.get("y"), Some(&Val::Integer(250)));
    }

    #[test]
    fn division_by_zero() {
        let q = Term::binary(BinOp::Div, int("x"), int("d"));
        let r = Term::binary(BinOp::Mod, int("x"), int("d"));
        let result = check(vec![
            int("d").eq(Term::Int(0)),
            Term::and([q.eq(Term::Int(0)), r.eq(int("x"))]).not(),
        ]);
        assert_eq!(result, SatResult::Unsat);
    }

    #[test]
    fn strings_are_distinct_codes() {
        let s = Term::var("s", Type::String);
        let a = Term::Str("a".to_string());
        let b = Term::Str("b".to_string());
        assert_eq!(
            check(vec![s.clone().eq(a.clone()), s.clone().eq(b.clone())]),
            SatResult::Unsat
        );
        let result = check(vec![s.clone().eq(a).not(), s.eq(b).not()]);
        let SatResult::Sat(model) = result else {
            panic!("expected a model, got {result:?}");
        };
        let Some(Val::String(value)) = model.get("s") else {
            panic!("s missing from {model:?}");
        };
        assert!(value != "a" && value != "b");
    }

    #[test]
    fn expired_deadline() {
        let cancelled = AtomicBool::new(false);
        let limits = Limits {
            deadline: Instant::now(),
            bound: 4096,
            cancelled: &cancelled,
        };
        let query = Query::new([Term::binary(BinOp::Gt, int("x"), Term::Int(3))]);
        assert_eq!(
            Z3Solver.check(&query, &limits),
            SatResult::Unknown(UnknownReason::Timeout)
        );
    }
}
