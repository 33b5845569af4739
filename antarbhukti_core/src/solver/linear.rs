// Linear integer arithmetic: normal forms and Fourier-Motzkin elimination.
//
// Unknowns are integer-valued terms (symbols, or purified non-linear subterms),
// so every derived constraint can be tightened by the gcd of its coefficients.

use super::Term;
use std::collections::{BTreeMap, BTreeSet};

// Keeps intermediate products of two coefficients within `i128`.
const MAGNITUDE: i128 = 1 << 62;

/// `sum(coeffs[t] * t) + constant`, with no zero coefficients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct LinExpr {
    pub(crate) coeffs: BTreeMap<Term, i128>,
    pub(crate) constant: i128,
}

impl LinExpr {
    pub(crate) fn constant(constant: i128) -> Self {
        Self {
            coeffs: BTreeMap::new(),
            constant,
        }
    }

    pub(crate) fn atom(term: Term) -> Self {
        Self {
            coeffs: BTreeMap::from([(term, 1)]),
            constant: 0,
        }
    }

    pub(crate) fn as_constant(&self) -> Option<i128> {
        self.coeffs.is_empty().then_some(self.constant)
    }

    fn checked(self) -> Option<Self> {
        let small = |c: &i128| c.abs() < MAGNITUDE;
        (small(&self.constant) && self.coeffs.values().all(small)).then_some(self)
    }

    pub(crate) fn checked_add(&self, other: &Self) -> Option<Self> {
        let mut coeffs = self.coeffs.clone();
        for (term, c) in &other.coeffs {
            let entry = coeffs.entry(term.clone()).or_insert(0);
            *entry = entry.checked_add(*c)?;
            if *entry == 0 {
                coeffs.remove(term);
            }
        }
        Self {
            coeffs,
            constant: self.constant.checked_add(other.constant)?,
        }
        .checked()
    }

    pub(crate) fn checked_scale(&self, k: i128) -> Option<Self> {
        if k == 0 {
            return Some(Self::constant(0));
        }
        let coeffs = self
            .coeffs
            .iter()
            .map(|(t, c)| c.checked_mul(k).map(|c| (t.clone(), c)))
            .collect::<Option<_>>()?;
        Self {
            coeffs,
            constant: self.constant.checked_mul(k)?,
        }
        .checked()
    }

    pub(crate) fn checked_sub(&self, other: &Self) -> Option<Self> {
        self.checked_add(&other.checked_scale(-1)?)
    }

    pub(crate) fn offset(&self, k: i128) -> Option<Self> {
        Self {
            coeffs: self.coeffs.clone(),
            constant: self.constant.checked_add(k)?,
        }
        .checked()
    }

    // Divides by the gcd of the coefficients, rounding the constant so that
    // `self <= 0` keeps the same integer solutions.
    fn tighten(mut self) -> Self {
        let g = self.coeffs.values().fold(0, |g, c| gcd(g, *c));
        if g > 1 {
            self.coeffs.values_mut().for_each(|c| *c /= g);
            self.constant = ceil_div(self.constant, g);
        }
        self
    }
}

fn gcd(a: i128, b: i128) -> i128 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn ceil_div(a: i128, b: i128) -> i128 {
    let q = a.div_euclid(b);
    if a.rem_euclid(b) == 0 { q } else { q + 1 }
}

// `b` is positive.
fn floor_div(a: i128, b: i128) -> i128 {
    a.div_euclid(b)
}

/// Canonical form of a constraint `expr <= 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Canonical {
    /// The constraint has no unknowns.
    Const(bool),
    /// The constraint is `expr <= 0` (or its negation, if `negated`),
    /// with coprime coefficients and a positive leading one.
    Atom { expr: LinExpr, negated: bool },
}

/// Canonicalizes `expr <= 0`, so that equivalent constraints share one atom.
///
/// `q <= 0` with a negative leading coefficient is rewritten as `not (-q + 1 <= 0)`.
pub(crate) fn canonical_le(expr: LinExpr) -> Option<Canonical> {
    if let Some(c) = expr.as_constant() {
        return Some(Canonical::Const(c <= 0));
    }
    let expr = expr.tighten();
    match expr.coeffs.values().next() {
        Some(lead) if *lead < 0 => Some(Canonical::Atom {
            expr: expr.checked_scale(-1)?.offset(1)?,
            negated: true,
        }),
        _ => Some(Canonical::Atom {
            expr,
            negated: false,
        }),
    }
}

/// The outcome of Fourier-Motzkin elimination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Elimination {
    /// The constraints have no integer solution.
    Infeasible,
    /// The constraints have a rational solution (integer feasibility is unknown).
    Relaxed,
    /// The elimination grew beyond its limits.
    GaveUp,
}

/// Decides whether the constraints `c <= 0` for `c` in `constraints` can be refuted.
pub(crate) fn fourier_motzkin(constraints: Vec<LinExpr>, limit: usize) -> Elimination {
    eliminate(constraints, limit, &mut Vec::new())
}

/// An integer point satisfying `c <= 0` for every `c` in `constraints`.
///
/// Unknowns are eliminated as in [`fourier_motzkin`],
/// then assigned in reverse order of elimination,
/// each to the value closest to zero that its constraints allow.
/// `None` if no point is found, which proves nothing about the constraints.
pub(crate) fn solve(constraints: Vec<LinExpr>, limit: usize) -> Option<BTreeMap<Term, i128>> {
    let mut steps = Vec::new();
    if eliminate(constraints, limit, &mut steps) != Elimination::Relaxed {
        return None;
    }
    let mut point = BTreeMap::new();
    for (pivot, bounds) in steps.into_iter().rev() {
        let (mut lo, mut hi) = (i128::MIN, i128::MAX);
        for c in &bounds {
            let mut rest = c.constant;
            let mut k = 0;
            for (t, coeff) in &c.coeffs {
                if *t == pivot {
                    k = *coeff;
                } else {
                    let value = *point.entry(t.clone()).or_insert(0);
                    rest = rest.checked_add(coeff.checked_mul(value)?)?;
                }
            }
            // k * pivot + rest <= 0
            if k > 0 {
                hi = hi.min(floor_div(rest.checked_neg()?, k));
            } else if k < 0 {
                lo = lo.max(ceil_div(rest, -k));
            }
        }
        if lo > hi {
            return None;
        }
        point.insert(pivot, 0.clamp(lo, hi));
    }
    Some(point)
}

// Records, for each eliminated unknown, the constraints that bounded it.
fn eliminate(
    constraints: Vec<LinExpr>,
    limit: usize,
    steps: &mut Vec<(Term, Vec<LinExpr>)>,
) -> Elimination {
    let mut current = BTreeSet::new();
    for c in constraints {
        match normalize(c) {
            Some(Some(c)) => {
                current.insert(c);
            }
            Some(None) => {}
            None => return Elimination::Infeasible,
        }
    }
    loop {
        // Count occurrences by sign to pick the cheapest unknown.
        let pivot = {
            let mut occurrences: BTreeMap<&Term, (usize, usize)> = BTreeMap::new();
            for c in &current {
                for (t, k) in &c.coeffs {
                    let entry = occurrences.entry(t).or_default();
                    if *k > 0 {
                        entry.0 += 1;
                    } else {
                        entry.1 += 1;
                    }
                }
            }
            occurrences
                .iter()
                .min_by_key(|(_, (pos, neg))| pos * neg)
                .map(|(t, _)| (*t).clone())
        };
        let Some(pivot) = pivot else {
            return Elimination::Relaxed;
        };
        let mut next = BTreeSet::new();
        let mut lower = Vec::new();
        let mut upper = Vec::new();
        for c in current {
            match c.coeffs.get(&pivot).copied() {
                Some(k) if k > 0 => upper.push((k, c)),
                Some(k) => lower.push((-k, c)),
                None => {
                    next.insert(c);
                }
            }
        }
        for (a, up) in &upper {
            for (b, low) in &lower {
                let Some(combined) = up
                    .checked_scale(*b)
                    .and_then(|up| Some((up, low.checked_scale(*a)?)))
                    .and_then(|(up, low)| up.checked_add(&low))
                else {
                    return Elimination::GaveUp;
                };
                match normalize(combined) {
                    Some(Some(c)) => {
                        next.insert(c);
                    }
                    Some(None) => {}
                    None => return Elimination::Infeasible,
                }
                if next.len() > limit {
                    return Elimination::GaveUp;
                }
            }
        }
        let bounds = upper.into_iter().chain(lower).map(|(_, c)| c).collect();
        steps.push((pivot, bounds));
        current = next;
    }
}

// `None` if the constraint is false, `Some(None)` if it is trivially true.
fn normalize(c: LinExpr) -> Option<Option<LinExpr>> {
    match c.as_constant() {
        Some(k) if k <= 0 => Some(None),
        Some(_) => None,
        None => Some(Some(c.tighten())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Type;

    fn x() -> LinExpr {
        LinExpr::atom(Term::var("x", Type::Integer))
    }

    fn y() -> LinExpr {
        LinExpr::atom(Term::var("y", Type::Integer))
    }

    #[test]
    fn shared_atoms() {
        // x <= 3 and x > 3 (i.e. 4 - x <= 0) share the atom x - 3 <= 0.
        let le = canonical_le(x().offset(-3).expect("small")).expect("small");
        let gt = canonical_le(x().checked_scale(-1).and_then(|e| e.offset(4)).expect("small"))
            .expect("small");
        match (le, gt) {
            (
                Canonical::Atom { expr: a, negated: false },
                Canonical::Atom { expr: b, negated: true },
            ) => assert_eq!(a, b),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn gcd_tightening() {
        // 2x - 1 <= 0 over the integers is x <= 0.
        let e = x().checked_scale(2).and_then(|e| e.offset(-1)).expect("small");
        match canonical_le(e) {
            Some(Canonical::Atom { expr, negated: false }) => assert_eq!(expr, x()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn elimination() {
        // x <= y, y <= 2, x >= 3
        let constraints = vec![
            x().checked_sub(&y()).expect("small"),
            y().offset(-2).expect("small"),
            x().checked_scale(-1).and_then(|e| e.offset(3)).expect("small"),
        ];
        assert_eq!(fourier_motzkin(constraints.clone(), 64), Elimination::Infeasible);
        assert_eq!(
            fourier_motzkin(constraints[..2].to_vec(), 64),
            Elimination::Relaxed
        );
        // 2x = 1 has rational but no integer solutions.
        let two_x = x().checked_scale(2).expect("small");
        let constraints = vec![
            two_x.offset(-1).expect("small"),
            two_x.checked_scale(-1).and_then(|e| e.offset(1)).expect("small"),
        ];
        assert_eq!(fourier_motzkin(constraints, 64), Elimination::Infeasible);
    }

    #[test]
    fn back_substitution() {
        // x + y = 1000 and x - y = 500
        let sum = x().checked_add(&y()).expect("small");
        let diff = x().checked_sub(&y()).expect("small");
        let constraints = vec![
            sum.offset(-1000).expect("small"),
            sum.checked_scale(-1).and_then(|e| e.offset(1000)).expect("small"),
            diff.offset(-500).expect("small"),
            diff.checked_scale(-1).and_then(|e| e.offset(500)).expect("small"),
        ];
        let point = solve(constraints, 64).expect("a solution");
        assert_eq!(point[&Term::var("x", Type::Integer)], 750);
        assert_eq!(point[&Term::var("y", Type::Integer)], 250);
        // Values stay as close to zero as the bounds allow.
        let point = solve(vec![x().checked_scale(-1).and_then(|e| e.offset(-3)).expect("small")], 64)
            .expect("a solution");
        assert_eq!(point[&Term::var("x", Type::Integer)], 0);
        let point = solve(vec![x().checked_scale(-1).and_then(|e| e.offset(3)).expect("small")], 64)
            .expect("a solution");
        assert_eq!(point[&Term::var("x", Type::Integer)], 3);
        assert_eq!(solve(vec![LinExpr::constant(1)], 64), None);
    }
}
