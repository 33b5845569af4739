use super::linear::{Canonical, Elimination, LinExpr, canonical_le, fourier_motzkin, solve};
use super::{Limits, Model, Query, SatResult, SmtSolver, Term, UnknownReason};
use crate::grammar::{Integer, Type, Val, euclid_div, euclid_mod};
use log::trace;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// Constraints Fourier-Motzkin may hold before giving up on a branch.
const FM_LIMIT: usize = 256;
// How often (in search nodes or candidates) limits are polled.
const POLL: usize = 64;

/// A self-contained solver for quantifier-free integer, boolean and string formulas.
///
/// Unsatisfiability is proved by case splitting over the boolean structure,
/// with every branch checked by Fourier-Motzkin elimination over the integers
/// and by congruence over string equalities.
/// Satisfiability is proved by exhibiting a model,
/// found by enumerating candidate values seeded by the constants of the formula
/// and by a solution of the linear constraints of the branch left open.
/// Queries neither proof covers within the work bound are [`UnknownReason::Incomplete`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundedSolver;

impl SmtSolver for BoundedSolver {
    fn check(&self, query: &Query, limits: &Limits<'_>) -> SatResult {
        let (conjuncts, definitions) = solve_eqs(query.assertions());
        let formula = Term::and(conjuncts);
        if formula == Term::Bool(false) {
            return SatResult::Unsat;
        }
        if let Some(reason) = limits.interrupted() {
            return SatResult::Unknown(reason);
        }
        let mut canon = Canonicalizer::default();
        let root = canon.translate(&formula);
        let mut refutation = Refutation {
            atoms: &canon.atoms,
            limits: *limits,
            nodes: 0,
        };
        let outcome = refutation.refute(vec![&root], vec![None; canon.atoms.len()], Vec::new());
        trace!(
            target: "solver",
            "{} atoms, {} search nodes: {outcome:?}",
            canon.atoms.len(),
            refutation.nodes
        );
        match outcome {
            Refute::Refuted => SatResult::Unsat,
            Refute::Stopped(reason) => SatResult::Unknown(reason),
            Refute::Open(assign) => {
                let seeds = refutation.seeds(&assign);
                model_search(&formula, &definitions, &seeds, limits)
            }
            Refute::Exhausted => model_search(&formula, &definitions, &BTreeMap::new(), limits),
        }
    }
}

// Eliminates top-level definitions `x = t` (with `x` not in `t`) by substitution.
// Returns the remaining conjuncts and the definitions in elimination order.
fn solve_eqs(assertions: &[Term]) -> (Vec<Term>, Vec<(Arc<str>, Term)>) {
    let mut pending = Vec::new();
    assertions.iter().for_each(|a| flatten(a, &mut pending));
    let mut definitions = Vec::new();
    while let Some((idx, name, def)) = pending
        .iter()
        .enumerate()
        .find_map(|(idx, c)| solvable(c).map(|(name, def)| (idx, name, def)))
    {
        pending.remove(idx);
        let by = Arc::new(def.clone());
        let mut next = Vec::with_capacity(pending.len());
        for c in pending {
            flatten(&c.substitute(&name, &by), &mut next);
        }
        pending = next;
        definitions.push((name, def));
    }
    (pending, definitions)
}

fn flatten(term: &Term, acc: &mut Vec<Term>) {
    match term {
        Term::And(terms) => terms.iter().for_each(|t| flatten(t, acc)),
        Term::Bool(true) => {}
        t => acc.push(t.clone()),
    }
}

fn solvable(conjunct: &Term) -> Option<(Arc<str>, Term)> {
    match conjunct {
        Term::Eq(a, b) => match (a.as_ref(), b.as_ref()) {
            (Term::Var(x, _), t) | (t, Term::Var(x, _)) if !t.mentions(x) => {
                Some((x.clone(), t.clone()))
            }
            _ => None,
        },
        Term::Var(x, Type::Boolean) => Some((x.clone(), Term::Bool(true))),
        Term::Not(a) => match a.as_ref() {
            Term::Var(x, Type::Boolean) => Some((x.clone(), Term::Bool(false))),
            _ => None,
        },
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Atom {
    // expr <= 0
    Le(LinExpr),
    Bool(Arc<str>),
    // Sorted pair.
    StrEq(Term, Term),
    // Unconstrained, e.g. a comparison whose coefficients overflow.
    Fresh(usize),
}

#[derive(Debug)]
enum Nnf {
    Const(bool),
    Lit(usize, bool),
    And(Vec<Nnf>),
    Or(Vec<Nnf>),
}

fn conj(children: Vec<Nnf>) -> Nnf {
    let mut flat = Vec::with_capacity(children.len());
    for child in children {
        match child {
            Nnf::Const(true) => {}
            Nnf::Const(false) => return Nnf::Const(false),
            Nnf::And(inner) => flat.extend(inner),
            child => flat.push(child),
        }
    }
    match flat.len() {
        0 => Nnf::Const(true),
        1 => flat.pop().unwrap_or(Nnf::Const(true)),
        _ => Nnf::And(flat),
    }
}

fn disj(children: Vec<Nnf>) -> Nnf {
    let mut flat = Vec::with_capacity(children.len());
    for child in children {
        match child {
            Nnf::Const(false) => {}
            Nnf::Const(true) => return Nnf::Const(true),
            Nnf::Or(inner) => flat.extend(inner),
            child => flat.push(child),
        }
    }
    match flat.len() {
        0 => Nnf::Const(false),
        1 => flat.pop().unwrap_or(Nnf::Const(false)),
        _ => Nnf::Or(flat),
    }
}

fn division_key(dividend: &Term, divisor: Integer, quotient: bool) -> Term {
    let (a, d) = (Arc::new(dividend.clone()), Arc::new(Term::Int(divisor)));
    if quotient {
        Term::Div(a, d)
    } else {
        Term::Mod(a, d)
    }
}

// Translates formulas into negation normal form over canonical atoms.
#[derive(Debug, Default)]
struct Canonicalizer {
    atoms: Vec<Atom>,
    index: BTreeMap<Atom, usize>,
    divisions: BTreeSet<(Term, Integer)>,
    pending: Vec<(Term, Integer)>,
}

impl Canonicalizer {
    fn translate(&mut self, formula: &Term) -> Nnf {
        let mut parts = vec![self.nnf(formula, true)];
        while let Some((dividend, divisor)) = self.pending.pop() {
            let axioms = self.division_axioms(&dividend, divisor);
            parts.push(axioms);
        }
        conj(parts)
    }

    fn lit(&mut self, atom: Atom, positive: bool) -> Nnf {
        let idx = match self.index.get(&atom) {
            Some(idx) => *idx,
            None => {
                let idx = self.atoms.len();
                self.atoms.push(atom.clone());
                self.index.insert(atom, idx);
                idx
            }
        };
        Nnf::Lit(idx, positive)
    }

    fn fresh(&mut self, positive: bool) -> Nnf {
        let atom = Atom::Fresh(self.atoms.len());
        self.lit(atom, positive)
    }

    fn le(&mut self, expr: Option<LinExpr>, positive: bool) -> Nnf {
        match expr.and_then(canonical_le) {
            Some(Canonical::Const(holds)) => Nnf::Const(holds == positive),
            Some(Canonical::Atom { expr, negated }) => self.lit(Atom::Le(expr), positive != negated),
            None => self.fresh(positive),
        }
    }

    fn lin(&mut self, term: &Term) -> LinExpr {
        self.try_lin(term)
            .unwrap_or_else(|| LinExpr::atom(term.clone()))
    }

    fn diff(&mut self, a: &Term, b: &Term) -> Option<LinExpr> {
        let a = self.lin(a);
        a.checked_sub(&self.lin(b))
    }

    // Linear form of an integer term; non-linear subterms become unknowns of their own.
    fn try_lin(&mut self, term: &Term) -> Option<LinExpr> {
        match term {
            Term::Int(c) => Some(LinExpr::constant(i128::from(*c))),
            Term::Var(_, Type::Integer) => Some(LinExpr::atom(term.clone())),
            Term::Neg(a) => self.lin(a).checked_scale(-1),
            Term::Add(a, b) => {
                let a = self.lin(a);
                a.checked_add(&self.lin(b))
            }
            Term::Sub(a, b) => self.diff(a, b),
            Term::Mul(a, b) => {
                let (la, lb) = (self.lin(a), self.lin(b));
                match (la.as_constant(), lb.as_constant()) {
                    (Some(k), _) => lb.checked_scale(k),
                    (_, Some(k)) => la.checked_scale(k),
                    _ => Some(LinExpr::atom(term.clone())),
                }
            }
            Term::Div(a, b) | Term::Mod(a, b) => {
                let quotient = matches!(term, Term::Div(..));
                let (la, lb) = (self.lin(a), self.lin(b));
                match (la.as_constant(), lb.as_constant()) {
                    (Some(n), Some(d)) => {
                        let (n, d) = (Integer::try_from(n).ok()?, Integer::try_from(d).ok()?);
                        let val = if quotient {
                            euclid_div(n, d)?
                        } else {
                            euclid_mod(n, d)?
                        };
                        Some(LinExpr::constant(i128::from(val)))
                    }
                    (_, Some(0)) if quotient => Some(LinExpr::constant(0)),
                    (_, Some(0)) => Some(la),
                    (_, Some(d)) => {
                        let d = Integer::try_from(d).ok()?;
                        let dividend = a.as_ref().clone();
                        if self.divisions.insert((dividend.clone(), d)) {
                            self.pending.push((dividend.clone(), d));
                        }
                        Some(LinExpr::atom(division_key(&dividend, d, quotient)))
                    }
                    _ => Some(LinExpr::atom(term.clone())),
                }
            }
            _ => None,
        }
    }

    // a = k * (a div k) + (a mod k) and 0 <= a mod k <= |k| - 1
    fn division_axioms(&mut self, dividend: &Term, divisor: Integer) -> Nnf {
        let q = LinExpr::atom(division_key(dividend, divisor, true));
        let m = LinExpr::atom(division_key(dividend, divisor, false));
        let a = self.lin(dividend);
        let k = i128::from(divisor);
        let Some(def) = q
            .checked_scale(k)
            .and_then(|kq| a.checked_sub(&kq))
            .and_then(|e| e.checked_sub(&m))
        else {
            return Nnf::Const(true);
        };
        let parts = vec![
            self.le(def.checked_scale(-1), true),
            self.le(Some(def), true),
            self.le(m.checked_scale(-1), true),
            self.le(m.offset(1 - k.abs()), true),
        ];
        conj(parts)
    }

    fn nnf(&mut self, term: &Term, positive: bool) -> Nnf {
        match term {
            Term::Bool(b) => Nnf::Const(*b == positive),
            Term::Var(name, Type::Boolean) => self.lit(Atom::Bool(name.clone()), positive),
            Term::Not(a) => self.nnf(a, !positive),
            Term::And(terms) | Term::Or(terms) => {
                let children = terms.iter().map(|c| self.nnf(c, positive)).collect();
                if matches!(term, Term::And(_)) == positive {
                    conj(children)
                } else {
                    disj(children)
                }
            }
            Term::Lt(a, b) => {
                let expr = self.diff(a, b).and_then(|e| e.offset(1));
                self.le(expr, positive)
            }
            Term::Le(a, b) => {
                let expr = self.diff(a, b);
                self.le(expr, positive)
            }
            Term::Eq(a, b) => match a.sort() {
                Type::Integer => {
                    let d = self.diff(a, b);
                    let neg = d.as_ref().and_then(|d| d.checked_scale(-1));
                    if positive {
                        let parts = vec![self.le(d, true), self.le(neg, true)];
                        conj(parts)
                    } else {
                        let parts = vec![
                            self.le(d.and_then(|d| d.offset(1)), true),
                            self.le(neg.and_then(|n| n.offset(1)), true),
                        ];
                        disj(parts)
                    }
                }
                Type::Boolean => {
                    let (pa, na) = (self.nnf(a, true), self.nnf(a, false));
                    let (pb, nb) = (self.nnf(b, true), self.nnf(b, false));
                    if positive {
                        disj(vec![conj(vec![pa, pb]), conj(vec![na, nb])])
                    } else {
                        disj(vec![conj(vec![pa, nb]), conj(vec![na, pb])])
                    }
                }
                Type::String => self.string_eq(a, b, positive),
            },
            _ => self.fresh(positive),
        }
    }

    fn string_eq(&mut self, a: &Term, b: &Term, positive: bool) -> Nnf {
        match (a, b) {
            _ if a == b => Nnf::Const(positive),
            (Term::Str(x), Term::Str(y)) => Nnf::Const((x == y) == positive),
            _ => {
                let (x, y) = if a <= b { (a, b) } else { (b, a) };
                self.lit(Atom::StrEq(x.clone(), y.clone()), positive)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Refute {
    Refuted,
    // A branch survived every check, with this assignment of the atoms.
    Open(Vec<Option<bool>>),
    // The work bound ran out.
    Exhausted,
    Stopped(UnknownReason),
}

struct Refutation<'a> {
    atoms: &'a [Atom],
    limits: Limits<'a>,
    nodes: usize,
}

fn holds(node: &Nnf, assign: &[Option<bool>]) -> Option<bool> {
    match node {
        Nnf::Const(b) => Some(*b),
        Nnf::Lit(atom, positive) => assign[*atom].map(|value| value == *positive),
        Nnf::And(_) | Nnf::Or(_) => None,
    }
}

impl Refutation<'_> {
    fn refute<'n>(
        &mut self,
        mut todo: Vec<&'n Nnf>,
        mut assign: Vec<Option<bool>>,
        mut ors: Vec<Vec<&'n Nnf>>,
    ) -> Refute {
        self.nodes += 1;
        if self.nodes > self.limits.bound {
            return Refute::Exhausted;
        }
        if self.nodes % POLL == 0
            && let Some(reason) = self.limits.interrupted()
        {
            return Refute::Stopped(reason);
        }
        loop {
            while let Some(node) = todo.pop() {
                match node {
                    Nnf::Const(true) => {}
                    Nnf::Const(false) => return Refute::Refuted,
                    Nnf::Lit(atom, positive) => match assign[*atom] {
                        Some(value) if value != *positive => return Refute::Refuted,
                        _ => assign[*atom] = Some(*positive),
                    },
                    Nnf::And(children) => todo.extend(children.iter()),
                    Nnf::Or(children) => ors.push(children.iter().collect()),
                }
            }
            if self.theory_conflict(&assign) {
                return Refute::Refuted;
            }
            let mut open = Vec::with_capacity(ors.len());
            for children in ors {
                if children.iter().any(|c| holds(c, &assign) == Some(true)) {
                    continue;
                }
                let live: Vec<&Nnf> = children
                    .into_iter()
                    .filter(|c| holds(c, &assign) != Some(false))
                    .collect();
                match live.len() {
                    0 => return Refute::Refuted,
                    1 => todo.push(live[0]),
                    _ => open.push(live),
                }
            }
            ors = open;
            if !todo.is_empty() {
                continue;
            }
            let Some(pick) = (0..ors.len()).min_by_key(|idx| ors[*idx].len()) else {
                return Refute::Open(assign);
            };
            let choice = ors.swap_remove(pick);
            for child in choice {
                match self.refute(vec![child], assign.clone(), ors.clone()) {
                    Refute::Refuted => {}
                    other => return other,
                }
            }
            return Refute::Refuted;
        }
    }

    // The linear constraints the assignment asserts.
    fn constraints(&self, assign: &[Option<bool>]) -> Vec<LinExpr> {
        let mut constraints = Vec::new();
        for (atom, value) in self.atoms.iter().zip(assign) {
            match (atom, value) {
                (Atom::Le(e), Some(true)) => constraints.push(e.clone()),
                // not (e <= 0) iff -e + 1 <= 0
                (Atom::Le(e), Some(false)) => {
                    constraints.extend(e.checked_scale(-1).and_then(|e| e.offset(1)))
                }
                _ => {}
            }
        }
        constraints
    }

    fn theory_conflict(&self, assign: &[Option<bool>]) -> bool {
        let mut equal = Vec::new();
        let mut distinct = Vec::new();
        for (atom, value) in self.atoms.iter().zip(assign) {
            match (atom, value) {
                (Atom::StrEq(a, b), Some(true)) => equal.push((a, b)),
                (Atom::StrEq(a, b), Some(false)) => distinct.push((a, b)),
                _ => {}
            }
        }
        let constraints = self.constraints(assign);
        (!constraints.is_empty()
            && fourier_motzkin(constraints, FM_LIMIT) == Elimination::Infeasible)
            || strings_conflict(&equal, &distinct)
    }

    // Values suggested by an open branch:
    // its boolean literals, and an integer point of its linear constraints.
    fn seeds(&self, assign: &[Option<bool>]) -> BTreeMap<Arc<str>, Val> {
        let mut seeds = BTreeMap::new();
        for (atom, value) in self.atoms.iter().zip(assign) {
            if let (Atom::Bool(name), Some(value)) = (atom, value) {
                seeds.insert(name.clone(), Val::Boolean(*value));
            }
        }
        let point = solve(self.constraints(assign), FM_LIMIT).unwrap_or_default();
        for (term, value) in point {
            if let (Term::Var(name, Type::Integer), Ok(value)) = (term, Integer::try_from(value)) {
                seeds.insert(name, Val::Integer(value));
            }
        }
        seeds
    }
}

fn strings_conflict(equal: &[(&Term, &Term)], distinct: &[(&Term, &Term)]) -> bool {
    fn find<'t>(parent: &BTreeMap<&'t Term, &'t Term>, mut t: &'t Term) -> &'t Term {
        while let Some(p) = parent.get(t) {
            t = p;
        }
        t
    }
    let mut parent = BTreeMap::new();
    for &(a, b) in equal {
        let (ra, rb) = (find(&parent, a), find(&parent, b));
        if ra != rb {
            parent.insert(ra, rb);
        }
    }
    let mut literals: BTreeMap<&Term, &Term> = BTreeMap::new();
    for t in equal.iter().flat_map(|&(a, b)| [a, b]) {
        if let Term::Str(_) = t {
            let root = find(&parent, t);
            match literals.get(root) {
                Some(other) if *other != t => return true,
                _ => {
                    literals.insert(root, t);
                }
            }
        }
    }
    distinct
        .iter()
        .any(|&(a, b)| find(&parent, a) == find(&parent, b))
}

fn int_candidates(literals: &BTreeSet<Integer>) -> Vec<Val> {
    let mut values = BTreeSet::from([0, 1, -1, 2, -2]);
    for &c in literals {
        let neighbours = [c.checked_sub(1), Some(c), c.checked_add(1), c.checked_neg()];
        values.extend(neighbours.into_iter().flatten());
    }
    let mut values = values.into_iter().collect::<Vec<Integer>>();
    values.sort_by_key(|v| (v.unsigned_abs(), *v < 0));
    values.into_iter().map(Val::Integer).collect()
}

fn str_candidates(literals: &BTreeSet<String>) -> Vec<Val> {
    let mut values = vec![Val::String(String::new())];
    values.extend(
        literals
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| Val::String(s.clone())),
    );
    // A value different from every literal.
    let fresh = (0..)
        .map(|n| format!("#{n}"))
        .find(|s| !literals.contains(s))
        .unwrap_or_default();
    values.push(Val::String(fresh));
    values
}

// Enumerates assignments in shells of increasing rank:
// shell `r` holds the tuples whose largest candidate index is `r`.
// Seeded symbols try their seed first, so shell 0 is the seed itself.
fn model_search(
    formula: &Term,
    definitions: &[(Arc<str>, Term)],
    seeds: &BTreeMap<Arc<str>, Val>,
    limits: &Limits<'_>,
) -> SatResult {
    let mut symbols = BTreeMap::new();
    formula.symbols(&mut symbols);
    let mut ints = BTreeSet::new();
    let mut strs = BTreeSet::new();
    formula.literals(&mut ints, &mut strs);
    definitions
        .iter()
        .for_each(|(_, def)| def.literals(&mut ints, &mut strs));
    let finite = symbols.values().all(|sort| *sort == Type::Boolean);
    let (int_values, str_values) = (int_candidates(&ints), str_candidates(&strs));
    let domains = symbols
        .into_iter()
        .map(|(name, sort)| {
            let mut domain = match sort {
                Type::Boolean => vec![Val::Boolean(false), Val::Boolean(true)],
                Type::Integer => int_values.clone(),
                Type::String => str_values.clone(),
            };
            if let Some(seed) = seeds.get(&name).filter(|seed| seed.r#type() == sort) {
                domain.retain(|v| v != seed);
                domain.insert(0, seed.clone());
            }
            (name, domain)
        })
        .collect::<Vec<_>>();
    let widest = domains.iter().map(|(_, d)| d.len()).max().unwrap_or(1);
    let mut assignment = BTreeMap::new();
    let mut tried = 0usize;
    let mut errors = false;
    for rank in 0..widest {
        let sizes = domains
            .iter()
            .map(|(_, d)| d.len().min(rank + 1))
            .collect::<Vec<_>>();
        let mut idx = vec![0usize; domains.len()];
        'shell: loop {
            if domains.is_empty() || idx.contains(&rank) {
                tried += 1;
                if tried > limits.bound {
                    return SatResult::Unknown(UnknownReason::Incomplete);
                }
                if tried % POLL == 0
                    && let Some(reason) = limits.interrupted()
                {
                    return SatResult::Unknown(reason);
                }
                for ((name, domain), i) in domains.iter().zip(&idx) {
                    assignment.insert(name.clone(), domain[*i].clone());
                }
                match formula.eval(&|name: &str| assignment.get(name).cloned()) {
                    Ok(Val::Boolean(true)) => {
                        return SatResult::Sat(extend(assignment, definitions));
                    }
                    Ok(_) => {}
                    Err(_) => errors = true,
                }
            }
            let mut pos = 0;
            loop {
                if pos == idx.len() {
                    break 'shell;
                }
                idx[pos] += 1;
                if idx[pos] < sizes[pos] {
                    break;
                }
                idx[pos] = 0;
                pos += 1;
            }
        }
    }
    if finite && !errors {
        SatResult::Unsat
    } else {
        SatResult::Unknown(UnknownReason::Incomplete)
    }
}

// Completes a model with the values of the eliminated symbols.
fn extend(assignment: BTreeMap<Arc<str>, Val>, definitions: &[(Arc<str>, Term)]) -> Model {
    let mut model = assignment;
    for (name, def) in definitions.iter().rev() {
        let val = def
            .eval(&|n: &str| model.get(n).cloned())
            .unwrap_or_else(|_| def.sort().default_value());
        model.insert(name.clone(), val);
    }
    model
        .into_iter()
        .map(|(name, val)| (name.to_string(), val))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::BinOp;
    use std::sync::atomic::AtomicBool;
    use std::time::{Duration, Instant};

    fn check(assertions: Vec<Term>) -> SatResult {
        let cancelled = AtomicBool::new(false);
        let limits = Limits {
            deadline: Instant::now() + Duration::from_secs(10),
            bound: 4096,
            cancelled: &cancelled,
        };
        BoundedSolver.check(&Query::new(assertions), &limits)
    }

    fn int(name: &str) -> Term {
        Term::var(name, Type::Integer)
    }

    fn boolean(name: &str) -> Term {
        Term::var(name, Type::Boolean)
    }

    #[test]
    fn linear_conflict() {
        let result = check(vec![
            Term::binary(BinOp::Gt, int("x"), Term::Int(3)),
            Term::binary(BinOp::Lt, int("x"), Term::Int(2)),
        ]);
        assert_eq!(result, SatResult::Unsat);
    }

    #[test]
    fn remainders_are_bounded() {
        let m = Term::binary(BinOp::Mod, int("x"), Term::Int(16));
        let result = check(vec![Term::binary(BinOp::Gt, m, Term::Int(15))]);
        assert_eq!(result, SatResult::Unsat);
    }

    #[test]
    fn remainders_differ() {
        let r16 = Term::binary(BinOp::Mod, int("input"), Term::Int(16));
        let r15 = Term::binary(BinOp::Mod, int("input"), Term::Int(15));
        let result = check(vec![
            int("s.r#1").eq(r16),
            int("t.r#1").eq(r15),
            int("s.r#1").eq(int("t.r#1")).not(),
        ]);
        let SatResult::Sat(model) = result else {
            panic!("expected a model, got {result:?}");
        };
        let Some(Val::Integer(input)) = model.get("input") else {
            panic!("input missing from {model:?}");
        };
        assert_ne!(input.rem_euclid(16), input.rem_euclid(15));
        assert_eq!(model.get("s.r#1"), Some(&Val::Integer(input.rem_euclid(16))));
    }

    #[test]
    fn models_outside_the_literals() {
        // The only solution, x = 750 and y = 250, is far from every constant.
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
    fn booleans_are_exhausted() {
        let xor = Term::binary(BinOp::Xor, boolean("a"), boolean("b"));
        assert_eq!(
            check(vec![xor.clone(), boolean("a").eq(boolean("b"))]),
            SatResult::Unsat
        );
        assert!(matches!(check(vec![xor]), SatResult::Sat(_)));
    }

    #[test]
    fn strings() {
        let s = Term::var("s", Type::String);
        let t = Term::var("t", Type::String);
        let a = Term::Str("a".to_string());
        let b = Term::Str("b".to_string());
        assert_eq!(
            check(vec![s.clone().eq(t.clone()), s.clone().eq(a.clone()), t.clone().eq(b)]),
            SatResult::Unsat
        );
        let result = check(vec![s.clone().eq(a).not(), s.eq(t.clone()).not()]);
        assert!(matches!(result, SatResult::Sat(_)), "{result:?}");
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
            BoundedSolver.check(&query, &limits),
            SatResult::Unknown(UnknownReason::Timeout)
        );
    }
}
