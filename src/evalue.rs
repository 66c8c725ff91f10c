//! Piecewise quasi-polynomial values
//!
//! An [`EValue`] is a tree whose leaves are exact rationals and whose inner
//! nodes are polynomial, periodic, fractional, flooring, relation, or
//! partition forms. Quasi-polynomial coefficients are themselves evalues, so
//! a polynomial node in variable `v` may carry fractional or periodic parts
//! of `v` inside its coefficient list — that is exactly the structure of an
//! Ehrhart quasi-polynomial.
//!
//! The algebra is in-place where possible: negation, addition ([`EValue::eadd`]),
//! multiplication ([`EValue::emul`]), reduction, residue splitting,
//! fractional-to-floor rewriting, and exact evaluation at integer parameter
//! points. Partition pieces keep pairwise-disjoint validity domains over the
//! integer lattice; every operation preserves that invariant.

#![allow(missing_docs)]

use num::{Integer, One, Zero};

use crate::arith::{modulo, rat_floor, rat_fract};
use crate::polyhedron::Polyhedron;
use crate::{Int, Rat};

/// A piecewise quasi-polynomial value.
#[derive(Clone, Debug)]
pub enum EValue {
    /// A rational constant.
    Rational(Rat),
    /// `Σ_i coeffs[i] · x_var^i`, coefficients ordered by degree.
    Polynomial { var: usize, coeffs: Vec<EValue> },
    /// `values[x_var mod values.len()]`.
    Periodic { var: usize, values: Vec<EValue> },
    /// `Σ_i coeffs[i] · {arg}^i` where `{·}` is the fractional part.
    Fractional {
        arg: Box<EValue>,
        coeffs: Vec<EValue>,
    },
    /// `Σ_i coeffs[i] · ⌊arg⌋^i`.
    Flooring {
        arg: Box<EValue>,
        coeffs: Vec<EValue>,
    },
    /// `if cond == 0 { if_zero } else { otherwise (default 0) }`.
    Relation {
        cond: Box<EValue>,
        if_zero: Box<EValue>,
        otherwise: Option<Box<EValue>>,
    },
    /// Value per validity domain; domains are pairwise disjoint over `Z^m`
    /// and the value is zero outside every listed domain.
    Partition { pieces: Vec<(Polyhedron, EValue)> },
}

impl EValue {
    /// The rational constant zero.
    pub fn zero() -> Self {
        EValue::Rational(Rat::zero())
    }

    /// The rational constant one.
    pub fn one() -> Self {
        EValue::Rational(Rat::one())
    }

    /// A constant integer leaf.
    pub fn from_int(v: Int) -> Self {
        EValue::Rational(Rat::from_integer(v))
    }

    /// A constant rational leaf.
    pub fn from_rat(v: Rat) -> Self {
        EValue::Rational(v)
    }

    /// Affine form `Σ coeffs[i]·x_i + cst` as nested polynomial nodes.
    pub fn from_affine(coeffs: &[Rat], cst: &Rat) -> Self {
        let mut out = EValue::Rational(cst.clone());
        for (v, c) in coeffs.iter().enumerate() {
            if c.is_zero() {
                continue;
            }
            out.eadd(&EValue::Polynomial {
                var: v,
                coeffs: vec![EValue::zero(), EValue::Rational(c.clone())],
            });
        }
        out
    }

    /// Whether this value is literally the rational zero.
    pub fn is_zero(&self) -> bool {
        matches!(self, EValue::Rational(r) if r.is_zero())
    }

    /// Constant value if the tree is a bare rational.
    pub fn as_rational(&self) -> Option<&Rat> {
        match self {
            EValue::Rational(r) => Some(r),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Negation, addition, multiplication
    // ------------------------------------------------------------------

    /// In-place negation.
    pub fn negate(&mut self) {
        match self {
            EValue::Rational(r) => *r = -r.clone(),
            EValue::Polynomial { coeffs, .. }
            | EValue::Fractional { coeffs, .. }
            | EValue::Flooring { coeffs, .. } => {
                for c in coeffs {
                    c.negate();
                }
            }
            EValue::Periodic { values, .. } => {
                for v in values {
                    v.negate();
                }
            }
            EValue::Relation {
                if_zero, otherwise, ..
            } => {
                if_zero.negate();
                if let Some(o) = otherwise {
                    o.negate();
                }
            }
            EValue::Partition { pieces } => {
                for (_, v) in pieces {
                    v.negate();
                }
            }
        }
    }

    /// In-place addition.
    pub fn eadd(&mut self, other: &EValue) {
        if other.is_zero() {
            return;
        }
        // Keep the structurally richer node on the left; among polynomial
        // nodes the smaller variable is the outer one.
        let flip = rank(other) > rank(self)
            || matches!(
                (&*self, other),
                (
                    EValue::Polynomial { var, .. },
                    EValue::Polynomial { var: v2, .. },
                ) if v2 < var
            );
        if flip {
            let prev = std::mem::replace(self, EValue::zero());
            let mut flipped = other.clone();
            flipped.eadd(&prev);
            *self = flipped;
            return;
        }
        match self {
            EValue::Rational(r) => match other {
                EValue::Rational(o) => *r += o,
                _ => unreachable!("rank ordering keeps rationals on the right"),
            },
            EValue::Polynomial { var, coeffs } => match other {
                EValue::Polynomial {
                    var: v2,
                    coeffs: c2,
                } if v2 == var => {
                    if coeffs.len() < c2.len() {
                        coeffs.resize(c2.len(), EValue::zero());
                    }
                    for (a, b) in coeffs.iter_mut().zip(c2) {
                        a.eadd(b);
                    }
                }
                _ => coeffs[0].eadd(other),
            },
            EValue::Fractional { arg, coeffs } => match other {
                EValue::Fractional {
                    arg: a2,
                    coeffs: c2,
                } if args_equal(arg, a2) => {
                    if coeffs.len() < c2.len() {
                        coeffs.resize(c2.len(), EValue::zero());
                    }
                    for (a, b) in coeffs.iter_mut().zip(c2) {
                        a.eadd(b);
                    }
                }
                _ => coeffs[0].eadd(other),
            },
            EValue::Flooring { arg, coeffs } => match other {
                EValue::Flooring {
                    arg: a2,
                    coeffs: c2,
                } if args_equal(arg, a2) => {
                    if coeffs.len() < c2.len() {
                        coeffs.resize(c2.len(), EValue::zero());
                    }
                    for (a, b) in coeffs.iter_mut().zip(c2) {
                        a.eadd(b);
                    }
                }
                _ => coeffs[0].eadd(other),
            },
            EValue::Periodic { var, values } => match other {
                EValue::Periodic {
                    var: v2,
                    values: w2,
                } if v2 == var => {
                    let l = num::integer::lcm(values.len(), w2.len());
                    let mut merged = Vec::with_capacity(l);
                    for i in 0..l {
                        let mut v = values[i % values.len()].clone();
                        v.eadd(&w2[i % w2.len()]);
                        merged.push(v);
                    }
                    *values = merged;
                }
                _ => {
                    for v in values {
                        v.eadd(other);
                    }
                }
            },
            EValue::Relation {
                if_zero, otherwise, ..
            } => {
                if_zero.eadd(other);
                match otherwise {
                    Some(o) => o.eadd(other),
                    None => {
                        let mut o = EValue::zero();
                        o.eadd(other);
                        *otherwise = Some(Box::new(o));
                    }
                }
            }
            EValue::Partition { pieces } => match other {
                EValue::Partition { pieces: p2 } => {
                    let combined = combine_partitions(pieces, p2, true);
                    *pieces = combined;
                }
                _ => {
                    for (_, v) in pieces {
                        v.eadd(other);
                    }
                }
            },
        }
    }

    /// In-place multiplication.
    pub fn emul(&mut self, other: &EValue) {
        if self.is_zero() {
            return;
        }
        if other.is_zero() {
            *self = EValue::zero();
            return;
        }
        if rank(other) > rank(self) {
            let prev = std::mem::replace(self, EValue::zero());
            let mut flipped = other.clone();
            flipped.emul(&prev);
            *self = flipped;
            return;
        }
        match self {
            EValue::Rational(r) => match other {
                EValue::Rational(o) => *r *= o,
                _ => unreachable!("rank ordering keeps rationals on the right"),
            },
            EValue::Polynomial { var, coeffs } => match other {
                EValue::Polynomial {
                    var: v2,
                    coeffs: c2,
                } if v2 == var => {
                    *coeffs = convolve(coeffs, c2);
                }
                _ => {
                    for c in coeffs {
                        c.emul(other);
                    }
                }
            },
            EValue::Fractional { arg, coeffs } => match other {
                EValue::Fractional {
                    arg: a2,
                    coeffs: c2,
                } if args_equal(arg, a2) => {
                    *coeffs = convolve(coeffs, c2);
                }
                _ => {
                    for c in coeffs {
                        c.emul(other);
                    }
                }
            },
            EValue::Flooring { arg, coeffs } => match other {
                EValue::Flooring {
                    arg: a2,
                    coeffs: c2,
                } if args_equal(arg, a2) => {
                    *coeffs = convolve(coeffs, c2);
                }
                _ => {
                    for c in coeffs {
                        c.emul(other);
                    }
                }
            },
            EValue::Periodic { values, .. } => {
                for v in values {
                    v.emul(other);
                }
            }
            EValue::Relation {
                if_zero, otherwise, ..
            } => {
                if_zero.emul(other);
                if let Some(o) = otherwise {
                    o.emul(other);
                }
            }
            EValue::Partition { pieces } => match other {
                EValue::Partition { pieces: p2 } => {
                    let combined = combine_partitions(pieces, p2, false);
                    *pieces = combined;
                }
                _ => {
                    for (_, v) in pieces {
                        v.emul(other);
                    }
                }
            },
        }
    }

    // ------------------------------------------------------------------
    // Reduction
    // ------------------------------------------------------------------

    /// Simplify in place: fold constants, drop zero terms, collapse
    /// degenerate nodes, rejoin partition pieces split along one facet.
    pub fn reduce(&mut self) {
        let cur = std::mem::replace(self, EValue::Rational(Rat::zero()));
        *self = reduce_owned(cur);
    }

    // ------------------------------------------------------------------
    // Substitution and residue splitting
    // ------------------------------------------------------------------

    /// Substitute `repl` for variable `var`. Periodic nodes of `var` are
    /// rewritten as residue relations before substituting.
    pub fn substitute(&mut self, var: usize, repl: &EValue) {
        match self {
            EValue::Rational(_) => {}
            EValue::Polynomial { var: v, coeffs } if *v == var => {
                for c in coeffs.iter_mut() {
                    c.substitute(var, repl);
                }
                let folded = poly_of(coeffs, repl);
                *self = folded;
            }
            EValue::Polynomial { coeffs, .. } => {
                for c in coeffs.iter_mut() {
                    c.substitute(var, repl);
                }
            }
            EValue::Periodic { var: v, values } if *v == var => {
                let values = std::mem::take(values);
                let m = values.len();
                let mut acc = EValue::zero();
                for (r, val) in values.into_iter().enumerate() {
                    let mut inner = val;
                    inner.substitute(var, repl);
                    // Select the class with cond = {(repl - r)/m}.
                    let mut shifted = repl.clone();
                    shifted.eadd(&EValue::from_int(-Int::from(r as i64)));
                    shifted.emul(&EValue::Rational(Rat::new(
                        Int::one(),
                        Int::from(m as i64),
                    )));
                    let cond = EValue::Fractional {
                        arg: Box::new(shifted),
                        coeffs: vec![EValue::zero(), EValue::one()],
                    };
                    acc.eadd(&EValue::Relation {
                        cond: Box::new(cond),
                        if_zero: Box::new(inner),
                        otherwise: None,
                    });
                }
                *self = acc;
            }
            EValue::Periodic { values, .. } => {
                for v in values.iter_mut() {
                    v.substitute(var, repl);
                }
            }
            EValue::Fractional { arg, coeffs } | EValue::Flooring { arg, coeffs } => {
                arg.substitute(var, repl);
                for c in coeffs.iter_mut() {
                    c.substitute(var, repl);
                }
            }
            EValue::Relation {
                cond,
                if_zero,
                otherwise,
            } => {
                cond.substitute(var, repl);
                if_zero.substitute(var, repl);
                if let Some(o) = otherwise {
                    o.substitute(var, repl);
                }
            }
            EValue::Partition { pieces } => {
                for (_, v) in pieces.iter_mut() {
                    v.substitute(var, repl);
                }
            }
        }
    }

    /// Rewrite every fractional node as `arg - ⌊arg⌋` in flooring form.
    pub fn frac2floor(&mut self) {
        match self {
            EValue::Rational(_) => {}
            EValue::Fractional { arg, coeffs } => {
                arg.frac2floor();
                for c in coeffs.iter_mut() {
                    c.frac2floor();
                }
                // u = arg - ⌊arg⌋
                let mut u = (**arg).clone();
                u.eadd(&EValue::Flooring {
                    arg: arg.clone(),
                    coeffs: vec![EValue::zero(), EValue::from_int(-Int::one())],
                });
                *self = poly_of(coeffs, &u);
            }
            EValue::Flooring { arg, coeffs } => {
                arg.frac2floor();
                for c in coeffs.iter_mut() {
                    c.frac2floor();
                }
            }
            EValue::Polynomial { coeffs, .. } => {
                for c in coeffs.iter_mut() {
                    c.frac2floor();
                }
            }
            EValue::Periodic { values, .. } => {
                for v in values.iter_mut() {
                    v.frac2floor();
                }
            }
            EValue::Relation {
                cond,
                if_zero,
                otherwise,
            } => {
                cond.frac2floor();
                if_zero.frac2floor();
                if let Some(o) = otherwise {
                    o.frac2floor();
                }
            }
            EValue::Partition { pieces } => {
                for (_, v) in pieces.iter_mut() {
                    v.frac2floor();
                }
            }
        }
    }

    /// Range reduction: on the given domain, collapse fractional nodes whose
    /// affine argument has a fixed integer quotient (the argument's floor is
    /// constant over the whole domain).
    pub fn reduce_in_domain(&mut self, domain: &Polyhedron) {
        match self {
            EValue::Rational(_) => {}
            EValue::Fractional { arg, coeffs } => {
                arg.reduce_in_domain(domain);
                for c in coeffs.iter_mut() {
                    c.reduce_in_domain(domain);
                }
                if let Some((coeffs_aff, cst)) = as_affine(arg) {
                    // Common denominator form (a·p + c0)/m.
                    let m = coeffs_aff
                        .iter()
                        .fold(cst.denom().clone(), |acc, c| acc.lcm(c.denom()));
                    let mut scaled: Vec<Int> = coeffs_aff
                        .iter()
                        .map(|c| c.numer() * (&m / c.denom()))
                        .collect();
                    scaled.resize(domain.dim(), Int::zero());
                    let scaled_cst = cst.numer() * (&m / cst.denom());
                    if let Some((lo, hi)) = domain.affine_range(&scaled, &scaled_cst) {
                        let lo_q = rat_floor(&(lo / Rat::from_integer(m.clone())));
                        let hi_q = rat_floor(&(hi / Rat::from_integer(m.clone())));
                        if lo_q == hi_q {
                            // {arg} = arg - q on the whole domain.
                            let mut u = (**arg).clone();
                            u.eadd(&EValue::from_int(-lo_q));
                            *self = poly_of(coeffs, &u);
                            self.reduce();
                        }
                    }
                }
            }
            EValue::Flooring { arg, coeffs } => {
                arg.reduce_in_domain(domain);
                for c in coeffs.iter_mut() {
                    c.reduce_in_domain(domain);
                }
            }
            EValue::Polynomial { coeffs, .. } => {
                for c in coeffs.iter_mut() {
                    c.reduce_in_domain(domain);
                }
            }
            EValue::Periodic { values, .. } => {
                for v in values.iter_mut() {
                    v.reduce_in_domain(domain);
                }
            }
            EValue::Relation {
                cond,
                if_zero,
                otherwise,
            } => {
                cond.reduce_in_domain(domain);
                if_zero.reduce_in_domain(domain);
                if let Some(o) = otherwise {
                    o.reduce_in_domain(domain);
                }
            }
            EValue::Partition { pieces } => {
                for (d, v) in pieces.iter_mut() {
                    v.reduce_in_domain(d);
                }
            }
        }
    }

    /// Expand fractional and periodic nodes over the residue classes of
    /// their leading variable modulo `m`, producing residue relations whose
    /// leaves are plain polynomials (the periodic fallback form).
    pub fn split_periods(&mut self, var: usize, m: usize) {
        debug_assert!(m > 0);
        let var_node = EValue::Polynomial {
            var,
            coeffs: vec![EValue::zero(), EValue::one()],
        };
        let mut acc = EValue::zero();
        for r in 0..m {
            let mut piece = self.clone();
            piece.residue_reduce(var, m, &Int::from(r as i64));
            piece.reduce();
            let mut shifted = var_node.clone();
            shifted.eadd(&EValue::from_int(-Int::from(r as i64)));
            shifted.emul(&EValue::Rational(Rat::new(Int::one(), Int::from(m as i64))));
            let cond = EValue::Fractional {
                arg: Box::new(shifted),
                coeffs: vec![EValue::zero(), EValue::one()],
            };
            acc.eadd(&EValue::Relation {
                cond: Box::new(cond),
                if_zero: Box::new(piece),
                otherwise: None,
            });
        }
        *self = acc;
    }

    /// Push relation guards wrapping a partition into the partition's piece
    /// values, so that partition-level addition sees the pieces' domains.
    pub fn distribute_into_partition(&mut self) {
        if let EValue::Relation {
            cond,
            if_zero,
            otherwise: None,
        } = self
        {
            if_zero.distribute_into_partition();
            if let EValue::Partition { pieces } = &mut **if_zero {
                let pieces = std::mem::take(pieces);
                let pieces = pieces
                    .into_iter()
                    .map(|(d, v)| {
                        (
                            d,
                            EValue::Relation {
                                cond: cond.clone(),
                                if_zero: Box::new(v),
                                otherwise: None,
                            },
                        )
                    })
                    .collect();
                *self = EValue::Partition { pieces };
            }
        }
    }

    /// Fold the tree into an explicit periodic node over `x_var mod m`: entry
    /// `r` is this value rewritten under `x_var ≡ r (mod m)`.
    pub fn periodic_fold(&self, var: usize, m: usize) -> EValue {
        debug_assert!(m > 0);
        let values = (0..m)
            .map(|r| {
                let mut v = self.clone();
                v.residue_reduce(var, m, &Int::from(r as i64));
                v.reduce();
                v
            })
            .collect();
        EValue::Periodic { var, values }
    }

    /// Rewrite the tree under the assumption `x_var ≡ r (mod m)`: fractional
    /// parts whose `var`-coefficient times `m` is integral lose their `var`
    /// dependence, and periodic nodes with period dividing `m` settle on one
    /// entry.
    fn residue_reduce(&mut self, var: usize, m: usize, r: &Int) {
        match self {
            EValue::Rational(_) => {}
            EValue::Fractional { arg, coeffs } => {
                arg.residue_reduce(var, m, r);
                for c in coeffs.iter_mut() {
                    c.residue_reduce(var, m, r);
                }
                if let Some((aff, cst)) = as_affine(arg) {
                    let alpha = aff.get(var).cloned().unwrap_or_else(Rat::zero);
                    let step = &alpha * Rat::from_integer(Int::from(m as i64));
                    if !alpha.is_zero() && step.is_integer() {
                        // {α x + rest} is constant in x on the class:
                        // x = m t + r drops the integer multiple α m t.
                        let mut new_aff = aff.clone();
                        new_aff[var] = Rat::zero();
                        let new_cst = cst + alpha * Rat::from_integer(r.clone());
                        let new_arg = EValue::from_affine(&new_aff, &new_cst);
                        *arg = Box::new(new_arg);
                    }
                }
            }
            EValue::Periodic { var: v, values } if *v == var && m % values.len() == 0 => {
                let idx = modulo(r, &Int::from(values.len() as i64));
                let idx = usize::try_from(u64::try_from(idx).unwrap_or(0)).unwrap_or(0);
                let mut chosen = values[idx].clone();
                chosen.residue_reduce(var, m, r);
                *self = chosen;
            }
            EValue::Periodic { values, .. } => {
                for v in values.iter_mut() {
                    v.residue_reduce(var, m, r);
                }
            }
            EValue::Polynomial { coeffs, .. } => {
                for c in coeffs.iter_mut() {
                    c.residue_reduce(var, m, r);
                }
            }
            EValue::Flooring { arg, coeffs } => {
                arg.residue_reduce(var, m, r);
                for c in coeffs.iter_mut() {
                    c.residue_reduce(var, m, r);
                }
            }
            EValue::Relation {
                cond,
                if_zero,
                otherwise,
            } => {
                cond.residue_reduce(var, m, r);
                if_zero.residue_reduce(var, m, r);
                if let Some(o) = otherwise {
                    o.residue_reduce(var, m, r);
                }
            }
            EValue::Partition { pieces } => {
                for (_, v) in pieces.iter_mut() {
                    v.residue_reduce(var, m, r);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Exact value at an integer parameter point.
    pub fn eval(&self, params: &[Int]) -> Rat {
        match self {
            EValue::Rational(r) => r.clone(),
            EValue::Polynomial { var, coeffs } => {
                let x = Rat::from_integer(params[*var].clone());
                horner(coeffs, &x, params)
            }
            EValue::Periodic { var, values } => {
                let idx = modulo(&params[*var], &Int::from(values.len() as i64));
                let idx: usize = usize::try_from(u64::try_from(idx.clone()).unwrap_or(0))
                    .unwrap_or(0);
                values[idx].eval(params)
            }
            EValue::Fractional { arg, coeffs } => {
                let x = rat_fract(&arg.eval(params));
                horner(coeffs, &x, params)
            }
            EValue::Flooring { arg, coeffs } => {
                let x = Rat::from_integer(rat_floor(&arg.eval(params)));
                horner(coeffs, &x, params)
            }
            EValue::Relation {
                cond,
                if_zero,
                otherwise,
            } => {
                if cond.eval(params).is_zero() {
                    if_zero.eval(params)
                } else {
                    otherwise
                        .as_ref()
                        .map(|o| o.eval(params))
                        .unwrap_or_else(Rat::zero)
                }
            }
            EValue::Partition { pieces } => pieces
                .iter()
                .find(|(d, _)| d.contains_int(params))
                .map(|(_, v)| v.eval(params))
                .unwrap_or_else(Rat::zero),
        }
    }
}

fn reduce_owned(e: EValue) -> EValue {
    match e {
        EValue::Rational(r) => EValue::Rational(r),
        EValue::Polynomial { var, mut coeffs } => {
            for c in coeffs.iter_mut() {
                c.reduce();
            }
            while coeffs.len() > 1 && coeffs.last().is_some_and(EValue::is_zero) {
                coeffs.pop();
            }
            if coeffs.len() == 1 {
                coeffs.pop().expect("single coefficient")
            } else if coeffs.is_empty() {
                EValue::zero()
            } else {
                EValue::Polynomial { var, coeffs }
            }
        }
        EValue::Fractional { mut arg, mut coeffs } => {
            arg.reduce();
            for c in coeffs.iter_mut() {
                c.reduce();
            }
            while coeffs.len() > 1 && coeffs.last().is_some_and(EValue::is_zero) {
                coeffs.pop();
            }
            if let EValue::Rational(r) = &*arg {
                let base = EValue::Rational(rat_fract(r));
                let mut out = poly_of(&coeffs, &base);
                out.reduce();
                out
            } else if coeffs.len() == 1 {
                coeffs.pop().expect("single coefficient")
            } else {
                EValue::Fractional { arg, coeffs }
            }
        }
        EValue::Flooring { mut arg, mut coeffs } => {
            arg.reduce();
            for c in coeffs.iter_mut() {
                c.reduce();
            }
            while coeffs.len() > 1 && coeffs.last().is_some_and(EValue::is_zero) {
                coeffs.pop();
            }
            if let EValue::Rational(r) = &*arg {
                let base = EValue::Rational(Rat::from_integer(rat_floor(r)));
                let mut out = poly_of(&coeffs, &base);
                out.reduce();
                out
            } else if coeffs.len() == 1 {
                coeffs.pop().expect("single coefficient")
            } else {
                EValue::Flooring { arg, coeffs }
            }
        }
        EValue::Periodic { var, mut values } => {
            for v in values.iter_mut() {
                v.reduce();
            }
            if values
                .iter()
                .all(|v| v.as_rational().is_some() && args_equal(v, &values[0]))
            {
                values.swap_remove(0)
            } else {
                EValue::Periodic { var, values }
            }
        }
        EValue::Relation {
            mut cond,
            mut if_zero,
            otherwise,
        } => {
            cond.reduce();
            if_zero.reduce();
            let mut otherwise = otherwise.map(|mut o| {
                o.reduce();
                o
            });
            if otherwise.as_ref().is_some_and(|o| o.is_zero()) {
                otherwise = None;
            }
            if let EValue::Rational(r) = &*cond {
                if r.is_zero() {
                    *if_zero
                } else {
                    otherwise.map(|o| *o).unwrap_or_else(EValue::zero)
                }
            } else if if_zero.is_zero() && otherwise.is_none() {
                EValue::zero()
            } else {
                EValue::Relation {
                    cond,
                    if_zero,
                    otherwise,
                }
            }
        }
        EValue::Partition { mut pieces } => {
            for (_, v) in pieces.iter_mut() {
                v.reduce();
            }
            pieces.retain(|(d, v)| !v.is_zero() && !d.is_empty());
            merge_rejoinable(&mut pieces);
            EValue::Partition { pieces }
        }
    }
}

fn horner(coeffs: &[EValue], x: &Rat, params: &[Int]) -> Rat {
    let mut acc = Rat::zero();
    for c in coeffs.iter().rev() {
        acc = acc * x + c.eval(params);
    }
    acc
}

/// Evaluate `Σ coeffs[i] · at^i` symbolically.
pub fn poly_of(coeffs: &[EValue], at: &EValue) -> EValue {
    let mut acc = EValue::zero();
    for c in coeffs.iter().rev() {
        acc.emul(at);
        acc.eadd(c);
    }
    acc
}

/// Evaluate a rational-coefficient polynomial at an evalue (constant first).
pub fn rat_poly_of(coeffs: &[Rat], at: &EValue) -> EValue {
    let wrapped: Vec<EValue> = coeffs
        .iter()
        .map(|c| EValue::Rational(c.clone()))
        .collect();
    poly_of(&wrapped, at)
}

fn convolve(a: &[EValue], b: &[EValue]) -> Vec<EValue> {
    let mut out = vec![EValue::zero(); a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        if x.is_zero() {
            continue;
        }
        for (j, y) in b.iter().enumerate() {
            let mut t = x.clone();
            t.emul(y);
            out[i + j].eadd(&t);
        }
    }
    out
}

fn rank(e: &EValue) -> u8 {
    match e {
        EValue::Rational(_) => 0,
        EValue::Fractional { .. } => 1,
        EValue::Flooring { .. } => 2,
        EValue::Polynomial { .. } => 3,
        EValue::Periodic { .. } => 4,
        EValue::Relation { .. } => 5,
        EValue::Partition { .. } => 6,
    }
}

/// Structural equality for partition-free trees (used to match the
/// arguments of fractional and flooring nodes).
fn args_equal(a: &EValue, b: &EValue) -> bool {
    match (a, b) {
        (EValue::Rational(x), EValue::Rational(y)) => x == y,
        (
            EValue::Polynomial { var: v1, coeffs: c1 },
            EValue::Polynomial { var: v2, coeffs: c2 },
        ) => v1 == v2 && c1.len() == c2.len() && c1.iter().zip(c2).all(|(x, y)| args_equal(x, y)),
        (
            EValue::Periodic { var: v1, values: c1 },
            EValue::Periodic { var: v2, values: c2 },
        ) => v1 == v2 && c1.len() == c2.len() && c1.iter().zip(c2).all(|(x, y)| args_equal(x, y)),
        (
            EValue::Fractional { arg: a1, coeffs: c1 },
            EValue::Fractional { arg: a2, coeffs: c2 },
        )
        | (
            EValue::Flooring { arg: a1, coeffs: c1 },
            EValue::Flooring { arg: a2, coeffs: c2 },
        ) => {
            args_equal(a1, a2)
                && c1.len() == c2.len()
                && c1.iter().zip(c2).all(|(x, y)| args_equal(x, y))
        }
        _ => false,
    }
}

/// View a partition-free tree as an affine form over the parameters:
/// returns per-variable rational coefficients and the constant.
pub fn as_affine(e: &EValue) -> Option<(Vec<Rat>, Rat)> {
    fn go(e: &EValue, coeffs: &mut Vec<Rat>, cst: &mut Rat, scale: &Rat) -> bool {
        match e {
            EValue::Rational(r) => {
                *cst += r * scale;
                true
            }
            EValue::Polynomial { var, coeffs: c } => {
                if c.len() > 2 {
                    return false;
                }
                if let Some(c0) = c.first() {
                    if !go(c0, coeffs, cst, scale) {
                        return false;
                    }
                }
                if let Some(c1) = c.get(1) {
                    let EValue::Rational(r) = c1 else {
                        return false;
                    };
                    if coeffs.len() <= *var {
                        coeffs.resize(*var + 1, Rat::zero());
                    }
                    coeffs[*var] += r * scale;
                }
                true
            }
            _ => false,
        }
    }
    let mut coeffs = Vec::new();
    let mut cst = Rat::zero();
    if go(e, &mut coeffs, &mut cst, &Rat::one()) {
        Some((coeffs, cst))
    } else {
        None
    }
}

// ============================================================================
// Partition plumbing
// ============================================================================

/// Combine two disjoint-piece lists: intersections get `a ⊕ b` (or `a·b`
/// when `add` is false); the remainders keep their own value (addition) or
/// vanish (multiplication).
fn combine_partitions(
    a: &[(Polyhedron, EValue)],
    b: &[(Polyhedron, EValue)],
    add: bool,
) -> Vec<(Polyhedron, EValue)> {
    let mut out: Vec<(Polyhedron, EValue)> = Vec::new();
    for (da, va) in a {
        // Pieces of `a` carved by every piece of `b`.
        let mut rest = vec![da.clone()];
        for (db, vb) in b {
            let mut next_rest = Vec::new();
            for r in rest {
                let both = r.intersect(db).expect("same parameter space");
                if !both.is_empty() {
                    let mut v = va.clone();
                    if add {
                        v.eadd(vb);
                    } else {
                        v.emul(vb);
                    }
                    out.push((both, v));
                }
                next_rest.extend(carve_out(&r, db));
            }
            rest = next_rest;
        }
        if add {
            for r in rest {
                out.push((r, va.clone()));
            }
        }
    }
    if add {
        // Parts of `b` outside every piece of `a`.
        for (db, vb) in b {
            let mut rest = vec![db.clone()];
            for (da, _) in a {
                let mut next_rest = Vec::new();
                for r in rest {
                    next_rest.extend(carve_out(&r, da));
                }
                rest = next_rest;
            }
            for r in rest {
                out.push((r, vb.clone()));
            }
        }
    }
    out.retain(|(d, v)| !d.is_empty() && !v.is_zero());
    out
}

/// The integer points of `x` outside `cut`, as disjoint polyhedra obtained
/// by complementing the constraints of `cut` one at a time. An equality
/// constraint contributes both strict sides.
fn carve_out(x: &Polyhedron, cut: &Polyhedron) -> Vec<Polyhedron> {
    use crate::polyhedron::{ConKind, Constraint};
    let mut out = Vec::new();
    let mut carved = x.clone();
    for c in cut.constraints() {
        match c.kind {
            ConKind::Inequality => {
                let Ok((pos, neg)) = carved.split(&c.coeffs, &c.cst) else {
                    continue;
                };
                if !neg.is_empty() {
                    out.push(neg);
                }
                carved = pos;
            }
            ConKind::Equality => {
                let above = carved.with_constraint(Constraint::ineq(
                    c.coeffs.clone(),
                    &c.cst - Int::one(),
                ));
                let below = carved.with_constraint(Constraint::ineq(
                    c.coeffs.iter().map(|v| -v.clone()).collect(),
                    -&c.cst - Int::one(),
                ));
                if let Ok(p) = above {
                    if !p.is_empty() {
                        out.push(p);
                    }
                }
                if let Ok(p) = below {
                    if !p.is_empty() {
                        out.push(p);
                    }
                }
                let Ok(on) = carved.with_constraint(c.clone()) else {
                    continue;
                };
                carved = on;
            }
        }
        if carved.is_empty() {
            break;
        }
    }
    out
}

/// Rejoin piece pairs with identical values whose domains differ in exactly
/// one complementary facet pair (the shape produced by [`carve_out`]).
fn merge_rejoinable(pieces: &mut Vec<(Polyhedron, EValue)>) {
    use crate::polyhedron::{ConKind, Constraint};
    let mut i = 0;
    while i < pieces.len() {
        let mut merged = false;
        for j in i + 1..pieces.len() {
            if !values_equal(&pieces[i].1, &pieces[j].1) {
                continue;
            }
            let di = pieces[i].0.constraints();
            let dj = pieces[j].0.constraints();
            if di.len() != dj.len() {
                continue;
            }
            let extra_i: Vec<&Constraint> = di.iter().filter(|c| !dj.contains(c)).collect();
            let extra_j: Vec<&Constraint> = dj.iter().filter(|c| !di.contains(c)).collect();
            if extra_i.len() != 1 || extra_j.len() != 1 {
                continue;
            }
            let (a, b) = (extra_i[0], extra_j[0]);
            if a.kind != ConKind::Inequality || b.kind != ConKind::Inequality {
                continue;
            }
            let complement = a
                .coeffs
                .iter()
                .zip(&b.coeffs)
                .all(|(x, y)| *x == -y.clone())
                && a.cst == -b.cst.clone() - Int::one();
            if !complement {
                continue;
            }
            let shared: Vec<Constraint> =
                di.iter().filter(|c| dj.contains(c)).cloned().collect();
            let dim = pieces[i].0.dim();
            if let Ok(joined) = Polyhedron::from_constraints(dim, shared) {
                let value = pieces[i].1.clone();
                pieces[j] = (joined, value);
                pieces.remove(i);
                merged = true;
                break;
            }
        }
        if !merged {
            i += 1;
        }
    }
}

fn values_equal(a: &EValue, b: &EValue) -> bool {
    args_equal(a, b)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyhedron::Constraint;

    fn int(v: i64) -> Int {
        Int::from(v)
    }

    fn rat(n: i64, d: i64) -> Rat {
        Rat::new(int(n), int(d))
    }

    /// 1/4 n^4 + 1/2 n^3 + 1/4 n^2 in variable 0.
    fn quartic() -> EValue {
        EValue::Polynomial {
            var: 0,
            coeffs: vec![
                EValue::zero(),
                EValue::zero(),
                EValue::Rational(rat(1, 4)),
                EValue::Rational(rat(1, 2)),
                EValue::Rational(rat(1, 4)),
            ],
        }
    }

    #[test]
    fn negate_add_reduce_cancels() {
        let mut a = quartic();
        let b = quartic();
        a.negate();
        a.eadd(&b);
        a.reduce();
        assert!(a.is_zero());
    }

    #[test]
    fn evaluation_of_quartic() {
        let q = quartic();
        // n = 3: 81/4 + 27/2 + 9/4 = 36
        assert_eq!(q.eval(&[int(3)]), rat(36, 1));
    }

    #[test]
    fn periodic_selection_and_addition() {
        let p = EValue::Periodic {
            var: 0,
            values: vec![EValue::Rational(rat(1, 1)), EValue::Rational(rat(5, 1))],
        };
        assert_eq!(p.eval(&[int(4)]), rat(1, 1));
        assert_eq!(p.eval(&[int(7)]), rat(5, 1));
        assert_eq!(p.eval(&[int(-1)]), rat(5, 1));
        // Adding periodics of different period expands to the lcm.
        let mut a = p.clone();
        let b = EValue::Periodic {
            var: 0,
            values: vec![
                EValue::Rational(rat(0, 1)),
                EValue::Rational(rat(1, 1)),
                EValue::Rational(rat(2, 1)),
            ],
        };
        a.eadd(&b);
        for n in 0..12i64 {
            let expect = p.eval(&[int(n)]) + b.eval(&[int(n)]);
            assert_eq!(a.eval(&[int(n)]), expect);
        }
    }

    #[test]
    fn fractional_evaluation_and_fold() {
        // 7·{(n + 3)/4}
        let arg = EValue::Polynomial {
            var: 0,
            coeffs: vec![EValue::Rational(rat(3, 4)), EValue::Rational(rat(1, 4))],
        };
        let f = EValue::Fractional {
            arg: Box::new(arg),
            coeffs: vec![EValue::zero(), EValue::Rational(rat(7, 1))],
        };
        assert_eq!(f.eval(&[int(1)]), rat(0, 1));
        assert_eq!(f.eval(&[int(2)]), rat(7, 4));
        assert_eq!(f.eval(&[int(3)]), rat(7, 2));
        // frac2floor preserves every value.
        let mut g = f.clone();
        g.frac2floor();
        for n in -5..10i64 {
            assert_eq!(g.eval(&[int(n)]), f.eval(&[int(n)]), "n = {n}");
        }
    }

    #[test]
    fn multiplication_matches_pointwise() {
        let a = quartic();
        let b = EValue::Polynomial {
            var: 0,
            coeffs: vec![EValue::Rational(rat(1, 1)), EValue::Rational(rat(2, 1))],
        };
        let mut prod = a.clone();
        prod.emul(&b);
        for n in -4..6i64 {
            assert_eq!(prod.eval(&[int(n)]), a.eval(&[int(n)]) * b.eval(&[int(n)]));
        }
    }

    #[test]
    fn substitution_folds_polynomials() {
        // (x0)^2 with x0 := x1 + 1 becomes (x1 + 1)^2.
        let mut sq = EValue::Polynomial {
            var: 0,
            coeffs: vec![EValue::zero(), EValue::zero(), EValue::one()],
        };
        let repl = EValue::Polynomial {
            var: 1,
            coeffs: vec![EValue::one(), EValue::one()],
        };
        sq.substitute(0, &repl);
        for n in -3..4i64 {
            assert_eq!(sq.eval(&[int(0), int(n)]), rat((n + 1) * (n + 1), 1));
        }
    }

    #[test]
    fn relation_branches() {
        let cond = EValue::Fractional {
            arg: Box::new(EValue::Polynomial {
                var: 0,
                coeffs: vec![EValue::zero(), EValue::Rational(rat(1, 2))],
            }),
            coeffs: vec![EValue::zero(), EValue::one()],
        };
        let r = EValue::Relation {
            cond: Box::new(cond),
            if_zero: Box::new(EValue::one()),
            otherwise: None,
        };
        assert_eq!(r.eval(&[int(4)]), rat(1, 1));
        assert_eq!(r.eval(&[int(3)]), rat(0, 1));
    }

    #[test]
    fn partition_addition_refines_domains() {
        let seg = |a: i64, b: i64| {
            Polyhedron::from_constraints(
                1,
                vec![
                    Constraint::ineq(vec![int(1)], int(-a)),
                    Constraint::ineq(vec![int(-1)], int(b)),
                ],
            )
            .unwrap()
        };
        let p1 = EValue::Partition {
            pieces: vec![(seg(0, 5), EValue::Rational(rat(1, 1)))],
        };
        let mut p2 = EValue::Partition {
            pieces: vec![(seg(3, 8), EValue::Rational(rat(10, 1)))],
        };
        p2.eadd(&p1);
        for n in -1..10i64 {
            let expect = if (3..=5).contains(&n) {
                rat(11, 1)
            } else if (0..=2).contains(&n) {
                rat(1, 1)
            } else if (6..=8).contains(&n) {
                rat(10, 1)
            } else {
                rat(0, 1)
            };
            assert_eq!(p2.eval(&[int(n)]), expect, "n = {n}");
        }
    }

    #[test]
    fn reduce_in_domain_drops_settled_fractionals() {
        // {n/7} over 1 ≤ n ≤ 6 has constant quotient 0, so it collapses to
        // the affine n/7.
        let seg = Polyhedron::from_constraints(
            1,
            vec![
                Constraint::ineq(vec![int(1)], int(-1)),
                Constraint::ineq(vec![int(-1)], int(6)),
            ],
        )
        .unwrap();
        let mut f = EValue::Fractional {
            arg: Box::new(EValue::Polynomial {
                var: 0,
                coeffs: vec![EValue::zero(), EValue::Rational(rat(1, 7))],
            }),
            coeffs: vec![EValue::zero(), EValue::Rational(rat(7, 1))],
        };
        f.reduce_in_domain(&seg);
        assert!(
            matches!(f, EValue::Polynomial { .. }),
            "fractional should collapse to an affine polynomial"
        );
        for n in 1..=6i64 {
            assert_eq!(f.eval(&[int(n)]), rat(n, 1));
        }
    }

    #[test]
    fn split_periods_produces_residue_relations() {
        // {n/2} splits into residue classes mod 2 with polynomial leaves.
        let mut f = EValue::Fractional {
            arg: Box::new(EValue::Polynomial {
                var: 0,
                coeffs: vec![EValue::zero(), EValue::Rational(rat(1, 2))],
            }),
            coeffs: vec![EValue::zero(), EValue::Rational(rat(2, 1))],
        };
        let orig = f.clone();
        f.split_periods(0, 2);
        for n in -4..6i64 {
            assert_eq!(f.eval(&[int(n)]), orig.eval(&[int(n)]), "n = {n}");
        }
    }
}
