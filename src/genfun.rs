//! Multivariate rational generating functions
//!
//! A [`GenFun`] is a sum of terms `Σ_j c_j x^{n_j} / Π_r (1 − x^{ρ_r})`,
//! stored as a map keyed by the canonicalized denominator factor list. On
//! insertion every factor row is flipped to have a positive leading non-zero
//! entry — the identity `1/(1−x^ρ) = −x^{−ρ}/(1−x^{−ρ})` absorbs the sign
//! into the coefficient and shifts the numerator, so the represented
//! function never changes — then the rows are sorted lexicographically.
//! No two stored terms share a denominator; within a term, numerator
//! monomials with equal exponents coalesce and cancel exactly.
//!
//! Specialization at a concrete parameter point goes through counting: the
//! coefficient of `x^v` in `x^n/Π(1−x^{ρ_r})` is the number of non-negative
//! integer combinations `k` with `n + Σ k_r ρ_r = v`, a small lattice-point
//! count handed back to the scalar counter.

use std::collections::BTreeMap;

use num::{Signed, Zero};

use crate::options::Options;
use crate::polyhedron::{Constraint, Polyhedron};
use crate::{CoreError, Int, Rat};

/// One term: coalesced numerator monomials over a fixed denominator.
#[derive(Clone, Debug, Default)]
pub struct Term {
    numer: BTreeMap<Vec<Int>, Rat>,
}

impl Term {
    /// Numerator monomials as `(coefficient, power)` pairs.
    pub fn monomials(&self) -> impl Iterator<Item = (&Vec<Int>, &Rat)> {
        self.numer.iter()
    }
}

/// A multivariate rational generating function over `nparam` variables.
#[derive(Clone, Debug)]
pub struct GenFun {
    nparam: usize,
    terms: BTreeMap<Vec<Vec<Int>>, Term>,
}

impl GenFun {
    /// Empty (zero) function over `nparam` variables.
    pub fn new(nparam: usize) -> Self {
        Self {
            nparam,
            terms: BTreeMap::new(),
        }
    }

    /// Number of variables.
    pub fn nparam(&self) -> usize {
        self.nparam
    }

    /// Number of distinct denominators.
    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    /// Iterate `(denominator rows, term)` pairs.
    pub fn terms(&self) -> impl Iterator<Item = (&Vec<Vec<Int>>, &Term)> {
        self.terms.iter()
    }

    /// Whether the function is identically zero.
    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// Add `c · x^num / Π_r (1 − x^{den[r]})`.
    pub fn add(&mut self, c: &Rat, num: &[Int], den: &[Vec<Int>]) {
        if c.is_zero() {
            return;
        }
        debug_assert_eq!(num.len(), self.nparam);
        debug_assert!(den.iter().all(|row| row.len() == self.nparam));
        let mut c = c.clone();
        let mut num = num.to_vec();
        let mut rows: Vec<Vec<Int>> = Vec::with_capacity(den.len());
        for row in den {
            debug_assert!(
                row.iter().any(|x| !x.is_zero()),
                "zero denominator factor"
            );
            let lead = row.iter().find(|x| !x.is_zero());
            if lead.is_some_and(Signed::is_negative) {
                // 1/(1−x^ρ) = −x^{−ρ}/(1−x^{−ρ})
                c = -c;
                for (n, r) in num.iter_mut().zip(row) {
                    *n -= r;
                }
                rows.push(row.iter().map(|x| -x.clone()).collect());
            } else {
                rows.push(row.clone());
            }
        }
        rows.sort();
        let key = rows;
        let term = self.terms.entry(key.clone()).or_default();
        let entry = term.numer.entry(num).or_insert_with(Rat::zero);
        *entry += c;
        let cancelled = entry.is_zero();
        if cancelled {
            term.numer.retain(|_, v| !v.is_zero());
            let empty = term.numer.is_empty();
            if empty {
                self.terms.remove(&key);
            }
        }
    }

    /// Add `c` times another generating function.
    pub fn add_scaled(&mut self, c: &Rat, other: &GenFun) {
        debug_assert_eq!(self.nparam, other.nparam);
        for (den, term) in &other.terms {
            for (num, tc) in &term.numer {
                let scaled = c * tc;
                self.add(&scaled, num, den);
            }
        }
    }

    /// Coefficient of `x^point`, computed by counting the non-negative
    /// integer solutions of `num + k·den = point` term by term.
    pub fn coefficient(&self, point: &[Int], opts: &Options) -> Result<Rat, CoreError> {
        debug_assert_eq!(point.len(), self.nparam);
        let mut total = Rat::zero();
        for (den, term) in &self.terms {
            for (num, c) in &term.numer {
                let nrows = den.len();
                let mut cons: Vec<Constraint> = (0..nrows)
                    .map(|r| {
                        let mut coeffs = vec![Int::zero(); nrows];
                        coeffs[r] = Int::from(1);
                        Constraint::ineq(coeffs, Int::zero())
                    })
                    .collect();
                for j in 0..self.nparam {
                    let coeffs: Vec<Int> = den.iter().map(|row| row[j].clone()).collect();
                    cons.push(Constraint::eq(coeffs, &num[j] - &point[j]));
                }
                let knapsack = Polyhedron::from_constraints(nrows, cons)?;
                let ways = crate::counter::count(&knapsack, opts)?;
                if !ways.is_zero() {
                    total += c * Rat::from_integer(ways);
                }
            }
        }
        Ok(total)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use num::One;

    fn int(v: i64) -> Int {
        Int::from(v)
    }

    fn ints(v: &[i64]) -> Vec<Int> {
        v.iter().map(|&x| int(x)).collect()
    }

    fn rat(n: i64, d: i64) -> Rat {
        Rat::new(int(n), int(d))
    }

    #[test]
    fn canonicalization_merges_flipped_denominators() {
        // 1/(1−x) fed directly and as −x^{-1}/(1−x^{-1}) is the same
        // function; both inserts must coalesce into one monomial.
        let mut g = GenFun::new(1);
        g.add(&rat(1, 1), &ints(&[0]), &[ints(&[1])]);
        g.add(&rat(-1, 1), &ints(&[-1]), &[ints(&[-1])]);
        assert_eq!(g.n_terms(), 1);
        let (den, term) = g.terms().next().unwrap();
        assert_eq!(den, &vec![ints(&[1])]);
        let monos: Vec<(Vec<Int>, Rat)> = term
            .monomials()
            .map(|(p, c)| (p.clone(), c.clone()))
            .collect();
        assert_eq!(monos, vec![(ints(&[0]), rat(2, 1))]);
    }

    #[test]
    fn addition_is_order_independent() {
        let entries: Vec<(Rat, Vec<Int>, Vec<Vec<Int>>)> = vec![
            (rat(1, 2), ints(&[1, 0]), vec![ints(&[1, 0]), ints(&[0, 1])]),
            (rat(3, 1), ints(&[0, 2]), vec![ints(&[0, 1]), ints(&[1, 0])]),
            (rat(-1, 2), ints(&[1, 0]), vec![ints(&[1, 0]), ints(&[0, 1])]),
            (rat(5, 1), ints(&[2, 2]), vec![ints(&[-1, 2])]),
        ];
        let mut fwd = GenFun::new(2);
        for (c, n, d) in &entries {
            fwd.add(c, n, d);
        }
        let mut rev = GenFun::new(2);
        for (c, n, d) in entries.iter().rev() {
            rev.add(c, n, d);
        }
        let collect = |g: &GenFun| {
            g.terms()
                .map(|(den, t)| {
                    (
                        den.clone(),
                        t.monomials()
                            .map(|(p, c)| (p.clone(), c.clone()))
                            .collect::<Vec<_>>(),
                    )
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(collect(&fwd), collect(&rev));
    }

    #[test]
    fn exact_cancellation_removes_monomials() {
        let mut g = GenFun::new(1);
        let den = vec![ints(&[2])];
        g.add(&rat(7, 3), &ints(&[4]), &den);
        assert_eq!(g.n_terms(), 1);
        g.add(&rat(-7, 3), &ints(&[4]), &den);
        assert!(g.is_zero(), "adding the negation must erase the monomial");
    }

    #[test]
    fn coefficient_of_geometric_series() {
        // 1/(1−x): coefficient 1 at every x^k, k ≥ 0.
        let mut g = GenFun::new(1);
        g.add(&Rat::one(), &ints(&[0]), &[ints(&[1])]);
        let opts = Options::default();
        assert_eq!(g.coefficient(&ints(&[0]), &opts).unwrap(), rat(1, 1));
        assert_eq!(g.coefficient(&ints(&[5]), &opts).unwrap(), rat(1, 1));
        // 1/(1−x)^2: coefficient k+1 at x^k.
        let mut g2 = GenFun::new(1);
        g2.add(&Rat::one(), &ints(&[0]), &[ints(&[1]), ints(&[1])]);
        assert_eq!(g2.coefficient(&ints(&[3]), &opts).unwrap(), rat(4, 1));
    }
}
