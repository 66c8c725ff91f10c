//! Truncated power-series engine
//!
//! [`DPoly`] is a polynomial in one formal variable `t` truncated modulo
//! `t^{d+1}`, with the two constructor shapes the counting engine needs: the
//! numerator expansion `(1+t)^n` (coefficients `C(n, k)` by the incremental
//! recurrence `c_k = c_{k-1}·(n-k+1)/k`) and the denominator factor
//! `((1+t)^w - 1)/t` (the same recurrence with offset 1, constant term `w`).
//!
//! [`DPolyR`] is the multivariate variant used when denominator factors keep
//! parameter directions: every `t^i` coefficient is a sparse map from integer
//! parameter power-vectors to numerators over one shared denominator.
//!
//! [`quotient_in_degree`] is the symbolic-numerator form: the `t^d` quotient
//! coefficient as a polynomial in a formal exponent `n`, used by the
//! parametric enumerator to substitute a quasi-polynomial for `n`.

use std::collections::BTreeMap;

use num::{One, Zero};

use crate::{Int, Rat};

/// Univariate truncated polynomial: `coeff[k]` is the coefficient of `t^k`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DPoly {
    coeff: Vec<Int>,
}

impl DPoly {
    /// Expansion of `(1+t)^degree` modulo `t^{d+1}`. With a non-zero
    /// `offset`, the coefficients for `k = offset..` land at indices
    /// `k - offset` (the leading `offset` coefficients are dropped).
    pub fn new(d: usize, degree: &Int, offset: usize) -> Self {
        let mut coeff = vec![Int::zero(); d + 1];
        let mut c = Int::one();
        if offset == 0 {
            coeff[0] = c.clone();
        }
        for k in 1..=d + offset {
            c = c * (degree - Int::from(k as i64) + Int::one());
            // Binomial prefixes divide exactly.
            c = c / Int::from(k as i64);
            if k >= offset && k - offset <= d {
                coeff[k - offset] = c.clone();
            }
        }
        Self { coeff }
    }

    /// Denominator factor `((1+t)^w - 1)/t` with constant term `w`.
    pub fn factor(d: usize, w: &Int) -> Self {
        Self::new(d, w, 1)
    }

    /// Wrap raw coefficients (constant first).
    pub fn from_coeffs(coeff: Vec<Int>) -> Self {
        debug_assert!(!coeff.is_empty());
        Self { coeff }
    }

    /// Truncation length `d + 1`.
    pub fn len(&self) -> usize {
        self.coeff.len()
    }

    /// Whether the coefficient vector is empty (never true for a
    /// constructed polynomial; paired with [`DPoly::len`]).
    pub fn is_empty(&self) -> bool {
        self.coeff.is_empty()
    }

    /// Coefficient of `t^k`.
    pub fn coeff(&self, k: usize) -> &Int {
        &self.coeff[k]
    }

    /// In-place truncated product.
    pub fn mul_assign(&mut self, f: &DPoly) {
        assert_eq!(self.coeff.len(), f.coeff.len(), "mismatched truncation");
        let old = self.coeff.clone();
        let n = self.coeff.len();
        for k in 0..n {
            self.coeff[k] = &f.coeff[0] * &old[k];
        }
        for i in 1..n {
            if f.coeff[i].is_zero() {
                continue;
            }
            for j in 0..n - i {
                let add = &f.coeff[i] * &old[j];
                self.coeff[i + j] += add;
            }
        }
    }

    /// Full quotient `self / den` modulo `t^{d+1}`; `den` must have a
    /// non-zero constant term.
    pub fn div_all(&self, den: &DPoly) -> Vec<Rat> {
        assert_eq!(self.coeff.len(), den.coeff.len(), "mismatched truncation");
        assert!(!den.coeff[0].is_zero(), "division by zero constant term");
        let n = self.coeff.len();
        let d0 = Rat::from_integer(den.coeff[0].clone());
        let mut q: Vec<Rat> = Vec::with_capacity(n);
        for i in 0..n {
            let mut acc = Rat::from_integer(self.coeff[i].clone());
            for j in 1..=i {
                acc -= Rat::from_integer(den.coeff[j].clone()) * &q[i - j];
            }
            q.push(acc / &d0);
        }
        q
    }

    /// Signed top quotient coefficient: `sign · [t^d](self / den)`, the
    /// per-cone contribution accumulated by the scalar counter.
    pub fn div_top(&self, den: &DPoly, sign: i32) -> Rat {
        let q = self.div_all(den);
        let top = q.into_iter().next_back().expect("non-empty quotient");
        if sign < 0 {
            -top
        } else {
            top
        }
    }
}

/// The `t^d` quotient coefficient of `(1+t)^n / den` as a polynomial in the
/// formal exponent `n`: returns its coefficients, constant first.
///
/// The numerator coefficient of `t^k` is `C(n, k)`, a degree-`k` polynomial
/// in `n`; the division recurrence then runs over `Q[n]`.
pub fn quotient_in_degree(d: usize, den: &DPoly) -> Vec<Rat> {
    assert_eq!(den.len(), d + 1, "mismatched truncation");
    assert!(!den.coeff(0).is_zero(), "division by zero constant term");
    // num[k] = C(n, k) as coefficients in n.
    let mut num: Vec<Vec<Rat>> = Vec::with_capacity(d + 1);
    num.push(vec![Rat::one()]);
    for k in 1..=d {
        let prev = &num[k - 1];
        // C(n, k) = C(n, k-1) · (n - (k-1)) / k
        let shift = Rat::from_integer(Int::from((k - 1) as i64));
        let kk = Rat::from_integer(Int::from(k as i64));
        let mut next = vec![Rat::zero(); prev.len() + 1];
        for (i, c) in prev.iter().enumerate() {
            next[i + 1] += c / &kk;
            next[i] -= c * &shift / &kk;
        }
        num.push(next);
    }
    let d0 = Rat::from_integer(den.coeff(0).clone());
    let mut q: Vec<Vec<Rat>> = Vec::with_capacity(d + 1);
    for i in 0..=d {
        let mut acc = num[i].clone();
        for j in 1..=i {
            if den.coeff(j).is_zero() {
                continue;
            }
            let f = Rat::from_integer(den.coeff(j).clone());
            let other = &q[i - j];
            if acc.len() < other.len() {
                acc.resize(other.len(), Rat::zero());
            }
            for (t, c) in other.iter().enumerate() {
                let sub = c * &f;
                acc[t] -= sub;
            }
        }
        for c in acc.iter_mut() {
            *c /= d0.clone();
        }
        q.push(acc);
    }
    q.pop().expect("top coefficient")
}

// ============================================================================
// DPolyR
// ============================================================================

/// Multivariate truncated polynomial: each `t^i` coefficient is a sparse map
/// from parameter power-vectors to integer numerators, over one shared
/// positive denominator.
#[derive(Clone, Debug)]
pub struct DPolyR {
    coeff: Vec<BTreeMap<Vec<Int>, Int>>,
    denom: Int,
}

impl DPolyR {
    /// Expansion of `(1+t)^degree · x^key` modulo `t^{d+1}`: the plain
    /// binomial coefficients, all seeded with the same parameter key.
    pub fn new_seeded(d: usize, degree: &Int, key: Vec<Int>) -> Self {
        let plain = DPoly::new(d, degree, 0);
        let coeff = (0..=d)
            .map(|i| {
                let mut m = BTreeMap::new();
                if !plain.coeff(i).is_zero() {
                    m.insert(key.clone(), plain.coeff(i).clone());
                }
                m
            })
            .collect();
        Self {
            coeff,
            denom: Int::one(),
        }
    }

    /// Truncation length `d + 1`.
    pub fn len(&self) -> usize {
        self.coeff.len()
    }

    /// Shared denominator.
    pub fn denom(&self) -> &Int {
        &self.denom
    }

    /// Drain the `t^k` coefficient: `(key, numerator)` rows over [`denom`].
    ///
    /// [`denom`]: DPolyR::denom
    pub fn coeff_rows(&self, k: usize) -> impl Iterator<Item = (&Vec<Int>, &Int)> {
        self.coeff[k].iter()
    }

    /// Multiply by the single keyed `t`-monomial `c · t^power · x^key`.
    pub fn mul_keyed_monomial(&mut self, c: &Int, power: usize, key: &[Int]) {
        let n = self.coeff.len();
        let mut out: Vec<BTreeMap<Vec<Int>, Int>> = vec![BTreeMap::new(); n];
        for (i, m) in self.coeff.iter().enumerate() {
            if i + power >= n {
                break;
            }
            for (k, v) in m {
                let nk: Vec<Int> = k.iter().zip(key).map(|(a, b)| a + b).collect();
                let entry = out[i + power].entry(nk).or_insert_with(Int::zero);
                *entry += c * v;
            }
        }
        self.coeff = out;
        self.prune();
    }

    /// Multiply by a keyed truncated polynomial `Σ_p tpoly_p t^p · x^{key}`.
    pub fn mul_keyed_poly(&mut self, tpoly: &[Int], key: &[Int]) {
        let n = self.coeff.len();
        let mut out: Vec<BTreeMap<Vec<Int>, Int>> = vec![BTreeMap::new(); n];
        for (p, c) in tpoly.iter().enumerate() {
            if c.is_zero() {
                continue;
            }
            for (i, m) in self.coeff.iter().enumerate() {
                if i + p >= n {
                    break;
                }
                for (k, v) in m {
                    let nk: Vec<Int> = k.iter().zip(key).map(|(a, b)| a + b).collect();
                    let entry = out[i + p].entry(nk).or_insert_with(Int::zero);
                    *entry += c * v;
                }
            }
        }
        self.coeff = out;
        self.prune();
    }

    /// Multiply by `(1 − x^r)`.
    pub fn mul_one_minus_key(&mut self, r: &[Int]) {
        let mut shifted = self.clone();
        shifted.mul_keyed_monomial(&-Int::one(), 0, r);
        self.add_assign(&shifted);
    }

    /// Add another series (same truncation and denominator scale).
    pub fn add_assign(&mut self, other: &DPolyR) {
        assert_eq!(self.len(), other.len());
        assert_eq!(self.denom, other.denom, "denominator scales must match");
        for (m, om) in self.coeff.iter_mut().zip(&other.coeff) {
            for (k, v) in om {
                let entry = m.entry(k.clone()).or_insert_with(Int::zero);
                *entry += v;
            }
        }
        self.prune();
    }

    /// Divide by a scalar-coefficient denominator with `d_0 ≠ 0`; the result
    /// carries every quotient coefficient over the common denominator
    /// `denom · d_0^{d+1}`.
    pub fn div_scalar(&self, den: &DPoly) -> DPolyR {
        assert_eq!(self.len(), den.len(), "mismatched truncation");
        let d0 = den.coeff(0);
        assert!(!d0.is_zero(), "division by zero constant term");
        let n = self.len();
        // Q_i = q_i · d0^{i+1} stays integral:
        // Q_i = N_i·d0^i − Σ_{j=1..i} d_j·Q_{i−j}·d0^{j−1}.
        let mut qs: Vec<BTreeMap<Vec<Int>, Int>> = Vec::with_capacity(n);
        let mut d0_pows = vec![Int::one(); n + 1];
        for i in 1..=n {
            d0_pows[i] = &d0_pows[i - 1] * d0;
        }
        for i in 0..n {
            let mut acc: BTreeMap<Vec<Int>, Int> = BTreeMap::new();
            for (k, v) in &self.coeff[i] {
                acc.insert(k.clone(), v * &d0_pows[i]);
            }
            for j in 1..=i {
                if den.coeff(j).is_zero() {
                    continue;
                }
                let f = den.coeff(j) * &d0_pows[j - 1];
                for (k, v) in &qs[i - j] {
                    let entry = acc.entry(k.clone()).or_insert_with(Int::zero);
                    *entry -= &f * v;
                }
            }
            qs.push(acc);
        }
        // Rescale every coefficient to the uniform denominator d0^{d+1}.
        let coeff = qs
            .into_iter()
            .enumerate()
            .map(|(i, m)| {
                let scale = d0_pows[n - 1 - i].clone(); // q_i·d0^{i+1} → ·d0^{d-i}
                m.into_iter()
                    .filter(|(_, v)| !v.is_zero())
                    .map(|(k, v)| (k, v * &scale))
                    .collect()
            })
            .collect();
        DPolyR {
            coeff,
            denom: &self.denom * &d0_pows[n],
        }
    }

    fn prune(&mut self) {
        for m in self.coeff.iter_mut() {
            m.retain(|_, v| !v.is_zero());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Int {
        Int::from(v)
    }

    fn rat(n: i64, d: i64) -> Rat {
        Rat::new(int(n), int(d))
    }

    #[test]
    fn binomial_expansions() {
        let n5 = DPoly::new(2, &int(5), 0);
        assert_eq!(
            (0..3).map(|k| n5.coeff(k).clone()).collect::<Vec<_>>(),
            vec![int(1), int(5), int(10)]
        );
        let neg2 = DPoly::new(2, &int(-2), 0);
        assert_eq!(
            (0..3).map(|k| neg2.coeff(k).clone()).collect::<Vec<_>>(),
            vec![int(1), int(-2), int(3)]
        );
        // Small non-negative degrees truncate naturally through the zero
        // factor in the recurrence.
        let n1 = DPoly::new(3, &int(1), 0);
        assert_eq!(
            (0..4).map(|k| n1.coeff(k).clone()).collect::<Vec<_>>(),
            vec![int(1), int(1), int(0), int(0)]
        );
    }

    #[test]
    fn factor_constant_term_is_weight() {
        let f = DPoly::factor(2, &int(1));
        assert_eq!(
            (0..3).map(|k| f.coeff(k).clone()).collect::<Vec<_>>(),
            vec![int(1), int(0), int(0)]
        );
        let f2 = DPoly::factor(2, &int(2));
        assert_eq!(
            (0..3).map(|k| f2.coeff(k).clone()).collect::<Vec<_>>(),
            vec![int(2), int(1), int(0)]
        );
    }

    #[test]
    fn specialization_regression() {
        // The d = 2 anchors: numerator (1+t)^5 over the product of the
        // weight-1 and weight-2 factors contributes 31/8; the running count
        // reaches 6 after the (1+t)^{-2} numerator adds its 17/8.
        let mut den = DPoly::factor(2, &int(1));
        let den2 = DPoly::factor(2, &int(2));
        den.mul_assign(&den2);
        assert_eq!(
            (0..3).map(|k| den.coeff(k).clone()).collect::<Vec<_>>(),
            vec![int(2), int(1), int(0)]
        );
        let n5 = DPoly::new(2, &int(5), 0);
        let mut count = n5.div_top(&den, 1);
        assert_eq!(count, rat(31, 8));
        let neg2 = DPoly::new(2, &int(-2), 0);
        assert_eq!(neg2.div_top(&den, 1), rat(17, 8));
        count += neg2.div_top(&den, 1);
        assert_eq!(count, rat(6, 1));
        // A negative sign subtracts the same contribution.
        assert_eq!(neg2.div_top(&den, -1), rat(-17, 8));
    }

    #[test]
    fn multiplication_is_commutative_and_associative() {
        let a = DPoly::new(4, &int(3), 0);
        let b = DPoly::factor(4, &int(2));
        let c = DPoly::new(4, &int(-1), 0);
        let mut ab = a.clone();
        ab.mul_assign(&b);
        let mut ba = b.clone();
        ba.mul_assign(&a);
        assert_eq!(ab, ba);
        let mut ab_c = ab.clone();
        ab_c.mul_assign(&c);
        let mut bc = b.clone();
        bc.mul_assign(&c);
        let mut a_bc = a.clone();
        a_bc.mul_assign(&bc);
        assert_eq!(ab_c, a_bc);
    }

    #[test]
    fn division_inverts_multiplication() {
        let mut prod = DPoly::new(3, &int(4), 0);
        let den = DPoly::factor(3, &int(3));
        prod.mul_assign(&den);
        let q = prod.div_all(&den);
        let orig = DPoly::new(3, &int(4), 0);
        for (k, qk) in q.iter().enumerate() {
            assert_eq!(*qk, Rat::from_integer(orig.coeff(k).clone()));
        }
    }

    #[test]
    fn symbolic_quotient_matches_numeric() {
        // Evaluating the symbolic t^d coefficient at concrete n must agree
        // with the numeric path.
        let mut den = DPoly::factor(2, &int(1));
        den.mul_assign(&DPoly::factor(2, &int(2)));
        let qpoly = quotient_in_degree(2, &den);
        for n in [-2i64, 0, 1, 5, 9] {
            let nv = rat(n, 1);
            let mut acc = Rat::zero();
            let mut pow = Rat::one();
            for c in &qpoly {
                acc += c * &pow;
                pow *= &nv;
            }
            let numeric = DPoly::new(2, &int(n), 0).div_top(&den, 1);
            assert_eq!(acc, numeric, "mismatch at n = {n}");
        }
    }

    #[test]
    fn dpoly_r_division_scales_denominator() {
        let d = 2usize;
        let seeded = DPolyR::new_seeded(d, &int(5), vec![int(1)]);
        let mut den = DPoly::factor(d, &int(1));
        den.mul_assign(&DPoly::factor(d, &int(2)));
        let q = seeded.div_scalar(&den);
        assert_eq!(*q.denom(), int(8)); // d0 = 2, scale 2^{d+1}
        let rows: Vec<(Vec<Int>, Int)> = q
            .coeff_rows(d)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        // q_2 = 31/8 on the seeded key.
        assert_eq!(rows, vec![(vec![int(1)], int(31))]);
    }

    #[test]
    fn dpoly_r_key_shifts() {
        let d = 2usize;
        let mut s = DPolyR::new_seeded(d, &int(1), vec![int(0)]);
        // Multiply by x^{2}: every key shifts by 2.
        s.mul_keyed_monomial(&int(1), 0, &[int(2)]);
        let rows: Vec<(Vec<Int>, Int)> = s
            .coeff_rows(0)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        assert_eq!(rows, vec![(vec![int(2)], int(1))]);
        // Multiply by t·x^{-1}: degree shifts up, key shifts down.
        s.mul_keyed_monomial(&int(3), 1, &[int(-1)]);
        let rows: Vec<(Vec<Int>, Int)> = s
            .coeff_rows(1)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        assert_eq!(rows, vec![(vec![int(1)], int(3))]);
    }
}
