//! Todd-expansion local counter
//!
//! An alternative scalar evaluator for unimodular vertex cones: with
//! `td(x) = x/(e^x − 1)` and `n = λ·L` (the lattice-point representative of
//! the cone's apex projected by the generic vector), each cone contributes
//!
//! ```text
//! (−1)^d / Π_k w_k · [t^d] ( e^{n t} · Π_k td(w_k t) )        w_k = λ·r_k
//! ```
//!
//! to the running count. The result agrees with the truncated-series
//! quotient path on every input; both sum the same signed rational
//! generating functions at the same specialization point.

use num::{One, Zero};

use crate::arith::dot;
use crate::cone::Cone;
use crate::lattice_point::lattice_point_scalar;
use crate::{CoreError, Int, Rat};

/// Truncated Todd series `td(x) = x/(e^x − 1) mod x^{d+1}` with exact
/// rational coefficients: `1, −1/2, 1/12, 0, −1/720, …`.
#[derive(Clone, Debug)]
pub struct ToddSeries {
    coeffs: Vec<Rat>,
}

impl ToddSeries {
    /// Compute the series up to degree `d` from `x = (e^x − 1)·td(x)`.
    pub fn new(d: usize) -> Self {
        let mut coeffs = vec![Rat::zero(); d + 1];
        coeffs[0] = Rat::one();
        let mut fact = vec![Rat::one(); d + 2];
        for i in 1..=d + 1 {
            fact[i] = &fact[i - 1] * Rat::from_integer(Int::from(i as i64));
        }
        for i in 2..=d + 1 {
            // Σ_{j=0}^{i-1} c_j / (i-j)! = [i == 1]
            let mut acc = Rat::zero();
            for (j, c) in coeffs.iter().enumerate().take(i - 1) {
                acc += c / &fact[i - j];
            }
            coeffs[i - 1] = -acc;
        }
        Self { coeffs }
    }

    /// Coefficient of `x^k`.
    pub fn coeff(&self, k: usize) -> &Rat {
        &self.coeffs[k]
    }

    /// Series of `td(w·t)` in `t`.
    fn scaled(&self, w: &Int) -> Vec<Rat> {
        let mut pow = Rat::one();
        self.coeffs
            .iter()
            .map(|c| {
                let out = c * &pow;
                pow *= Rat::from_integer(w.clone());
                out
            })
            .collect()
    }
}

/// Running Todd-local count over the unimodular cones of a polytope.
#[derive(Clone, Debug)]
pub struct ToddCounter {
    dim: usize,
    lambda: Vec<Int>,
    todd: ToddSeries,
    count: Rat,
}

impl ToddCounter {
    /// Counter for dimension `dim` with the generic vector `lambda`.
    pub fn new(dim: usize, lambda: Vec<Int>) -> Self {
        Self {
            dim,
            lambda,
            todd: ToddSeries::new(dim),
            count: Rat::zero(),
        }
    }

    /// Todd series used by this counter.
    pub fn todd(&self) -> &ToddSeries {
        &self.todd
    }

    /// Current accumulated count.
    pub fn count(&self) -> &Rat {
        &self.count
    }

    /// Accumulate the contribution of one unimodular cone at a rational
    /// apex. `sign` is the signed-decomposition sign of the piece.
    pub fn handle(
        &mut self,
        cone: &Cone,
        vertex: &[Rat],
        sign: i32,
    ) -> Result<(), CoreError> {
        let d = self.dim;
        let n = lattice_point_scalar(cone, vertex, &self.lambda)?;
        // e^{n t} truncated.
        let mut fact = Rat::one();
        let mut npow = Rat::one();
        let n_rat = Rat::from_integer(n);
        let mut prod: Vec<Rat> = (0..=d)
            .map(|i| {
                if i > 0 {
                    fact *= Rat::from_integer(Int::from(i as i64));
                    npow *= &n_rat;
                }
                &npow / &fact
            })
            .collect();
        let mut wprod = Rat::one();
        for k in 0..d {
            let w = dot(&self.lambda, cone.rays().row(k));
            if w.is_zero() {
                return Err(CoreError::InvalidInput(
                    "lambda is orthogonal to a cone ray".into(),
                ));
            }
            wprod *= Rat::from_integer(w.clone());
            prod = mul_trunc(&prod, &self.todd.scaled(&w));
        }
        let mut contrib = prod[d].clone() / wprod;
        if d % 2 == 1 {
            contrib = -contrib;
        }
        if sign < 0 {
            contrib = -contrib;
        }
        self.count += contrib;
        Ok(())
    }
}

fn mul_trunc(a: &[Rat], b: &[Rat]) -> Vec<Rat> {
    let n = a.len();
    let mut out = vec![Rat::zero(); n];
    for (i, x) in a.iter().enumerate() {
        if x.is_zero() {
            continue;
        }
        for (j, y) in b.iter().enumerate() {
            if i + j >= n {
                break;
            }
            out[i + j] += x * y;
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arith::IntMat;

    fn int(v: i64) -> Int {
        Int::from(v)
    }

    fn rat(n: i64, d: i64) -> Rat {
        Rat::new(int(n), int(d))
    }

    fn cone(rows: &[&[i64]]) -> Cone {
        Cone::new(IntMat::from_rows(
            &rows
                .iter()
                .map(|r| r.iter().map(|&x| int(x)).collect())
                .collect::<Vec<_>>(),
        ))
        .unwrap()
    }

    #[test]
    fn todd_series_coefficients() {
        let t = ToddSeries::new(4);
        assert_eq!(*t.coeff(0), rat(1, 1));
        assert_eq!(*t.coeff(1), rat(-1, 2));
        assert_eq!(*t.coeff(2), rat(1, 12));
        assert_eq!(*t.coeff(3), rat(0, 1));
        assert_eq!(*t.coeff(4), rat(-1, 720));
    }

    #[test]
    fn triangle_vertex_cones_accumulate_to_six() {
        // The three vertex cones of {x ≥ 0, y ≥ 0, x + y ≤ 2} at
        // λ = (1, −1): the running count passes 71/24 and 71/12 and ends at
        // the 6 lattice points of the triangle.
        let mut t = ToddCounter::new(2, vec![int(1), int(-1)]);
        t.handle(
            &cone(&[&[-1, 0], &[-1, 1]]),
            &[rat(2, 1), rat(0, 1)],
            1,
        )
        .unwrap();
        assert_eq!(*t.count(), rat(71, 24));
        t.handle(
            &cone(&[&[0, -1], &[1, -1]]),
            &[rat(0, 1), rat(2, 1)],
            1,
        )
        .unwrap();
        assert_eq!(*t.count(), rat(71, 12));
        t.handle(&cone(&[&[1, 0], &[0, 1]]), &[rat(0, 1), rat(0, 1)], 1)
            .unwrap();
        assert_eq!(*t.count(), rat(6, 1));
    }
}
