//! Exact integer & matrix kernel
//!
//! Arbitrary-precision scalar helpers (floored/ceiled division, modulus in
//! `[0, m)`, gcd/lcm), integer vectors, and the row-major [`IntMat`] matrix
//! with the operations the decomposition engine needs: multiplication,
//! transpose, fraction-free determinant, inverse over `Q` with a common
//! denominator, column Hermite normal form with its unimodular transform,
//! unimodular completion of a primitive row, and LLL reduction with a
//! configurable `δ = a/b`.
//!
//! Everything here is exact; the correctness of the counting engine rests on
//! exact division and gcd, so none of these may be approximated.

use num::{Integer, One, Signed, Zero};

use crate::{Int, Rat};

/// Errors surfaced by the arithmetic kernel.
#[derive(Debug, thiserror::Error)]
pub enum ArithError {
    /// A square-matrix operation received a rectangular matrix.
    #[error("matrix is not square ({rows}x{cols})")]
    NotSquare {
        /// Rows of the offending matrix.
        rows: usize,
        /// Columns of the offending matrix.
        cols: usize,
    },
    /// Inversion of a matrix with zero determinant.
    #[error("matrix is singular")]
    Singular,
    /// Operands of incompatible shapes.
    #[error("dimension mismatch: {0}")]
    DimMismatch(String),
    /// A vector expected to have content 1 did not.
    #[error("expected a primitive vector (content {0})")]
    NotPrimitive(Int),
}

// ============================================================================
// Scalar helpers
// ============================================================================

/// Floored division: rounds toward `-∞`. `b` must be non-zero.
pub fn floor_div(a: &Int, b: &Int) -> Int {
    a.div_floor(b)
}

/// Ceiled division: rounds toward `+∞`. `b` must be non-zero.
pub fn ceil_div(a: &Int, b: &Int) -> Int {
    -(-a).div_floor(b)
}

/// Modulus in `[0, m)` for `m > 0`.
pub fn modulo(a: &Int, m: &Int) -> Int {
    debug_assert!(m.is_positive(), "modulo requires a positive modulus");
    a.mod_floor(m)
}

/// Greatest common divisor (non-negative).
pub fn gcd(a: &Int, b: &Int) -> Int {
    a.gcd(b)
}

/// Least common multiple (non-negative).
pub fn lcm(a: &Int, b: &Int) -> Int {
    a.lcm(b)
}

/// Floor of a rational number.
pub fn rat_floor(r: &Rat) -> Int {
    r.numer().div_floor(r.denom())
}

/// Ceiling of a rational number.
pub fn rat_ceil(r: &Rat) -> Int {
    ceil_div(r.numer(), r.denom())
}

/// Fractional part `r - ⌊r⌋ ∈ [0, 1)`.
pub fn rat_fract(r: &Rat) -> Rat {
    r - Rat::from_integer(rat_floor(r))
}

/// Nearest integer, halves rounding up.
pub fn rat_round(r: &Rat) -> Int {
    rat_floor(&(r + Rat::new(Int::one(), Int::from(2))))
}

// ============================================================================
// Vector helpers
// ============================================================================

/// Inner product of two equal-length integer vectors.
pub fn dot(a: &[Int], b: &[Int]) -> Int {
    debug_assert_eq!(a.len(), b.len(), "dot of unequal lengths");
    let mut acc = Int::zero();
    for (x, y) in a.iter().zip(b) {
        acc += x * y;
    }
    acc
}

/// Gcd of all entries (zero for the all-zero vector).
pub fn content(v: &[Int]) -> Int {
    let mut g = Int::zero();
    for x in v {
        g = g.gcd(x);
    }
    g
}

/// Divide a vector by its content, making it primitive. The all-zero vector
/// is returned unchanged.
pub fn primitive(v: &[Int]) -> Vec<Int> {
    let g = content(v);
    if g.is_zero() || g.is_one() {
        return v.to_vec();
    }
    v.iter().map(|x| x / &g).collect()
}

/// Largest absolute value of the entries.
pub fn max_abs(v: &[Int]) -> Int {
    let mut m = Int::zero();
    for x in v {
        let a = x.abs();
        if a > m {
            m = a;
        }
    }
    m
}

// ============================================================================
// IntMat
// ============================================================================

/// Row-major matrix over [`Int`] with value (deep-copy) semantics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntMat {
    rows: usize,
    cols: usize,
    data: Vec<Int>,
}

impl IntMat {
    /// All-zero matrix.
    pub fn zero(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![Int::zero(); rows * cols],
        }
    }

    /// Identity matrix of order `n`.
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zero(n, n);
        for i in 0..n {
            m.set(i, i, Int::one());
        }
        m
    }

    /// Build from row vectors; all rows must share one length.
    pub fn from_rows(rows: &[Vec<Int>]) -> Self {
        let r = rows.len();
        let c = rows.first().map_or(0, Vec::len);
        debug_assert!(rows.iter().all(|row| row.len() == c));
        Self {
            rows: r,
            cols: c,
            data: rows.iter().flat_map(|row| row.iter().cloned()).collect(),
        }
    }

    /// Number of rows.
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn n_cols(&self) -> usize {
        self.cols
    }

    /// Entry at `(i, j)`.
    #[inline]
    pub fn at(&self, i: usize, j: usize) -> &Int {
        &self.data[i * self.cols + j]
    }

    /// Overwrite entry at `(i, j)`.
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, v: Int) {
        self.data[i * self.cols + j] = v;
    }

    /// Borrow row `i` as a slice.
    #[inline]
    pub fn row(&self, i: usize) -> &[Int] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Clone row `i`.
    pub fn row_vec(&self, i: usize) -> Vec<Int> {
        self.row(i).to_vec()
    }

    /// Overwrite row `i`.
    pub fn set_row(&mut self, i: usize, v: &[Int]) {
        debug_assert_eq!(v.len(), self.cols);
        self.data[i * self.cols..(i + 1) * self.cols].clone_from_slice(v);
    }

    /// Clone column `j`.
    pub fn col_vec(&self, j: usize) -> Vec<Int> {
        (0..self.rows).map(|i| self.at(i, j).clone()).collect()
    }

    /// Transposed copy.
    pub fn transpose(&self) -> Self {
        let mut t = Self::zero(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                t.set(j, i, self.at(i, j).clone());
            }
        }
        t
    }

    /// Matrix product `self * rhs`.
    pub fn mul(&self, rhs: &Self) -> Self {
        debug_assert_eq!(self.cols, rhs.rows, "matrix product shape");
        let mut out = Self::zero(self.rows, rhs.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self.at(i, k);
                if a.is_zero() {
                    continue;
                }
                for j in 0..rhs.cols {
                    let v = out.at(i, j) + a * rhs.at(k, j);
                    out.set(i, j, v);
                }
            }
        }
        out
    }

    /// Row vector times matrix: `v * self`.
    pub fn vec_mul(&self, v: &[Int]) -> Vec<Int> {
        debug_assert_eq!(v.len(), self.rows);
        let mut out = vec![Int::zero(); self.cols];
        for (i, vi) in v.iter().enumerate() {
            if vi.is_zero() {
                continue;
            }
            for j in 0..self.cols {
                out[j] += vi * self.at(i, j);
            }
        }
        out
    }

    /// Matrix times column vector: `self * v`.
    pub fn mul_vec(&self, v: &[Int]) -> Vec<Int> {
        debug_assert_eq!(v.len(), self.cols);
        (0..self.rows).map(|i| dot(self.row(i), v)).collect()
    }

    /// Determinant by Bareiss fraction-free elimination.
    pub fn determinant(&self) -> Result<Int, ArithError> {
        if self.rows != self.cols {
            return Err(ArithError::NotSquare {
                rows: self.rows,
                cols: self.cols,
            });
        }
        let n = self.rows;
        if n == 0 {
            return Ok(Int::one());
        }
        let mut m = self.clone();
        let mut sign = 1i32;
        let mut prev = Int::one();
        for k in 0..n - 1 {
            if m.at(k, k).is_zero() {
                let Some(swap) = (k + 1..n).find(|&i| !m.at(i, k).is_zero()) else {
                    return Ok(Int::zero());
                };
                for j in 0..n {
                    let a = m.at(k, j).clone();
                    let b = m.at(swap, j).clone();
                    m.set(k, j, b);
                    m.set(swap, j, a);
                }
                sign = -sign;
            }
            for i in k + 1..n {
                for j in k + 1..n {
                    let num = m.at(i, j) * m.at(k, k) - m.at(i, k) * m.at(k, j);
                    // Bareiss: the previous pivot divides exactly.
                    m.set(i, j, &num / &prev);
                }
                m.set(i, k, Int::zero());
            }
            prev = m.at(k, k).clone();
        }
        let d = m.at(n - 1, n - 1).clone();
        Ok(if sign < 0 { -d } else { d })
    }

    /// Inverse over `Q`, returned as an integer matrix `N` and a positive
    /// denominator `q` with `self * N = q * I`.
    pub fn inverse(&self) -> Result<(IntMat, Int), ArithError> {
        if self.rows != self.cols {
            return Err(ArithError::NotSquare {
                rows: self.rows,
                cols: self.cols,
            });
        }
        let n = self.rows;
        // Rational Gauss-Jordan on [self | I].
        let mut a: Vec<Vec<Rat>> = (0..n)
            .map(|i| {
                let mut row: Vec<Rat> = self
                    .row(i)
                    .iter()
                    .map(|x| Rat::from_integer(x.clone()))
                    .collect();
                row.extend((0..n).map(|j| {
                    if i == j {
                        Rat::one()
                    } else {
                        Rat::zero()
                    }
                }));
                row
            })
            .collect();
        for k in 0..n {
            let Some(p) = (k..n).find(|&i| !a[i][k].is_zero()) else {
                return Err(ArithError::Singular);
            };
            a.swap(k, p);
            let piv = a[k][k].clone();
            for x in a[k].iter_mut() {
                *x /= piv.clone();
            }
            for i in 0..n {
                if i == k || a[i][k].is_zero() {
                    continue;
                }
                let f = a[i][k].clone();
                for j in 0..2 * n {
                    let s = &a[k][j] * &f;
                    a[i][j] -= s;
                }
            }
        }
        let mut q = Int::one();
        for row in &a {
            for x in &row[n..] {
                q = q.lcm(x.denom());
            }
        }
        let mut inv = IntMat::zero(n, n);
        for i in 0..n {
            for j in 0..n {
                let x = &a[i][n + j];
                inv.set(i, j, x.numer() * (&q / x.denom()));
            }
        }
        Ok((inv, q))
    }
}

// ============================================================================
// Hermite form, integer systems, unimodular completion
// ============================================================================

/// Column Hermite reduction: returns `(H, W)` with `W` unimodular and
/// `A * W = H`, where each processed row has a single leading non-zero
/// (positive) entry in its pivot column and zeros to the right of it.
pub fn col_hermite(a: &IntMat) -> (IntMat, IntMat) {
    let (r, n) = (a.n_rows(), a.n_cols());
    let mut h = a.clone();
    let mut w = IntMat::identity(n);
    let mut c = 0usize;
    for t in 0..r {
        if c >= n {
            break;
        }
        // Euclidean sweep on row t across columns c..n-1.
        loop {
            let nz: Vec<usize> = (c..n).filter(|&j| !h.at(t, j).is_zero()).collect();
            if nz.is_empty() {
                break;
            }
            let &jmin = nz
                .iter()
                .min_by_key(|&&j| h.at(t, j).abs())
                .expect("non-empty");
            if jmin != c {
                swap_cols(&mut h, c, jmin);
                swap_cols(&mut w, c, jmin);
            }
            let mut done = true;
            for j in c + 1..n {
                if h.at(t, j).is_zero() {
                    continue;
                }
                let q = floor_div(h.at(t, j), h.at(t, c));
                if !q.is_zero() {
                    sub_col(&mut h, j, c, &q);
                    sub_col(&mut w, j, c, &q);
                }
                if !h.at(t, j).is_zero() {
                    done = false;
                }
            }
            if done {
                break;
            }
        }
        if h.at(t, c).is_zero() {
            continue; // row is zero from column c on; no pivot consumed
        }
        if h.at(t, c).is_negative() {
            neg_col(&mut h, c);
            neg_col(&mut w, c);
        }
        c += 1;
    }
    (h, w)
}

fn swap_cols(m: &mut IntMat, a: usize, b: usize) {
    for i in 0..m.n_rows() {
        let x = m.at(i, a).clone();
        let y = m.at(i, b).clone();
        m.set(i, a, y);
        m.set(i, b, x);
    }
}

fn sub_col(m: &mut IntMat, dst: usize, src: usize, q: &Int) {
    for i in 0..m.n_rows() {
        let v = m.at(i, dst) - q * m.at(i, src);
        m.set(i, dst, v);
    }
}

fn neg_col(m: &mut IntMat, c: usize) {
    for i in 0..m.n_rows() {
        let v = -m.at(i, c).clone();
        m.set(i, c, v);
    }
}

/// Outcome of an integer linear system `A x = b`.
#[derive(Clone, Debug)]
pub enum IntSolve {
    /// A particular integer solution plus a lattice basis of the null space.
    Solution {
        /// One integer solution of the system.
        particular: Vec<Int>,
        /// Columns spanning the integer null lattice.
        null_basis: Vec<Vec<Int>>,
    },
    /// Solvable over `Q` but not over `Z` (a divisibility fails).
    RationalOnly,
    /// No rational solution.
    Inconsistent,
}

/// Solve `A x = b` over the integers.
pub fn solve_integer(a: &IntMat, b: &[Int]) -> IntSolve {
    debug_assert_eq!(a.n_rows(), b.len());
    let (h, w) = col_hermite(a);
    let n = a.n_cols();
    // Forward substitution over Q so that a failed divisibility cannot
    // corrupt the consistency checks of later rows.
    let mut y = vec![Rat::zero(); n];
    let mut c = 0usize;
    for t in 0..a.n_rows() {
        let mut acc = Rat::from_integer(b[t].clone());
        for j in 0..c {
            acc -= Rat::from_integer(h.at(t, j).clone()) * &y[j];
        }
        if c < n && !h.at(t, c).is_zero() {
            y[c] = acc / Rat::from_integer(h.at(t, c).clone());
            c += 1;
        } else if !acc.is_zero() {
            return IntSolve::Inconsistent;
        }
    }
    if y.iter().any(|v| !v.is_integer()) {
        // The Hermite pivots are the elementary divisors here; a non-integer
        // coordinate means no integer point though a rational one exists.
        return IntSolve::RationalOnly;
    }
    let y: Vec<Int> = y.into_iter().map(|v| v.to_integer()).collect();
    let particular = w.mul_vec(&y);
    let null_basis = (c..n).map(|j| w.col_vec(j)).collect();
    IntSolve::Solution {
        particular,
        null_basis,
    }
}

/// Complete a primitive row `v` to a unimodular matrix whose first row is `v`.
pub fn unimodular_complete(v: &[Int]) -> Result<IntMat, ArithError> {
    let g = content(v);
    if !g.is_one() {
        return Err(ArithError::NotPrimitive(g));
    }
    let (h, w) = col_hermite(&IntMat::from_rows(&[v.to_vec()]));
    debug_assert!(h.at(0, 0).is_one(), "primitive row reduces to gcd 1");
    // v * W = e1, so v is the first row of W^{-1}.
    let (inv, q) = w.inverse()?;
    debug_assert!(q.is_one(), "unimodular transform inverts over Z");
    Ok(inv)
}

// ============================================================================
// LLL
// ============================================================================

/// LLL-reduce the rows of `basis` with parameter `δ = delta.0 / delta.1`
/// (default 3/4 elsewhere). Returns `(B, U)` with `U` unimodular and
/// `B = U * basis`. Rows must be linearly independent.
pub fn lll(basis: &IntMat, delta: (i64, i64)) -> (IntMat, IntMat) {
    let n = basis.n_rows();
    let mut b = basis.clone();
    let mut u = IntMat::identity(n);
    if n <= 1 {
        return (b, u);
    }
    let delta = Rat::new(Int::from(delta.0), Int::from(delta.1));
    let mut k = 1usize;
    while k < n {
        // Size-reduce row k against rows k-1..0; the projection
        // coefficients change after every subtraction, so recompute.
        for j in (0..k).rev() {
            let (mu, _) = gram_schmidt(&b);
            let q = rat_round(&mu[k][j]);
            if !q.is_zero() {
                row_sub(&mut b, k, j, &q);
                row_sub(&mut u, k, j, &q);
            }
        }
        let (mu, bnorm) = gram_schmidt(&b);
        // Lovász condition on (k-1, k).
        let lhs = &bnorm[k];
        let rhs = (&delta - &mu[k][k - 1] * &mu[k][k - 1]) * &bnorm[k - 1];
        if *lhs < rhs {
            row_swap(&mut b, k, k - 1);
            row_swap(&mut u, k, k - 1);
            k = k.max(2) - 1;
        } else {
            k += 1;
        }
    }
    (b, u)
}

fn gram_schmidt(b: &IntMat) -> (Vec<Vec<Rat>>, Vec<Rat>) {
    let n = b.n_rows();
    let d = b.n_cols();
    let mut star: Vec<Vec<Rat>> = Vec::with_capacity(n);
    let mut mu = vec![vec![Rat::zero(); n]; n];
    let mut norm = Vec::with_capacity(n);
    for i in 0..n {
        let mut v: Vec<Rat> = b
            .row(i)
            .iter()
            .map(|x| Rat::from_integer(x.clone()))
            .collect();
        for j in 0..i {
            let num = rat_dot_int(&star[j], b.row(i));
            let m = if norm[j] == Rat::zero() {
                Rat::zero()
            } else {
                num / &norm[j]
            };
            for t in 0..d {
                let s = &m * &star[j][t];
                v[t] -= s;
            }
            mu[i][j] = m;
        }
        let nv = rat_dot(&v, &v);
        norm.push(nv);
        star.push(v);
    }
    (mu, norm)
}

fn rat_dot(a: &[Rat], b: &[Rat]) -> Rat {
    let mut acc = Rat::zero();
    for (x, y) in a.iter().zip(b) {
        acc += x * y;
    }
    acc
}

fn rat_dot_int(a: &[Rat], b: &[Int]) -> Rat {
    let mut acc = Rat::zero();
    for (x, y) in a.iter().zip(b) {
        acc += x * Rat::from_integer(y.clone());
    }
    acc
}

fn row_sub(m: &mut IntMat, dst: usize, src: usize, q: &Int) {
    for j in 0..m.n_cols() {
        let v = m.at(dst, j) - q * m.at(src, j);
        m.set(dst, j, v);
    }
}

fn row_swap(m: &mut IntMat, a: usize, b: usize) {
    for j in 0..m.n_cols() {
        let x = m.at(a, j).clone();
        let y = m.at(b, j).clone();
        m.set(a, j, y);
        m.set(b, j, x);
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

    fn mat(rows: &[&[i64]]) -> IntMat {
        IntMat::from_rows(
            &rows
                .iter()
                .map(|r| r.iter().map(|&x| int(x)).collect())
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn floor_ceil_mod_conventions() {
        assert_eq!(floor_div(&int(-7), &int(2)), int(-4));
        assert_eq!(ceil_div(&int(-7), &int(2)), int(-3));
        assert_eq!(floor_div(&int(7), &int(2)), int(3));
        assert_eq!(ceil_div(&int(7), &int(2)), int(4));
        assert_eq!(modulo(&int(-7), &int(3)), int(2));
        assert_eq!(modulo(&int(7), &int(3)), int(1));
    }

    #[test]
    fn determinant_and_inverse_roundtrip() {
        let m = mat(&[&[2, 1, 0], &[1, 3, 1], &[0, 1, 2]]);
        let det = m.determinant().unwrap();
        assert_eq!(det, int(8));
        let (inv, q) = m.inverse().unwrap();
        // m * inv == q * I
        let prod = m.mul(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expect = if i == j { q.clone() } else { Int::zero() };
                assert_eq!(*prod.at(i, j), expect);
            }
        }
    }

    #[test]
    fn singular_matrix_rejected() {
        let m = mat(&[&[1, 2], &[2, 4]]);
        assert_eq!(m.determinant().unwrap(), Int::zero());
        assert!(matches!(m.inverse(), Err(ArithError::Singular)));
    }

    #[test]
    fn hermite_transform_is_consistent() {
        let a = mat(&[&[4, 6, 2], &[2, 8, 4]]);
        let (h, w) = col_hermite(&a);
        assert_eq!(a.mul(&w), h);
        let det = w.determinant().unwrap();
        assert!(det.abs().is_one(), "transform must be unimodular");
    }

    #[test]
    fn integer_system_solutions() {
        // 2x + 4y = 6 has integer solutions; null lattice is rank 1.
        let a = mat(&[&[2, 4]]);
        match solve_integer(&a, &[int(6)]) {
            IntSolve::Solution {
                particular,
                null_basis,
            } => {
                assert_eq!(dot(&[int(2), int(4)], &particular), int(6));
                assert_eq!(null_basis.len(), 1);
                assert_eq!(dot(&[int(2), int(4)], &null_basis[0]), Int::zero());
            }
            other => panic!("expected solution, got {other:?}"),
        }
        // 2x + 4y = 3 is rationally but not integrally solvable.
        assert!(matches!(
            solve_integer(&a, &[int(3)]),
            IntSolve::RationalOnly
        ));
        // 0 = 1 is inconsistent.
        let z = mat(&[&[0, 0]]);
        assert!(matches!(
            solve_integer(&z, &[int(1)]),
            IntSolve::Inconsistent
        ));
    }

    #[test]
    fn unimodular_completion_has_given_first_row() {
        let v = vec![int(2), int(3), int(5)];
        let u = unimodular_complete(&v).unwrap();
        assert_eq!(u.row(0), &v[..]);
        assert!(u.determinant().unwrap().abs().is_one());
    }

    #[test]
    fn lll_transform_reproduces_basis() {
        let b = mat(&[&[1, 1, 1], &[-1, 0, 2], &[3, 5, 6]]);
        let (red, u) = lll(&b, (3, 4));
        assert_eq!(u.mul(&b), red);
        assert!(u.determinant().unwrap().abs().is_one());
        // The reduced front vector is short (the lattice contains (1, 0, 1)).
        let shortest = max_abs(red.row(0));
        assert!(shortest <= int(2), "front row too long: {shortest}");
    }

    #[test]
    fn rational_rounding() {
        let half = Rat::new(int(1), int(2));
        assert_eq!(rat_round(&half), int(1));
        assert_eq!(rat_round(&-half.clone()), Int::zero());
        assert_eq!(rat_floor(&Rat::new(int(-3), int(2))), int(-2));
        assert_eq!(rat_ceil(&Rat::new(int(-3), int(2))), int(-1));
        assert_eq!(rat_fract(&Rat::new(int(-3), int(2))), half);
    }
}
