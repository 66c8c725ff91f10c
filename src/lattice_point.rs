//! Lattice-point representatives of parametric vertices
//!
//! For a unimodular cone with apex `v(p)/q`, the unique integer point of
//! `v(p) + C` whose ray-basis coordinates lie in `[0, 1)` above the apex is
//!
//! ```text
//! L(p) = v(p) + Σ_k {−α_k(p)} · r_k        α(p) = v(p) · R^{-1}
//! ```
//!
//! so its projection along a generic vector λ is an affine part `λ·v(p)`
//! plus terms `w_k · {(a_k·p + c_k)/m_k}` with `w_k = λ·r_k`. Fractional
//! arguments are canonicalized by `normal_mod` (coefficients reduced modulo
//! the denominator, common factors extracted). The modulo form is canonical;
//! the periodic form is derived on demand by residue folding. When the
//! argument's quotient is constant over the vertex's validity domain the
//! fractional collapses to that constant, removing the mod.

use num::{Integer, One, Zero};

use crate::arith::{dot, modulo, rat_fract};
use crate::cone::Cone;
use crate::evalue::{self, EValue};
use crate::polyhedron::Polyhedron;
use crate::{CoreError, Int, Rat};

/// A parametric vertex as affine numerator rows over a common denominator:
/// row `i` holds the coefficients of `x_i(p)` (parameters first, constant
/// last) and `denom > 0` scales them all.
#[derive(Clone, Debug)]
pub struct VertexForm {
    /// Numerator rows, one per coordinate, constant column last.
    pub rows: Vec<Vec<Int>>,
    /// Common positive denominator of every row.
    pub denom: Int,
}

impl VertexForm {
    /// Number of parameters (row length minus the constant column).
    pub fn nparam(&self) -> usize {
        self.rows.first().map_or(0, |r| r.len() - 1)
    }

    /// Exact coordinates at a concrete parameter point.
    pub fn eval(&self, params: &[Int]) -> Vec<Rat> {
        self.rows
            .iter()
            .map(|row| {
                let (coeffs, cst) = row.split_at(row.len() - 1);
                Rat::new(dot(coeffs, params) + &cst[0], self.denom.clone())
            })
            .collect()
    }
}

/// λ-projection of the lattice-point representative of `vertex` in the
/// unimodular `cone`: the evalue `λ·L(p)` over the parameter variables.
///
/// When `domain` is given, fractional terms whose quotient is fixed over it
/// collapse to constants.
pub fn lattice_point(
    cone: &Cone,
    vertex: &VertexForm,
    lambda: &[Int],
    domain: Option<&Polyhedron>,
) -> Result<EValue, CoreError> {
    let d = cone.dim();
    debug_assert_eq!(vertex.rows.len(), d);
    debug_assert_eq!(lambda.len(), d);
    let nparam = vertex.nparam();
    let (inv, qi) = cone
        .rays()
        .inverse()
        .map_err(crate::arith::ArithError::from)?;
    let m_k = &vertex.denom * &qi; // common fractional denominator

    // Affine part λ·v(p).
    let mut acc = lambda_dot_vertex(vertex, lambda);

    for k in 0..d {
        let w_k = dot(lambda, cone.rays().row(k));
        // α_k(p)·(q·qi) = Σ_i inv[i][k] · vertex.rows[i]
        let mut arg = vec![Int::zero(); nparam + 1];
        for (i, row) in vertex.rows.iter().enumerate() {
            let f = inv.at(i, k);
            if f.is_zero() {
                continue;
            }
            for (a, x) in arg.iter_mut().zip(row) {
                *a += f * x;
            }
        }
        // {−α_k(p)}
        for a in arg.iter_mut() {
            *a = -a.clone();
        }
        let term = fractional_term(&arg, &m_k, &w_k, nparam, domain);
        acc.eadd(&term);
    }
    acc.reduce();
    if let Some(dom) = domain {
        acc.reduce_in_domain(dom);
    }
    Ok(acc)
}

/// Scalar (zero-parameter) variant: the exact integer `λ·L` for a concrete
/// rational apex.
pub fn lattice_point_scalar(
    cone: &Cone,
    vertex: &[Rat],
    lambda: &[Int],
) -> Result<Int, CoreError> {
    let d = cone.dim();
    let (inv, qi) = cone
        .rays()
        .inverse()
        .map_err(crate::arith::ArithError::from)?;
    let qi_rat = Rat::from_integer(qi);
    let mut acc = Rat::zero();
    for (v, l) in vertex.iter().zip(lambda) {
        acc += v * Rat::from_integer(l.clone());
    }
    for k in 0..d {
        let w_k = dot(lambda, cone.rays().row(k));
        if w_k.is_zero() {
            continue;
        }
        let mut alpha = Rat::zero();
        for (i, v) in vertex.iter().enumerate() {
            alpha += v * Rat::from_integer(inv.at(i, k).clone());
        }
        alpha /= &qi_rat;
        acc += Rat::from_integer(w_k) * rat_fract(&-alpha);
    }
    debug_assert!(acc.is_integer(), "lattice point projects to an integer");
    Ok(acc.to_integer())
}

/// The full lattice-point representative `L = Σ_k ⌈α_k⌉ r_k ∈ Z^d` of a
/// concrete rational apex in its cone's ray lattice.
pub fn lattice_point_vector(cone: &Cone, vertex: &[Rat]) -> Result<Vec<Int>, CoreError> {
    let d = cone.dim();
    let (inv, qi) = cone
        .rays()
        .inverse()
        .map_err(crate::arith::ArithError::from)?;
    let qi = Rat::from_integer(qi);
    let mut l = vec![Int::zero(); d];
    for k in 0..d {
        let mut alpha = Rat::zero();
        for (i, v) in vertex.iter().enumerate() {
            alpha += v * Rat::from_integer(inv.at(i, k).clone());
        }
        alpha /= &qi;
        let c = crate::arith::rat_ceil(&alpha);
        if c.is_zero() {
            continue;
        }
        for (li, ri) in l.iter_mut().zip(cone.rays().row(k)) {
            *li += &c * ri;
        }
    }
    Ok(l)
}

/// Build `w · {(arg·(p,1))/m}` with `normal_mod` canonicalization, applying
/// the fixed-quotient tie-break when a domain is available.
fn fractional_term(
    arg: &[Int],
    m: &Int,
    w: &Int,
    nparam: usize,
    domain: Option<&Polyhedron>,
) -> EValue {
    if w.is_zero() {
        return EValue::zero();
    }
    // normal_mod, part one: extract the common factor of the coefficients
    // and the modulus (pure rescaling, quotients are unchanged).
    let mut arg = arg.to_vec();
    let mut m = m.clone();
    let mut g = m.clone();
    for a in &arg {
        g = g.gcd(a);
    }
    if !g.is_one() && !g.is_zero() {
        for a in arg.iter_mut() {
            *a = &*a / &g;
        }
        m = &m / &g;
    }
    if m.is_one() {
        // The argument is integral: the fractional part vanishes.
        return EValue::zero();
    }
    if let Some(dom) = domain {
        // Fixed quotient over the validity domain: {arg/m} = arg/m − q0.
        // This must run on the raw argument, before coefficients are folded
        // into [0, m) — folding changes the quotient.
        let mut form = arg[..nparam].to_vec();
        form.resize(dom.dim(), Int::zero());
        if let Some((lo, hi)) = dom.affine_range(&form, &arg[nparam]) {
            let m_rat = Rat::from_integer(m.clone());
            let lo_q = (lo / &m_rat).floor();
            let hi_q = (hi / &m_rat).floor();
            if lo_q == hi_q {
                let coeffs: Vec<Rat> = arg[..nparam]
                    .iter()
                    .map(|a| Rat::new(a.clone(), m.clone()))
                    .collect();
                let cst = Rat::new(arg[nparam].clone(), m.clone()) - lo_q;
                let mut affine = EValue::from_affine(&coeffs, &cst);
                affine.emul(&EValue::Rational(Rat::from_integer(w.clone())));
                return affine;
            }
        }
    }
    // normal_mod, part two: fold the coefficients into [0, m).
    for a in arg.iter_mut() {
        *a = modulo(a, &m);
    }
    let coeffs: Vec<Rat> = arg[..nparam]
        .iter()
        .map(|a| Rat::new(a.clone(), m.clone()))
        .collect();
    let cst = Rat::new(arg[nparam].clone(), m.clone());
    let inner = EValue::from_affine(&coeffs, &cst);
    EValue::Fractional {
        arg: Box::new(inner),
        coeffs: vec![EValue::zero(), EValue::from_int(w.clone())],
    }
}

fn lambda_dot_vertex(vertex: &VertexForm, lambda: &[Int]) -> EValue {
    let nparam = vertex.nparam();
    let mut row = vec![Int::zero(); nparam + 1];
    for (l, vrow) in lambda.iter().zip(&vertex.rows) {
        if l.is_zero() {
            continue;
        }
        for (a, x) in row.iter_mut().zip(vrow) {
            *a += l * x;
        }
    }
    let coeffs: Vec<Rat> = row[..nparam]
        .iter()
        .map(|a| Rat::new(a.clone(), vertex.denom.clone()))
        .collect();
    let cst = Rat::new(row[nparam].clone(), vertex.denom.clone());
    EValue::from_affine(&coeffs, &cst)
}

/// Derive the periodic fallback form: fold every parameter axis whose
/// fractional denominators are non-trivial into explicit periodic nodes.
/// Both forms evaluate identically at every integer parameter point.
pub fn periodic_form(e: &EValue, nparam: usize) -> EValue {
    let mut out = e.clone();
    for var in 0..nparam {
        let m = fractional_period(&out, var);
        if m > 1 {
            out = out.periodic_fold(var, m);
        }
    }
    out.reduce();
    out
}

/// Least common multiple of the denominators of `var`'s coefficient over
/// all fractional arguments in the tree.
fn fractional_period(e: &EValue, var: usize) -> usize {
    fn walk(e: &EValue, var: usize, acc: &mut Int) {
        match e {
            EValue::Rational(_) => {}
            EValue::Fractional { arg, coeffs } => {
                if let Some((aff, _)) = evalue::as_affine(arg) {
                    if let Some(c) = aff.get(var) {
                        if !c.is_zero() {
                            *acc = acc.lcm(c.denom());
                        }
                    }
                }
                walk(arg, var, acc);
                for c in coeffs {
                    walk(c, var, acc);
                }
            }
            EValue::Flooring { arg, coeffs } => {
                walk(arg, var, acc);
                for c in coeffs {
                    walk(c, var, acc);
                }
            }
            EValue::Polynomial { coeffs, .. } => {
                for c in coeffs {
                    walk(c, var, acc);
                }
            }
            EValue::Periodic { values, .. } => {
                for v in values {
                    walk(v, var, acc);
                }
            }
            EValue::Relation {
                cond,
                if_zero,
                otherwise,
            } => {
                walk(cond, var, acc);
                walk(if_zero, var, acc);
                if let Some(o) = otherwise {
                    walk(o, var, acc);
                }
            }
            EValue::Partition { pieces } => {
                for (_, v) in pieces {
                    walk(v, var, acc);
                }
            }
        }
    }
    let mut acc = Int::one();
    walk(e, var, &mut acc);
    usize::try_from(u64::try_from(acc).unwrap_or(1)).unwrap_or(1)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arith::{rat_ceil, IntMat};

    fn int(v: i64) -> Int {
        Int::from(v)
    }

    fn rat(n: i64, d: i64) -> Rat {
        Rat::new(int(n), int(d))
    }

    fn mat(rows: &[&[i64]]) -> IntMat {
        IntMat::from_rows(
            &rows
                .iter()
                .map(|r| r.iter().map(|&x| int(x)).collect())
                .collect::<Vec<_>>(),
        )
    }

    /// Brute-force the representative: L = Σ ⌈α_k⌉ r_k in the ray basis.
    fn brute_projection(cone: &Cone, vertex: &[Rat], lambda: &[Int]) -> Rat {
        let d = cone.dim();
        let (inv, qi) = cone.rays().inverse().unwrap();
        let qi = Rat::from_integer(qi);
        let mut acc = Rat::zero();
        for k in 0..d {
            let mut alpha = Rat::zero();
            for (i, v) in vertex.iter().enumerate() {
                alpha += v * Rat::from_integer(inv.at(i, k).clone());
            }
            alpha /= &qi;
            let w = dot(lambda, cone.rays().row(k));
            acc += Rat::from_integer(rat_ceil(&alpha)) * Rat::from_integer(w);
        }
        acc
    }

    #[test]
    fn scalar_representative_matches_ceil_formula() {
        let cone = Cone::new(mat(&[&[1, 0], &[1, 2]])).unwrap();
        let lambda = vec![int(1), int(-1)];
        for (vx, vy) in [(0i64, 0i64), (3, 1), (-5, 2)] {
            for den in [1i64, 2, 3, 4] {
                let vertex = vec![rat(vx, den), rat(vy, den)];
                let got = lattice_point_scalar(&cone, &vertex, &lambda).unwrap();
                let expect = brute_projection(&cone, &vertex, &lambda);
                assert_eq!(Rat::from_integer(got), expect, "v = ({vx}/{den}, {vy}/{den})");
            }
        }
    }

    #[test]
    fn parametric_form_specializes_to_scalar() {
        // Vertex (p/2, 0) of the cone spanned by e1, e2, projected by λ.
        let cone = Cone::new(mat(&[&[1, 0], &[0, 1]])).unwrap();
        let vertex = VertexForm {
            rows: vec![vec![int(1), int(0)], vec![int(0), int(0)]],
            denom: int(2),
        };
        let lambda = vec![int(3), int(5)];
        let e = lattice_point(&cone, &vertex, &lambda, None).unwrap();
        for p in -6..7i64 {
            let vp = vertex.eval(&[int(p)]);
            let scalar = lattice_point_scalar(&cone, &vp, &lambda).unwrap();
            assert_eq!(
                e.eval(&[int(p)]),
                Rat::from_integer(scalar),
                "p = {p}: modulo form must match the scalar representative"
            );
        }
    }

    #[test]
    fn parametric_form_with_mixed_rays() {
        let cone = Cone::new(mat(&[&[1, 1], &[0, -1]])).unwrap();
        let vertex = VertexForm {
            rows: vec![vec![int(2), int(1)], vec![int(-1), int(0)]],
            denom: int(3),
        };
        let lambda = vec![int(2), int(7)];
        let e = lattice_point(&cone, &vertex, &lambda, None).unwrap();
        for p in -5..9i64 {
            let vp = vertex.eval(&[int(p)]);
            let scalar = lattice_point_scalar(&cone, &vp, &lambda).unwrap();
            assert_eq!(e.eval(&[int(p)]), Rat::from_integer(scalar), "p = {p}");
        }
    }

    #[test]
    fn integral_vertex_has_no_fractional_parts() {
        let cone = Cone::new(mat(&[&[1, 0], &[0, 1]])).unwrap();
        let vertex = VertexForm {
            rows: vec![vec![int(1), int(0)], vec![int(2), int(0)]],
            denom: int(1),
        };
        let lambda = vec![int(1), int(1)];
        let e = lattice_point(&cone, &vertex, &lambda, None).unwrap();
        // λ·L(p) = p + 2p = 3p exactly.
        for p in 0..5i64 {
            assert_eq!(e.eval(&[int(p)]), rat(3 * p, 1));
        }
    }

    #[test]
    fn periodic_form_agrees_with_modulo_form() {
        let cone = Cone::new(mat(&[&[1, 0], &[1, 2]])).unwrap();
        let vertex = VertexForm {
            rows: vec![vec![int(1), int(1)], vec![int(1), int(0)]],
            denom: int(4),
        };
        let lambda = vec![int(1), int(-1)];
        let modulo_form = lattice_point(&cone, &vertex, &lambda, None).unwrap();
        let periodic = periodic_form(&modulo_form, 1);
        for p in -10..14i64 {
            assert_eq!(
                periodic.eval(&[int(p)]),
                modulo_form.eval(&[int(p)]),
                "p = {p}"
            );
        }
    }

    #[test]
    fn fixed_quotient_tiebreak_removes_fractional() {
        use crate::polyhedron::{Constraint, Polyhedron};
        // Domain 4 ≤ p ≤ 6: ⌊p/8⌋ = 0 is fixed, so {−p/8} folds affinely…
        let cone = Cone::new(mat(&[&[1, 0], &[0, 1]])).unwrap();
        let vertex = VertexForm {
            rows: vec![vec![int(1), int(0)], vec![int(0), int(0)]],
            denom: int(8),
        };
        let lambda = vec![int(1), int(0)];
        let dom = Polyhedron::from_constraints(
            1,
            vec![
                Constraint::ineq(vec![int(1)], int(-4)),
                Constraint::ineq(vec![int(-1)], int(6)),
            ],
        )
        .unwrap();
        let e = lattice_point(&cone, &vertex, &lambda, Some(&dom)).unwrap();
        fn has_fractional(e: &EValue) -> bool {
            match e {
                EValue::Fractional { .. } => true,
                EValue::Polynomial { coeffs, .. } => coeffs.iter().any(has_fractional),
                _ => false,
            }
        }
        assert!(!has_fractional(&e), "tie-break should remove the mod");
        for p in 4..=6i64 {
            let vp = vertex.eval(&[int(p)]);
            let scalar = lattice_point_scalar(&cone, &vp, &lambda).unwrap();
            assert_eq!(e.eval(&[int(p)]), Rat::from_integer(scalar), "p = {p}");
        }
    }
}
