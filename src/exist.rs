//! Existential elimination
//!
//! Counts `{x : ∃ e ∈ Z^k, (x, e, p) ∈ P}` by a case-rule recursion that
//! drops one existential variable at a time. Variables are laid out counted
//! first, then existential, then parameters. Every rule is exact over the
//! integers:
//!
//! - **Equality**: an equation touching an existential is rotated (by a
//!   unimodular change of the existential block) onto a single existential
//!   with coefficient `g` and substituted away; the induced congruence is
//!   folded into the counted block by a coset substitution, or guarded by a
//!   divisibility relation when it lives on the parameters alone.
//! - **Line**: a line generator supported on the existential block is
//!   rotated onto an axis and dropped.
//! - **Unbounded direction**: an existential with no lower (or no upper)
//!   bounds absorbs its constraints.
//! - **Positive**: when every (lower, upper) bound pair of an existential is
//!   exact — a unit coefficient on one side, or its dark-shadow resolvent
//!   implied by the other constraints — Fourier projection over `Z` is
//!   exact and the variable is projected out.
//! - **One-negative**: a unit pair of width zero pins the existential; the
//!   induced equality feeds the equality rule.
//! - **Independent split**: a non-exact pair whose bounds are free of other
//!   existentials is split along its dark-shadow resolvent (an
//!   existential-free constraint, so the two integer halves have disjoint
//!   projections and the results add). On the dark half the pair has become
//!   exact; the gap half pins the existential to finitely many layers that
//!   are combined with the inclusion-exclusion operator [`eor`].
//!
//! The recursion checks the cancellation flag on entry. The gap-layer
//! combination is only defined on indicator-valued results (no counted
//! variables); inputs that would need it elsewhere are rejected with
//! `InvalidInput` rather than silently miscounted.

use num::{Integer, One, Signed, Zero};
use tracing::debug;

use crate::arith::{content, unimodular_complete, IntMat};
use crate::evalue::EValue;
use crate::options::Options;
use crate::polyhedron::{ConKind, Constraint, Polyhedron};
use crate::{CoreError, Int, Rat};

/// Inclusion-exclusion for existential branches: `a ⊕ b = a + b − a·b`.
/// Exact on indicator-valued (0/1) evalues.
pub fn eor(acc: &mut EValue, other: &EValue) {
    let mut prod = acc.clone();
    prod.emul(other);
    acc.eadd(other);
    prod.negate();
    acc.eadd(&prod);
}

/// Count the integer points of the `nvar`-dimensional shadow of `poly`
/// under existential quantification of the middle variable block.
pub fn enumerate_exists(
    poly: &Polyhedron,
    n_exist: usize,
    n_param: usize,
    opts: &Options,
) -> Result<EValue, CoreError> {
    let nvar = poly.dim() - n_exist - n_param;
    let context = Polyhedron::universe(n_param);
    enumerate_e(poly.clone(), nvar, n_exist, n_param, &context, opts)
}

fn enumerate_e(
    poly: Polyhedron,
    nvar: usize,
    nexist: usize,
    nparam: usize,
    context: &Polyhedron,
    opts: &Options,
) -> Result<EValue, CoreError> {
    if opts.cancel.is_cancelled() {
        return Err(CoreError::Cancelled);
    }
    if poly.is_empty() {
        return Ok(EValue::zero());
    }
    if nexist == 0 {
        return crate::counter::enumerate(&poly, nvar, context, opts);
    }

    // Equality rule.
    if let Some(outcome) = equality_rule(&poly, nvar, nexist, nparam)? {
        return match outcome {
            Equality::Infeasible => Ok(EValue::zero()),
            Equality::Reduced { poly, guards } => {
                debug!(nexist = nexist - 1, "existential equality eliminated");
                let mut res =
                    enumerate_e(poly, nvar, nexist - 1, nparam, context, opts)?;
                for g in guards.into_iter().rev() {
                    res = EValue::Relation {
                        cond: Box::new(g),
                        if_zero: Box::new(res),
                        otherwise: None,
                    };
                }
                res.distribute_into_partition();
                res.reduce();
                Ok(res)
            }
        };
    }

    // Line rule: a line supported on the existential block.
    if let Some(reduced) = line_rule(&poly, nvar, nexist)? {
        debug!(nexist = nexist - 1, "existential line dropped");
        return enumerate_e(reduced, nvar, nexist - 1, nparam, context, opts);
    }

    for e in 0..nexist {
        let vi = nvar + e;
        let (lowers, uppers) = bound_pairs(&poly, vi);
        // Unbounded direction: the existential absorbs its constraints.
        if lowers.is_empty() || uppers.is_empty() {
            debug!(existential = e, "unbounded direction projected");
            let reduced = drop_variable(&poly, vi)?;
            return enumerate_e(reduced, nvar, nexist - 1, nparam, context, opts);
        }
        // One-negative: a pair of width zero pins the variable.
        if let Some((l, _u)) = find_pinned_pair(&lowers, &uppers) {
            let eq = Constraint::eq(l.coeffs.clone(), l.cst.clone());
            let pinned = poly.with_constraint(eq)?;
            debug!(existential = e, "pinned pair became an equality");
            return enumerate_e(pinned, nvar, nexist, nparam, context, opts);
        }
    }

    // Positive: an existential whose bound pairs are all exact.
    for e in 0..nexist {
        let vi = nvar + e;
        let (lowers, uppers) = bound_pairs(&poly, vi);
        if all_pairs_exact(&poly, vi, &lowers, &uppers)? {
            debug!(existential = e, "exact Fourier projection");
            let projected = fourier_project(&poly, vi, &lowers, &uppers)?;
            return enumerate_e(projected, nvar, nexist - 1, nparam, context, opts);
        }
    }

    // Independent split on a non-exact pair with existential-free bounds.
    for e in 0..nexist {
        let vi = nvar + e;
        let (lowers, uppers) = bound_pairs(&poly, vi);
        for l in &lowers {
            for u in &uppers {
                if pair_exact(&poly, vi, l, u)? {
                    continue;
                }
                if !independent_pair(l, u, nvar, nexist, vi) {
                    continue;
                }
                return split_on_pair(poly, nvar, nexist, nparam, context, vi, l, u, opts);
            }
        }
    }

    Err(CoreError::InvalidInput(
        "existential elimination: no applicable rule for this input".into(),
    ))
}

// ============================================================================
// Equality rule
// ============================================================================

enum Equality {
    Infeasible,
    Reduced {
        poly: Polyhedron,
        guards: Vec<EValue>,
    },
}

/// Eliminate one existential through an equality touching it.
fn equality_rule(
    poly: &Polyhedron,
    nvar: usize,
    nexist: usize,
    nparam: usize,
) -> Result<Option<Equality>, CoreError> {
    let Some(eq) = poly
        .constraints()
        .iter()
        .find(|c| {
            c.kind == ConKind::Equality
                && c.coeffs[nvar..nvar + nexist].iter().any(|x| !x.is_zero())
        })
        .cloned()
    else {
        return Ok(None);
    };
    // Rotate the existential block so the equality touches only the first
    // existential, with positive coefficient g.
    let ee = eq.coeffs[nvar..nvar + nexist].to_vec();
    let (h, w) = crate::arith::col_hermite(&IntMat::from_rows(&[ee]));
    let g = h.at(0, 0).clone();
    debug_assert!(g.is_positive());
    let rotate = |c: &Constraint| -> Constraint {
        let mut coeffs = c.coeffs.clone();
        let rotated = w.vec_mul(&c.coeffs[nvar..nvar + nexist]);
        coeffs[nvar..nvar + nexist].clone_from_slice(&rotated);
        Constraint {
            kind: c.kind,
            coeffs,
            cst: c.cst.clone(),
        }
    };
    let eq = rotate(&eq);
    debug_assert_eq!(eq.coeffs[nvar], g);
    // Remainder R with the pivot existential removed: g·y0 + R = 0.
    let mut r_coeffs = eq.coeffs.clone();
    r_coeffs[nvar] = Int::zero();
    // Substitute g·y0 = −R into every other constraint and drop the column.
    let mut cons: Vec<Constraint> = Vec::new();
    for c in poly.constraints() {
        if c.kind == ConKind::Equality && rotate(c) == eq {
            continue;
        }
        let c = rotate(c);
        let a0 = c.coeffs[nvar].clone();
        let mut coeffs: Vec<Int> = c
            .coeffs
            .iter()
            .zip(&r_coeffs)
            .map(|(s, r)| s * &g - &a0 * r)
            .collect();
        let cst = &c.cst * &g - &a0 * &eq.cst;
        coeffs.remove(nvar);
        cons.push(Constraint {
            kind: c.kind,
            coeffs,
            cst,
        });
    }
    let mut guards: Vec<EValue> = Vec::new();
    if !g.is_one() {
        // Congruence R ≡ 0 (mod g) on the remaining variables.
        let e_v = eq.coeffs[..nvar].to_vec();
        let e_p: Vec<Int> = eq.coeffs[nvar + nexist..].to_vec();
        if e_v.iter().all(Zero::is_zero) {
            if e_p.iter().all(Zero::is_zero) {
                if !eq.cst.mod_floor(&g).is_zero() {
                    return Ok(Some(Equality::Infeasible));
                }
            } else {
                guards.push(param_guard(&e_p, &eq.cst, &g, nvar, nexist));
            }
        } else {
            // Fold the congruence into the counted block by a coset
            // substitution z1 = m·w + t0(p).
            let folded = fold_congruence(&mut cons, &e_v, &e_p, &eq.cst, &g, nvar, nexist)?;
            match folded {
                Some(guard) => guards.extend(guard),
                None => return Ok(Some(Equality::Infeasible)),
            }
        }
    }
    let dim = nvar + nexist - 1 + nparam;
    Ok(Some(Equality::Reduced {
        poly: Polyhedron::from_constraints(dim, cons)?,
        guards,
    }))
}

/// Divisibility guard `{(e_p·p + c)/g} == 0` as an evalue condition over the
/// parameter variables (numbered after the counted block in the result).
fn param_guard(e_p: &[Int], cst: &Int, g: &Int, _nvar: usize, _nexist: usize) -> EValue {
    let coeffs: Vec<Rat> = e_p
        .iter()
        .map(|x| Rat::new(x.clone(), g.clone()))
        .collect();
    let c = Rat::new(cst.clone(), g.clone());
    EValue::Fractional {
        arg: Box::new(EValue::from_affine(&coeffs, &c)),
        coeffs: vec![EValue::zero(), EValue::one()],
    }
}

/// Rewrite `e_v·x + e_p·p + c ≡ 0 (mod g)` as an exact coset substitution of
/// the counted block, mutating the constraint system in place. Returns the
/// parameter guards, or `None` when the congruence is unsatisfiable.
fn fold_congruence(
    cons: &mut Vec<Constraint>,
    e_v: &[Int],
    e_p: &[Int],
    cst: &Int,
    g: &Int,
    nvar: usize,
    nexist: usize,
) -> Result<Option<Vec<EValue>>, CoreError> {
    let gv = content(e_v);
    let prim: Vec<Int> = e_v.iter().map(|x| x / &gv).collect();
    // Counted-block change of basis: z = U x with U's first row the
    // primitive form, so e_v·x = gv·z1.
    let u = unimodular_complete(&prim)?;
    let (uinv, q) = u.inverse().map_err(crate::arith::ArithError::from)?;
    debug_assert!(q.is_one());
    // x = U^{-1} z: counted coefficients transform by a ↦ a·U^{-1}.
    for c in cons.iter_mut() {
        let transformed = uinv.vec_mul(&c.coeffs[..nvar]);
        c.coeffs[..nvar].clone_from_slice(&transformed);
    }
    // gv·z1 + e_p·p + c ≡ 0 (mod g)
    let gp = gv.gcd(g);
    let mut guards = Vec::new();
    if !gp.is_one() {
        // e_p·p + c must vanish mod gcd(gv, g).
        if e_p.iter().all(Zero::is_zero) {
            if !cst.mod_floor(&gp).is_zero() {
                return Ok(None);
            }
        } else {
            guards.push(param_guard(e_p, cst, &gp, nvar, nexist));
        }
    }
    let m = g / &gp;
    if m.is_one() {
        return Ok(Some(guards));
    }
    // z1 ≡ −inv·(e_p·p + c)/gp (mod m) with inv·(gv/gp) ≡ 1 (mod m):
    // substitute z1 = m·w + t0(p), scaling constraints by gp.
    let a = (&gv / &gp).mod_floor(&m);
    let inv = mod_inverse(&a, &m).ok_or_else(|| {
        CoreError::InvalidInput("congruence coefficient is not invertible".into())
    })?;
    // t0(p)·gp = −inv·(e_p·p + c)
    let nparam = e_p.len();
    for c in cons.iter_mut() {
        let z1 = c.coeffs[0].clone();
        for x in c.coeffs.iter_mut() {
            *x = &*x * &gp;
        }
        c.cst = &c.cst * &gp;
        // z1-column now carries gp·z1 = gp·m·w + gp·t0(p).
        c.coeffs[0] = &z1 * &gp * &m;
        let off = c.coeffs.len() - nparam;
        for (j, ep) in e_p.iter().enumerate() {
            c.coeffs[off + j] -= &z1 * &inv * ep;
        }
        c.cst -= &z1 * &inv * cst;
    }
    Ok(Some(guards))
}

fn mod_inverse(a: &Int, m: &Int) -> Option<Int> {
    let e = a.extended_gcd(m);
    if !e.gcd.is_one() {
        return None;
    }
    Some(e.x.mod_floor(m))
}

// ============================================================================
// Line / bounds / projection rules
// ============================================================================

/// Drop a line generator supported on the existential block.
fn line_rule(
    poly: &Polyhedron,
    nvar: usize,
    nexist: usize,
) -> Result<Option<Polyhedron>, CoreError> {
    let line = poly.lines().into_iter().find(|l| {
        l.coords[..nvar].iter().all(Zero::is_zero)
            && l.coords[nvar + nexist..].iter().all(Zero::is_zero)
            && l.coords[nvar..nvar + nexist].iter().any(|x| !x.is_zero())
    });
    let Some(line) = line else {
        return Ok(None);
    };
    let dir = crate::arith::primitive(&line.coords[nvar..nvar + nexist]);
    // Every constraint is orthogonal to the line, so after rotating the
    // existential block to put the line on the first axis, that axis is
    // unconstrained and can be dropped. With W = Uᵀ (first column the line
    // direction), coefficients transform by a ↦ a·W and the first entry is
    // a·dir = 0.
    let u = unimodular_complete(&dir)?;
    let w = u.transpose();
    let mut cons = Vec::new();
    for c in poly.constraints() {
        let mut coeffs = c.coeffs.clone();
        let rotated = w.vec_mul(&c.coeffs[nvar..nvar + nexist]);
        debug_assert!(rotated[0].is_zero(), "constraints are orthogonal to lines");
        coeffs[nvar..nvar + nexist].clone_from_slice(&rotated);
        coeffs.remove(nvar);
        cons.push(Constraint {
            kind: c.kind,
            coeffs,
            cst: c.cst.clone(),
        });
    }
    Ok(Some(Polyhedron::from_constraints(poly.dim() - 1, cons)?))
}

/// Lower (positive coefficient) and upper (negative coefficient) bound
/// constraints on variable `vi`.
fn bound_pairs(poly: &Polyhedron, vi: usize) -> (Vec<Constraint>, Vec<Constraint>) {
    let mut lowers = Vec::new();
    let mut uppers = Vec::new();
    for c in poly.constraints() {
        if c.kind != ConKind::Inequality {
            continue;
        }
        if c.coeffs[vi].is_positive() {
            lowers.push(c.clone());
        } else if c.coeffs[vi].is_negative() {
            uppers.push(c.clone());
        }
    }
    (lowers, uppers)
}

/// Drop variable `vi` and every constraint mentioning it.
fn drop_variable(poly: &Polyhedron, vi: usize) -> Result<Polyhedron, CoreError> {
    let cons: Vec<Constraint> = poly
        .constraints()
        .iter()
        .filter(|c| c.coeffs[vi].is_zero())
        .map(|c| {
            let mut coeffs = c.coeffs.clone();
            coeffs.remove(vi);
            Constraint {
                kind: c.kind,
                coeffs,
                cst: c.cst.clone(),
            }
        })
        .collect();
    Ok(Polyhedron::from_constraints(poly.dim() - 1, cons)?)
}

/// A pair of width zero: the two inequalities together force the equality
/// `α·x_vi + L = 0`.
fn find_pinned_pair<'a>(
    lowers: &'a [Constraint],
    uppers: &'a [Constraint],
) -> Option<(&'a Constraint, &'a Constraint)> {
    for l in lowers {
        for u in uppers {
            let width_zero = l
                .coeffs
                .iter()
                .zip(&u.coeffs)
                .all(|(a, b)| (a + b).is_zero())
                && (&l.cst + &u.cst).is_zero();
            if width_zero {
                return Some((l, u));
            }
        }
    }
    None
}

/// The resolvent `β·L + α·U` of a bound pair, as an existential-free-at-`vi`
/// constraint row.
fn resolvent(l: &Constraint, u: &Constraint, vi: usize) -> (Vec<Int>, Int) {
    let alpha = l.coeffs[vi].clone();
    let beta = -u.coeffs[vi].clone();
    let coeffs: Vec<Int> = l
        .coeffs
        .iter()
        .zip(&u.coeffs)
        .map(|(a, b)| a * &beta + b * &alpha)
        .collect();
    let cst = &l.cst * &beta + &u.cst * &alpha;
    debug_assert!(coeffs[vi].is_zero());
    (coeffs, cst)
}

/// A pair is exact when a unit coefficient makes integer Fourier projection
/// lossless, or when its dark-shadow resolvent is implied by the system.
fn pair_exact(
    poly: &Polyhedron,
    vi: usize,
    l: &Constraint,
    u: &Constraint,
) -> Result<bool, CoreError> {
    let alpha = l.coeffs[vi].clone();
    let beta = -u.coeffs[vi].clone();
    if alpha.is_one() || beta.is_one() {
        return Ok(true);
    }
    // Dark shadow implied: no integer point of P violates
    // βL + αU ≥ αβ − α − β + 1.
    let (coeffs, cst) = resolvent(l, u, vi);
    let threshold = &alpha * &beta - &alpha - &beta + Int::one();
    let gap = poly.with_constraint(Constraint::ineq(
        coeffs.iter().map(|x| -x.clone()).collect(),
        -(&cst - &threshold) - Int::one(),
    ))?;
    Ok(gap.is_empty())
}

fn all_pairs_exact(
    poly: &Polyhedron,
    vi: usize,
    lowers: &[Constraint],
    uppers: &[Constraint],
) -> Result<bool, CoreError> {
    for l in lowers {
        for u in uppers {
            if !pair_exact(poly, vi, l, u)? {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Exact integer Fourier-Motzkin projection of `vi`.
fn fourier_project(
    poly: &Polyhedron,
    vi: usize,
    lowers: &[Constraint],
    uppers: &[Constraint],
) -> Result<Polyhedron, CoreError> {
    let mut cons: Vec<Constraint> = poly
        .constraints()
        .iter()
        .filter(|c| c.coeffs[vi].is_zero())
        .cloned()
        .collect();
    for l in lowers {
        for u in uppers {
            let (coeffs, cst) = resolvent(l, u, vi);
            cons.push(Constraint::ineq(coeffs, cst));
        }
    }
    for c in cons.iter_mut() {
        c.coeffs.remove(vi);
    }
    Ok(Polyhedron::from_constraints(poly.dim() - 1, cons)?)
}

/// Bounds free of every other existential variable.
fn independent_pair(
    l: &Constraint,
    u: &Constraint,
    nvar: usize,
    nexist: usize,
    vi: usize,
) -> bool {
    (nvar..nvar + nexist).all(|j| {
        j == vi || (l.coeffs[j].is_zero() && u.coeffs[j].is_zero())
    })
}

/// Split on the dark-shadow resolvent of a non-exact independent pair.
#[allow(clippy::too_many_arguments)]
fn split_on_pair(
    poly: Polyhedron,
    nvar: usize,
    nexist: usize,
    nparam: usize,
    context: &Polyhedron,
    vi: usize,
    l: &Constraint,
    u: &Constraint,
    opts: &Options,
) -> Result<EValue, CoreError> {
    let alpha = l.coeffs[vi].clone();
    let beta = -u.coeffs[vi].clone();
    let (coeffs, cst) = resolvent(l, u, vi);
    let threshold = &alpha * &beta - &alpha - &beta + Int::one();
    debug!(?alpha, ?beta, "independent split on dark-shadow resolvent");
    // Dark half: the pair is exact there.
    let dark = poly.with_constraint(Constraint::ineq(
        coeffs.clone(),
        &cst - &threshold,
    ))?;
    let mut result = enumerate_e(dark, nvar, nexist, nparam, context, opts)?;
    // Gap half: integer solutions are pinned to α·x_vi + L = i layers.
    let gap = poly.with_constraint(Constraint::ineq(
        coeffs.iter().map(|x| -x.clone()).collect(),
        -(&cst - &threshold) - Int::one(),
    ))?;
    if !gap.is_empty() {
        if nvar != 0 {
            // Overlapping layers combine by inclusion-exclusion, which is
            // only sound on indicator-valued results.
            return Err(CoreError::InvalidInput(
                "existential gap splintering requires an indicator-level query"
                    .into(),
            ));
        }
        let max_i = (&alpha * &beta - &alpha - &beta).div_floor(&beta);
        let mut layered = EValue::zero();
        let mut i = Int::zero();
        while i <= max_i {
            let layer = gap.with_constraint(Constraint::eq(
                l.coeffs.clone(),
                &l.cst - &i,
            ))?;
            let mut sub = enumerate_e(layer, nvar, nexist, nparam, context, opts)?;
            sub.distribute_into_partition();
            eor(&mut layered, &sub);
            i += Int::one();
        }
        result.eadd(&layered);
    }
    result.reduce();
    Ok(result)
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

    fn ints(v: &[i64]) -> Vec<Int> {
        v.iter().map(|&x| int(x)).collect()
    }

    fn poly(dim: usize, ineqs: &[(&[i64], i64)], eqs: &[(&[i64], i64)]) -> Polyhedron {
        let mut cons: Vec<Constraint> = ineqs
            .iter()
            .map(|(c, cst)| Constraint::ineq(ints(c), int(*cst)))
            .collect();
        cons.extend(
            eqs.iter()
                .map(|(c, cst)| Constraint::eq(ints(c), int(*cst))),
        );
        Polyhedron::from_constraints(dim, cons).unwrap()
    }

    #[test]
    fn even_points_via_equality_rule() {
        // #{x : ∃y, x = 2y, 0 ≤ x ≤ p} = ⌊p/2⌋ + 1.
        // Layout (x, y, p).
        let p = poly(
            3,
            &[(&[1, 0, 0], 0), (&[-1, 0, 1], 0)],
            &[(&[1, -2, 0], 0)],
        );
        let e = enumerate_exists(&p, 1, 1, &Options::default()).unwrap();
        for n in 0..12i64 {
            assert_eq!(
                e.eval(&[int(n)]),
                Rat::from_integer(int(n / 2 + 1)),
                "p = {n}"
            );
        }
    }

    #[test]
    fn unit_pair_projects_exactly() {
        // #{x : ∃y, x ≤ y ≤ x + 5, 0 ≤ x ≤ p} = p + 1.
        let p = poly(
            3,
            &[
                (&[-1, 1, 0], 0),
                (&[1, -1, 0], 5),
                (&[1, 0, 0], 0),
                (&[-1, 0, 1], 0),
            ],
            &[],
        );
        let e = enumerate_exists(&p, 1, 1, &Options::default()).unwrap();
        for n in 0..9i64 {
            assert_eq!(e.eval(&[int(n)]), Rat::from_integer(int(n + 1)), "p = {n}");
        }
    }

    #[test]
    fn unbounded_existential_is_absorbed() {
        // #{x : ∃y, y ≥ x, 0 ≤ x ≤ p} = p + 1: y has no upper bound.
        let p = poly(
            3,
            &[(&[-1, 1, 0], 0), (&[1, 0, 0], 0), (&[-1, 0, 1], 0)],
            &[],
        );
        let e = enumerate_exists(&p, 1, 1, &Options::default()).unwrap();
        for n in 0..7i64 {
            assert_eq!(e.eval(&[int(n)]), Rat::from_integer(int(n + 1)), "p = {n}");
        }
    }

    #[test]
    fn pinned_pair_forces_equality() {
        // ∃y with x ≤ y and y ≤ x: y = x, so every 0 ≤ x ≤ p counts.
        let p = poly(
            3,
            &[
                (&[-1, 1, 0], 0),
                (&[1, -1, 0], 0),
                (&[1, 0, 0], 0),
                (&[-1, 0, 1], 0),
            ],
            &[],
        );
        let e = enumerate_exists(&p, 1, 1, &Options::default()).unwrap();
        for n in 0..6i64 {
            assert_eq!(e.eval(&[int(n)]), Rat::from_integer(int(n + 1)), "p = {n}");
        }
    }

    #[test]
    fn indicator_split_matches_brute_force() {
        // [∃x : 2x ≥ p, 3x ≤ p + 5] over p ≥ 0: non-unit pair (2, 3) takes
        // the dark-shadow split with gap layers.
        let p = poly(
            2,
            &[(&[2, -1], 0), (&[-3, 1], 5), (&[0, 1], 0)],
            &[],
        );
        let e = enumerate_exists(&p, 1, 1, &Options::default()).unwrap();
        for n in 0..16i64 {
            let brute = (0..=n + 5)
                .any(|x| 2 * x >= n && 3 * x <= n + 5);
            let expect = i64::from(brute);
            assert_eq!(
                e.eval(&[int(n)]),
                Rat::from_integer(int(expect)),
                "p = {n}"
            );
        }
    }

    #[test]
    fn triple_sum_through_exists_with_zero_existentials() {
        // Σ_{i=5..n} Σ_{j=1..i} Σ_{k=1..j} 1 = n³/6 + n²/2 + n/3 − 20 for
        // n ≥ 5 — the catalogue's base case delegates to plain enumeration.
        let p = poly(
            4,
            &[
                (&[1, 0, 0, 0], -5),
                (&[-1, 0, 0, 1], 0),
                (&[0, 1, 0, 0], -1),
                (&[1, -1, 0, 0], 0),
                (&[0, 0, 1, 0], -1),
                (&[0, 1, -1, 0], 0),
            ],
            &[],
        );
        let e = enumerate_exists(&p, 0, 1, &Options::default()).unwrap();
        for n in 5..10i64 {
            let expect = n * n * n / 6 + n * n / 2 + n / 3 - 20;
            assert_eq!(e.eval(&[int(n)]), Rat::from_integer(int(expect)), "n = {n}");
        }
    }

    #[test]
    fn cancellation_is_checked_on_entry() {
        let p = poly(3, &[(&[1, 0, 0], 0)], &[]);
        let opts = Options::default();
        opts.cancel.cancel();
        assert!(matches!(
            enumerate_exists(&p, 1, 1, &opts),
            Err(CoreError::Cancelled)
        ));
    }
}
