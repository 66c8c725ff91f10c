//! Rational polyhedra and the gateway surface consumed by the counting core
//!
//! A [`Polyhedron`] carries both descriptions of a rational convex set in
//! `Q^d`: the constraint form (affine inequalities `a·x + c ≥ 0` and
//! equalities) and the generator form (lines, rays, and vertices with a
//! common denominator column). Conversion between the two is an exact
//! Chernikova-style double description over [`Int`] with combinatorial
//! (saturation-set) adjacency.
//!
//! The public surface is the capability set the counting core consumes:
//! vertices/rays, supporting cones, cone triangulation, equality removal with
//! back-substitution, images under integer affine maps, intersection,
//! complementary halfspace splits, emptiness, and the parametric chamber
//! decomposition. General set difference is deliberately absent; the core
//! only ever subtracts along single facets, which [`Polyhedron::split`]
//! covers exactly over the integer lattice.
//!
//! Inequalities are gcd-normalized with a floored constant. This tightens
//! the rational body onto its integer shadow in that direction, which is
//! invariant for every integer-point computation in this crate.

#![allow(missing_docs)]

use itertools::Itertools;
use num::{Integer, One, Signed, Zero};

use crate::arith::{self, content, dot, primitive, IntMat, IntSolve};
use crate::{Int, Rat};

/// Errors surfaced by the polyhedral layer.
#[derive(Debug, thiserror::Error)]
pub enum PolyError {
    #[error("constraint has {got} coefficients, polyhedron has dimension {dim}")]
    BadConstraint { got: usize, dim: usize },
    #[error("triangulation exceeded the ray budget ({limit})")]
    RayBudget { limit: usize },
    #[error("point is not a vertex of the polyhedron")]
    NotAVertex,
    #[error(transparent)]
    Arith(#[from] crate::arith::ArithError),
}

// ============================================================================
// Constraints and generators
// ============================================================================

/// Constraint kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConKind {
    /// `coeffs·x + cst ≥ 0`
    Inequality,
    /// `coeffs·x + cst = 0`
    Equality,
}

/// An affine constraint over the ambient space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constraint {
    pub kind: ConKind,
    pub coeffs: Vec<Int>,
    pub cst: Int,
}

impl Constraint {
    pub fn ineq(coeffs: Vec<Int>, cst: Int) -> Self {
        Self {
            kind: ConKind::Inequality,
            coeffs,
            cst,
        }
    }

    pub fn eq(coeffs: Vec<Int>, cst: Int) -> Self {
        Self {
            kind: ConKind::Equality,
            coeffs,
            cst,
        }
    }

    /// Value of the affine form at an integer point.
    pub fn eval(&self, x: &[Int]) -> Int {
        dot(&self.coeffs, x) + &self.cst
    }

    /// Whether the constraint holds at an integer point.
    pub fn holds(&self, x: &[Int]) -> bool {
        let v = self.eval(x);
        match self.kind {
            ConKind::Inequality => !v.is_negative(),
            ConKind::Equality => v.is_zero(),
        }
    }

    /// Gcd-normalize. Inequalities get a floored constant, which keeps the
    /// set of integer solutions intact while shrinking the rational body.
    fn normalized(&self) -> Self {
        let g = content(&self.coeffs);
        if g.is_zero() {
            return self.clone();
        }
        match self.kind {
            ConKind::Inequality => Self {
                kind: self.kind,
                coeffs: self.coeffs.iter().map(|c| c / &g).collect(),
                cst: arith::floor_div(&self.cst, &g),
            },
            ConKind::Equality => {
                let full = g.gcd(&self.cst);
                if full.is_one() || full.is_zero() {
                    return self.clone();
                }
                Self {
                    kind: self.kind,
                    coeffs: self.coeffs.iter().map(|c| c / &full).collect(),
                    cst: &self.cst / &full,
                }
            }
        }
    }
}

/// Generator kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenKind {
    Line,
    Ray,
    Vertex,
}

/// A generator: a line or ray direction (`denom = 0`) or a vertex
/// `coords / denom` with `denom ≥ 1`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Generator {
    pub kind: GenKind,
    pub coords: Vec<Int>,
    pub denom: Int,
}

impl Generator {
    /// Vertex coordinates as exact rationals.
    pub fn vertex_rat(&self) -> Vec<Rat> {
        debug_assert_eq!(self.kind, GenKind::Vertex);
        self.coords
            .iter()
            .map(|c| Rat::new(c.clone(), self.denom.clone()))
            .collect()
    }
}

// ============================================================================
// Double description (homogeneous core)
// ============================================================================

/// Generators of the homogeneous cone `{y : a·y ≥ 0 ∀a ∈ ineqs,
/// e·y = 0 ∀e ∈ eqs}` in dimension `n`: `(lines, rays)`, all primitive.
fn dd_cone(n: usize, ineqs: &[Vec<Int>], eqs: &[Vec<Int>]) -> (Vec<Vec<Int>>, Vec<Vec<Int>>) {
    let mut lines: Vec<Vec<Int>> = (0..n)
        .map(|i| {
            let mut e = vec![Int::zero(); n];
            e[i] = Int::one();
            e
        })
        .collect();
    let mut rays: Vec<Vec<Int>> = Vec::new();
    let mut processed: Vec<Vec<Int>> = Vec::new();

    for e in eqs {
        if let Some(k) = lines.iter().position(|l| !dot(e, l).is_zero()) {
            let mut l0 = lines.remove(k);
            if dot(e, &l0).is_negative() {
                for c in l0.iter_mut() {
                    *c = -c.clone();
                }
            }
            let p = dot(e, &l0);
            for l in lines.iter_mut() {
                *l = combine_primitive(&p, l, &dot(e, l), &l0);
            }
            for r in rays.iter_mut() {
                *r = combine_primitive(&p, r, &dot(e, r), &l0);
            }
        } else {
            rays = cut_to_hyperplane(e, rays, &processed);
        }
    }

    for a in ineqs {
        if let Some(k) = lines.iter().position(|l| !dot(a, l).is_zero()) {
            let mut l0 = lines.remove(k);
            if dot(a, &l0).is_negative() {
                for c in l0.iter_mut() {
                    *c = -c.clone();
                }
            }
            let p = dot(a, &l0);
            for l in lines.iter_mut() {
                *l = combine_primitive(&p, l, &dot(a, l), &l0);
            }
            for r in rays.iter_mut() {
                *r = combine_primitive(&p, r, &dot(a, r), &l0);
            }
            rays.push(l0);
        } else {
            rays = cut_to_halfspace(a, rays, &processed);
        }
        processed.push(a.clone());
    }

    (lines, rays)
}

/// `p·v - q·w`, reduced to a primitive vector (`p > 0`).
fn combine_primitive(p: &Int, v: &[Int], q: &Int, w: &[Int]) -> Vec<Int> {
    let raw: Vec<Int> = v.iter().zip(w).map(|(x, y)| p * x - q * y).collect();
    primitive(&raw)
}

fn saturation(r: &[Int], processed: &[Vec<Int>]) -> Vec<bool> {
    processed.iter().map(|a| dot(a, r).is_zero()).collect()
}

/// Two rays are adjacent iff no third ray saturates every processed
/// constraint that both of them saturate.
fn adjacent(i: usize, j: usize, sats: &[Vec<bool>]) -> bool {
    let common: Vec<usize> = (0..sats[i].len())
        .filter(|&t| sats[i][t] && sats[j][t])
        .collect();
    for (k, sk) in sats.iter().enumerate() {
        if k == i || k == j {
            continue;
        }
        if common.iter().all(|&t| sk[t]) {
            return false;
        }
    }
    true
}

fn cut_to_halfspace(a: &[Int], rays: Vec<Vec<Int>>, processed: &[Vec<Int>]) -> Vec<Vec<Int>> {
    let vals: Vec<Int> = rays.iter().map(|r| dot(a, r)).collect();
    let sats: Vec<Vec<bool>> = rays.iter().map(|r| saturation(r, processed)).collect();
    let mut out: Vec<Vec<Int>> = Vec::new();
    for (r, v) in rays.iter().zip(&vals) {
        if !v.is_negative() {
            out.push(r.clone());
        }
    }
    for i in 0..rays.len() {
        if !vals[i].is_positive() {
            continue;
        }
        for j in 0..rays.len() {
            if !vals[j].is_negative() {
                continue;
            }
            if !adjacent(i, j, &sats) {
                continue;
            }
            out.push(combine_primitive(&vals[i], &rays[j], &vals[j], &rays[i]));
        }
    }
    out
}

fn cut_to_hyperplane(e: &[Int], rays: Vec<Vec<Int>>, processed: &[Vec<Int>]) -> Vec<Vec<Int>> {
    let vals: Vec<Int> = rays.iter().map(|r| dot(e, r)).collect();
    let sats: Vec<Vec<bool>> = rays.iter().map(|r| saturation(r, processed)).collect();
    let mut out: Vec<Vec<Int>> = Vec::new();
    for (r, v) in rays.iter().zip(&vals) {
        if v.is_zero() {
            out.push(r.clone());
        }
    }
    for i in 0..rays.len() {
        if !vals[i].is_positive() {
            continue;
        }
        for j in 0..rays.len() {
            if !vals[j].is_negative() {
                continue;
            }
            if !adjacent(i, j, &sats) {
                continue;
            }
            out.push(combine_primitive(&vals[i], &rays[j], &vals[j], &rays[i]));
        }
    }
    out
}

// ============================================================================
// Polyhedron
// ============================================================================

/// A rational convex polyhedron with both descriptions materialized.
#[derive(Clone, Debug)]
pub struct Polyhedron {
    dim: usize,
    cons: Vec<Constraint>,
    gens: Vec<Generator>,
}

impl Polyhedron {
    /// Build from constraints; the generator form is computed immediately.
    pub fn from_constraints(dim: usize, cons: Vec<Constraint>) -> Result<Self, PolyError> {
        for c in &cons {
            if c.coeffs.len() != dim {
                return Err(PolyError::BadConstraint {
                    got: c.coeffs.len(),
                    dim,
                });
            }
        }
        let cons: Vec<Constraint> = cons.iter().map(Constraint::normalized).collect();
        // Homogenize: y = (x, ξ), ξ ≥ 0 first.
        let mut ineqs: Vec<Vec<Int>> = Vec::with_capacity(cons.len() + 1);
        let mut eqs: Vec<Vec<Int>> = Vec::new();
        let mut xi = vec![Int::zero(); dim + 1];
        xi[dim] = Int::one();
        ineqs.push(xi);
        for c in &cons {
            let mut row = c.coeffs.clone();
            row.push(c.cst.clone());
            match c.kind {
                ConKind::Inequality => ineqs.push(row),
                ConKind::Equality => eqs.push(row),
            }
        }
        let (lines, rays) = dd_cone(dim + 1, &ineqs, &eqs);
        let gens = interpret_homogeneous(dim, lines, rays);
        Ok(Self { dim, cons, gens })
    }

    /// Build from generators; the constraint form is computed immediately
    /// through the dual double description.
    pub fn from_generators(dim: usize, gens: Vec<Generator>) -> Result<Self, PolyError> {
        let mut ineqs: Vec<Vec<Int>> = Vec::new();
        let mut eqs: Vec<Vec<Int>> = Vec::new();
        for g in &gens {
            if g.coords.len() != dim {
                return Err(PolyError::BadConstraint {
                    got: g.coords.len(),
                    dim,
                });
            }
            let mut row = g.coords.clone();
            row.push(match g.kind {
                GenKind::Vertex => g.denom.clone(),
                _ => Int::zero(),
            });
            match g.kind {
                GenKind::Line => eqs.push(row),
                _ => ineqs.push(row),
            }
        }
        // Every constraint (a, c) must satisfy a·g + c·den ≥ 0; the valid
        // constraints are exactly the dual cone of the homogenized gens.
        let (dual_lines, dual_rays) = dd_cone(dim + 1, &ineqs, &eqs);
        let mut cons: Vec<Constraint> = Vec::new();
        for l in dual_lines {
            let (coeffs, cst) = split_last(&l);
            cons.push(Constraint::eq(coeffs, cst));
        }
        for r in dual_rays {
            let (coeffs, cst) = split_last(&r);
            if coeffs.iter().all(Zero::is_zero) {
                continue; // the trivial ξ ≥ 0 witness
            }
            cons.push(Constraint::ineq(coeffs, cst));
        }
        Self::from_constraints(dim, cons)
    }

    /// Universe polyhedron `Q^dim`.
    pub fn universe(dim: usize) -> Self {
        Self::from_constraints(dim, Vec::new()).expect("universe is well-formed")
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.cons
    }

    pub fn generators(&self) -> &[Generator] {
        &self.gens
    }

    /// Vertices as `(coords, denom)` pairs.
    pub fn vertices(&self) -> Vec<&Generator> {
        self.gens
            .iter()
            .filter(|g| g.kind == GenKind::Vertex)
            .collect()
    }

    /// Rays (infinite directions), excluding lines.
    pub fn rays(&self) -> Vec<&Generator> {
        self.gens
            .iter()
            .filter(|g| g.kind == GenKind::Ray)
            .collect()
    }

    /// Lines (bidirectional infinite directions).
    pub fn lines(&self) -> Vec<&Generator> {
        self.gens
            .iter()
            .filter(|g| g.kind == GenKind::Line)
            .collect()
    }

    /// A polyhedron with no vertex generator contains no point at all.
    pub fn is_empty(&self) -> bool {
        self.vertices().is_empty()
    }

    /// Bounded iff there is no infinite direction.
    pub fn is_bounded(&self) -> bool {
        self.gens.iter().all(|g| g.kind == GenKind::Vertex)
    }

    /// Whether an integer point satisfies every constraint.
    pub fn contains_int(&self, x: &[Int]) -> bool {
        self.cons.iter().all(|c| c.holds(x))
    }

    /// Intersection: union of the constraint systems.
    pub fn intersect(&self, other: &Polyhedron) -> Result<Polyhedron, PolyError> {
        debug_assert_eq!(self.dim, other.dim);
        let mut cons = self.cons.clone();
        cons.extend(other.cons.iter().cloned());
        Polyhedron::from_constraints(self.dim, cons)
    }

    /// Add one constraint.
    pub fn with_constraint(&self, c: Constraint) -> Result<Polyhedron, PolyError> {
        let mut cons = self.cons.clone();
        cons.push(c);
        Polyhedron::from_constraints(self.dim, cons)
    }

    /// Split along `form·x + cst ≥ 0` into the closed positive part and the
    /// integer complement `−form·x − cst − 1 ≥ 0`. The two parts partition
    /// the integer points of `self`.
    pub fn split(&self, form: &[Int], cst: &Int) -> Result<(Polyhedron, Polyhedron), PolyError> {
        let pos = self.with_constraint(Constraint::ineq(form.to_vec(), cst.clone()))?;
        let neg = self.with_constraint(Constraint::ineq(
            form.iter().map(|c| -c.clone()).collect(),
            -cst - Int::one(),
        ))?;
        Ok((pos, neg))
    }

    /// Supporting cone of the polyhedron at one of its vertices, as the list
    /// of active inequality normals (the cone is `{ξ : a·ξ ≥ 0}` over them).
    pub fn supporting_cone(&self, v: &Generator) -> Result<Vec<Vec<Int>>, PolyError> {
        if v.kind != GenKind::Vertex {
            return Err(PolyError::NotAVertex);
        }
        let mut normals: Vec<Vec<Int>> = Vec::new();
        for c in &self.cons {
            let val = dot(&c.coeffs, &v.coords) + &c.cst * &v.denom;
            match c.kind {
                ConKind::Inequality if val.is_zero() => {
                    let n = primitive(&c.coeffs);
                    if !normals.contains(&n) {
                        normals.push(n);
                    }
                }
                ConKind::Equality => {
                    debug_assert!(val.is_zero(), "vertex violates an equality");
                }
                _ => {}
            }
        }
        if normals.is_empty() {
            return Err(PolyError::NotAVertex);
        }
        Ok(normals)
    }

    /// Image under the integer affine map `y = M x + t`. Generators map
    /// forward; the constraint form is rebuilt from the images.
    pub fn image(&self, m: &IntMat, t: &[Int]) -> Result<Polyhedron, PolyError> {
        debug_assert_eq!(m.n_cols(), self.dim);
        debug_assert_eq!(m.n_rows(), t.len());
        let gens = self
            .gens
            .iter()
            .map(|g| {
                let mut coords = m.mul_vec(&g.coords);
                match g.kind {
                    GenKind::Vertex => {
                        for (c, ti) in coords.iter_mut().zip(t) {
                            *c += ti * &g.denom;
                        }
                        Generator {
                            kind: GenKind::Vertex,
                            coords,
                            denom: g.denom.clone(),
                        }
                    }
                    kind => Generator {
                        kind,
                        coords: primitive(&coords),
                        denom: Int::zero(),
                    },
                }
            })
            .collect();
        Polyhedron::from_generators(m.n_rows(), gens)
    }

    /// Preimage under the integer affine map `x = M y + t`: constraints pull
    /// back exactly.
    pub fn preimage(&self, m: &IntMat, t: &[Int]) -> Result<Polyhedron, PolyError> {
        debug_assert_eq!(m.n_rows(), self.dim);
        debug_assert_eq!(t.len(), self.dim);
        let cons = self
            .cons
            .iter()
            .map(|c| {
                let coeffs = m.vec_mul(&c.coeffs);
                let cst = dot(&c.coeffs, t) + &c.cst;
                Constraint {
                    kind: c.kind,
                    coeffs,
                    cst,
                }
            })
            .collect();
        Polyhedron::from_constraints(m.n_cols(), cons)
    }

    /// Drop the coordinates listed in `drop` (projection along axes).
    pub fn project_out(&self, drop: &[usize]) -> Result<Polyhedron, PolyError> {
        let keep: Vec<usize> = (0..self.dim).filter(|i| !drop.contains(i)).collect();
        let mut m = IntMat::zero(keep.len(), self.dim);
        for (r, &i) in keep.iter().enumerate() {
            m.set(r, i, Int::one());
        }
        self.image(&m, &vec![Int::zero(); keep.len()])
    }

    /// Exact range of the affine form `form·x + cst` over the polyhedron.
    /// Returns `None` on an empty polyhedron or when the form is unbounded
    /// in either direction.
    pub fn affine_range(&self, form: &[Int], cst: &Int) -> Option<(Rat, Rat)> {
        if self.is_empty() {
            return None;
        }
        for g in &self.gens {
            if g.kind != GenKind::Vertex && !dot(form, &g.coords).is_zero() {
                return None;
            }
        }
        let mut lo: Option<Rat> = None;
        let mut hi: Option<Rat> = None;
        for v in self.vertices() {
            let val = Rat::new(dot(form, &v.coords), v.denom.clone())
                + Rat::from_integer(cst.clone());
            if lo.as_ref().map_or(true, |l| val < *l) {
                lo = Some(val.clone());
            }
            if hi.as_ref().map_or(true, |h| val > *h) {
                hi = Some(val);
            }
        }
        Some((lo?, hi?))
    }

    /// Remove explicit equalities: returns the lowered polyhedron together
    /// with the affine back-substitution `x = particular + basis·y`.
    pub fn remove_equalities(&self) -> Result<RemoveEqualities, PolyError> {
        let eqs: Vec<&Constraint> = self
            .cons
            .iter()
            .filter(|c| c.kind == ConKind::Equality)
            .collect();
        if eqs.is_empty() {
            return Ok(RemoveEqualities::Lowered {
                poly: self.clone(),
                particular: vec![Int::zero(); self.dim],
                basis: IntMat::identity(self.dim),
            });
        }
        let e = IntMat::from_rows(&eqs.iter().map(|c| c.coeffs.clone()).collect::<Vec<_>>());
        let b: Vec<Int> = eqs.iter().map(|c| -c.cst.clone()).collect();
        let (particular, null_basis) = match arith::solve_integer(&e, &b) {
            IntSolve::Inconsistent => return Ok(RemoveEqualities::Empty),
            IntSolve::RationalOnly => return Ok(RemoveEqualities::NoIntegerPoints),
            IntSolve::Solution {
                particular,
                null_basis,
            } => (particular, null_basis),
        };
        // basis columns span the solution lattice: x = x0 + B y.
        let new_dim = null_basis.len();
        let mut basis = IntMat::zero(self.dim, new_dim);
        for (j, col) in null_basis.iter().enumerate() {
            for i in 0..self.dim {
                basis.set(i, j, col[i].clone());
            }
        }
        let cons = self
            .cons
            .iter()
            .filter(|c| c.kind == ConKind::Inequality)
            .map(|c| {
                let coeffs = basis.vec_mul(&c.coeffs);
                let cst = dot(&c.coeffs, &particular) + &c.cst;
                Constraint::ineq(coeffs, cst)
            })
            .collect();
        Ok(RemoveEqualities::Lowered {
            poly: Polyhedron::from_constraints(new_dim, cons)?,
            particular,
            basis,
        })
    }
}

/// Result of [`Polyhedron::remove_equalities`].
#[derive(Clone, Debug)]
pub enum RemoveEqualities {
    /// The equality system is rationally inconsistent.
    Empty,
    /// Rational solutions exist but integer ones do not.
    NoIntegerPoints,
    /// Lowered polyhedron plus the back-substitution `x = particular + basis·y`.
    Lowered {
        poly: Polyhedron,
        particular: Vec<Int>,
        basis: IntMat,
    },
}

fn split_last(row: &[Int]) -> (Vec<Int>, Int) {
    let (last, rest) = row.split_last().expect("non-empty row");
    (rest.to_vec(), last.clone())
}

fn interpret_homogeneous(dim: usize, lines: Vec<Vec<Int>>, rays: Vec<Vec<Int>>) -> Vec<Generator> {
    let mut gens = Vec::new();
    for l in lines {
        let (coords, xi) = split_last(&l);
        debug_assert!(xi.is_zero(), "lines live at infinity");
        gens.push(Generator {
            kind: GenKind::Line,
            coords,
            denom: Int::zero(),
        });
    }
    for r in rays {
        let (coords, xi) = split_last(&r);
        if xi.is_zero() {
            if coords.iter().all(Zero::is_zero) {
                continue;
            }
            gens.push(Generator {
                kind: GenKind::Ray,
                coords,
                denom: Int::zero(),
            });
        } else {
            gens.push(Generator {
                kind: GenKind::Vertex,
                coords,
                denom: xi,
            });
        }
    }
    gens
}

// ============================================================================
// Cone triangulation
// ============================================================================

/// Facet normals (inner-pointing) of the cone generated by `rays`.
pub fn cone_facets(dim: usize, rays: &[Vec<Int>]) -> (Vec<Vec<Int>>, Vec<Vec<Int>>) {
    dd_cone(dim, rays, &[])
}

/// Rays of the cone `{x : a·x ≥ 0 ∀a ∈ normals}`.
pub fn cone_from_normals(dim: usize, normals: &[Vec<Int>]) -> (Vec<Vec<Int>>, Vec<Vec<Int>>) {
    dd_cone(dim, normals, &[])
}

fn rank(rows: &[Vec<Int>]) -> usize {
    if rows.is_empty() {
        return 0;
    }
    let cols = rows[0].len();
    let mut m: Vec<Vec<Rat>> = rows
        .iter()
        .map(|r| r.iter().map(|x| Rat::from_integer(x.clone())).collect())
        .collect();
    let mut rank = 0usize;
    for c in 0..cols {
        let Some(p) = (rank..m.len()).find(|&i| !m[i][c].is_zero()) else {
            continue;
        };
        m.swap(rank, p);
        let piv = m[rank][c].clone();
        for i in 0..m.len() {
            if i == rank || m[i][c].is_zero() {
                continue;
            }
            let f = &m[i][c] / &piv;
            for j in c..cols {
                let s = &m[rank][j] * &f;
                m[i][j] -= s;
            }
        }
        rank += 1;
        if rank == m.len() {
            break;
        }
    }
    rank
}

/// Pulling triangulation of a pointed cone given by its rays: returns
/// simplicial ray lists whose union partitions the cone (overlaps are
/// lower-dimensional). `max_rays` caps the working ray count (`0` = none).
pub fn triangulate_cone(
    dim: usize,
    rays: &[Vec<Int>],
    max_rays: usize,
) -> Result<Vec<Vec<Vec<Int>>>, PolyError> {
    if max_rays != 0 && rays.len() > max_rays {
        return Err(PolyError::RayBudget { limit: max_rays });
    }
    let rays = {
        let mut seen: Vec<Vec<Int>> = Vec::with_capacity(rays.len());
        for r in rays {
            let r = primitive(r);
            if !seen.contains(&r) {
                seen.push(r);
            }
        }
        seen
    };
    let rk = rank(&rays);
    if rays.len() == rk {
        return Ok(vec![rays.to_vec()]);
    }
    let (_, facet_normals) = cone_facets(dim, &rays);
    let apex = &rays[0];
    let mut out = Vec::new();
    for f in &facet_normals {
        if dot(f, apex).is_zero() {
            continue; // facet contains the pulling ray
        }
        let sub: Vec<Vec<Int>> = rays
            .iter()
            .filter(|r| dot(f, r).is_zero())
            .cloned()
            .collect();
        if sub.is_empty() {
            continue;
        }
        for mut simplex in triangulate_cone(dim, &sub, max_rays)? {
            simplex.push(apex.clone());
            out.push(simplex);
        }
    }
    Ok(out)
}

// ============================================================================
// Parametric vertices & chambers
// ============================================================================

/// A parametric vertex of a combined polyhedron over `(x, p)`.
///
/// `vertex` is a `d × (m+1)` matrix of affine forms in the parameters (last
/// column constant) over the common positive denominator `denom`; the
/// supporting cone is `{ξ : a·ξ ≥ 0}` over `cone_normals`; `domain` is the
/// closure of the parameter region where this vertex is active.
#[derive(Clone, Debug)]
pub struct ParamVertex {
    pub vertex: IntMat,
    pub denom: Int,
    pub cone_normals: Vec<Vec<Int>>,
    pub domain: Polyhedron,
}

/// A chamber: a parameter region (disjoint from every other chamber over
/// `Z^m`) together with the indices of the parametric vertices active on it.
#[derive(Clone, Debug)]
pub struct Chamber {
    pub domain: Polyhedron,
    pub vertices: Vec<usize>,
}

/// Enumerate the parametric vertices of a combined polyhedron over
/// `(x ∈ Q^nvar, p ∈ Q^nparam)` and decompose the context into chambers.
///
/// The chambers partition the integer points of `context`: overlaps are
/// removed by complementary facet splits in insertion order.
pub fn chamber_decompose(
    poly: &Polyhedron,
    nvar: usize,
    context: &Polyhedron,
) -> Result<(Vec<ParamVertex>, Vec<Chamber>), PolyError> {
    let nparam = poly.dim() - nvar;
    debug_assert_eq!(context.dim(), nparam);
    let ineqs: Vec<&Constraint> = poly
        .constraints()
        .iter()
        .filter(|c| c.kind == ConKind::Inequality)
        .collect();

    let mut vertices: Vec<ParamVertex> = Vec::new();
    for subset in (0..ineqs.len()).combinations(nvar) {
        let xpart = IntMat::from_rows(
            &subset
                .iter()
                .map(|&i| ineqs[i].coeffs[..nvar].to_vec())
                .collect::<Vec<_>>(),
        );
        let Ok((inv, den)) = xpart.inverse() else {
            continue;
        };
        // Solve X x = -(B p + c): x(p) = -inv (B p + c) / den.
        let mut rhs = IntMat::zero(nvar, nparam + 1);
        for (r, &i) in subset.iter().enumerate() {
            for j in 0..nparam {
                rhs.set(r, j, -ineqs[i].coeffs[nvar + j].clone());
            }
            rhs.set(r, nparam, -ineqs[i].cst.clone());
        }
        let mut vm = inv.mul(&rhs);
        let mut denom = den;
        if denom.is_negative() {
            denom = -denom;
            for i in 0..nvar {
                for j in 0..nparam + 1 {
                    let v = -vm.at(i, j).clone();
                    vm.set(i, j, v);
                }
            }
        }
        // Reduce to the canonical (matrix, denominator) pair.
        let mut g = denom.clone();
        for i in 0..nvar {
            for j in 0..nparam + 1 {
                g = g.gcd(vm.at(i, j));
            }
        }
        if !g.is_one() && !g.is_zero() {
            denom = &denom / &g;
            for i in 0..nvar {
                for j in 0..nparam + 1 {
                    let v = vm.at(i, j) / &g;
                    vm.set(i, j, v);
                }
            }
        }
        if vertices
            .iter()
            .any(|pv| pv.vertex == vm && pv.denom == denom)
        {
            continue;
        }
        // Substitute into every constraint: active set and activity domain.
        let mut cone_normals = Vec::new();
        let mut domain_rows = Vec::new();
        for c in &ineqs {
            let sub = substitute_vertex(c, &vm, &denom, nvar, nparam);
            if sub.iter().all(Zero::is_zero) {
                cone_normals.push(c.coeffs[..nvar].to_vec());
            } else {
                domain_rows.push(Constraint::ineq(
                    sub[..nparam].to_vec(),
                    sub[nparam].clone(),
                ));
            }
        }
        if cone_normals.len() < nvar {
            continue; // numerically impossible; basis rows are always active
        }
        let domain =
            Polyhedron::from_constraints(nparam, domain_rows)?.intersect(context)?;
        if domain.is_empty() {
            continue;
        }
        vertices.push(ParamVertex {
            vertex: vm,
            denom,
            cone_normals,
            domain,
        });
    }

    // Refine the context into cells, splitting on each vertex domain.
    let mut cells: Vec<Chamber> = vec![Chamber {
        domain: context.clone(),
        vertices: Vec::new(),
    }];
    for (vi, pv) in vertices.iter().enumerate() {
        let mut next: Vec<Chamber> = Vec::new();
        for cell in cells {
            let inside = cell.domain.intersect(&pv.domain)?;
            if !inside.is_empty() {
                let mut verts = cell.vertices.clone();
                verts.push(vi);
                next.push(Chamber {
                    domain: inside,
                    vertices: verts,
                });
            }
            // The complement, carved facet by facet.
            let mut carved = cell.domain.clone();
            for c in pv.domain.constraints() {
                if c.kind != ConKind::Inequality {
                    continue;
                }
                let (pos, neg) = carved.split(&c.coeffs, &c.cst)?;
                if !neg.is_empty() {
                    next.push(Chamber {
                        domain: neg,
                        vertices: cell.vertices.clone(),
                    });
                }
                carved = pos;
                if carved.is_empty() {
                    break;
                }
            }
        }
        cells = next;
    }
    cells.retain(|c| !c.vertices.is_empty() && !c.domain.is_empty());
    Ok((vertices, cells))
}

/// Row of the substituted constraint `a·x(p) + b·p + c`, scaled by the
/// positive vertex denominator: length `nparam + 1` (constant last).
fn substitute_vertex(
    c: &Constraint,
    vm: &IntMat,
    denom: &Int,
    nvar: usize,
    nparam: usize,
) -> Vec<Int> {
    let mut row = vec![Int::zero(); nparam + 1];
    for j in 0..nparam {
        row[j] = &c.coeffs[nvar + j] * denom;
    }
    row[nparam] = &c.cst * denom;
    for i in 0..nvar {
        for j in 0..nparam + 1 {
            row[j] += &c.coeffs[i] * vm.at(i, j);
        }
    }
    primitive_row_signed(row)
}

/// Divide a row by its content, keeping orientation.
fn primitive_row_signed(row: Vec<Int>) -> Vec<Int> {
    let g = content(&row);
    if g.is_zero() || g.is_one() {
        return row;
    }
    row.iter().map(|x| x / &g).collect()
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

    /// `{0 ≤ x ≤ a, 0 ≤ y ≤ b}`
    fn rect(a: i64, b: i64) -> Polyhedron {
        Polyhedron::from_constraints(
            2,
            vec![
                Constraint::ineq(ints(&[1, 0]), int(0)),
                Constraint::ineq(ints(&[-1, 0]), int(a)),
                Constraint::ineq(ints(&[0, 1]), int(0)),
                Constraint::ineq(ints(&[0, -1]), int(b)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rectangle_has_four_vertices() {
        let p = rect(3, 2);
        assert!(p.is_bounded());
        assert!(!p.is_empty());
        let mut vs: Vec<Vec<Int>> = p
            .vertices()
            .into_iter()
            .map(|v| {
                assert!(v.denom.is_one());
                v.coords.clone()
            })
            .collect();
        vs.sort();
        assert_eq!(
            vs,
            vec![ints(&[0, 0]), ints(&[0, 2]), ints(&[3, 0]), ints(&[3, 2])]
        );
    }

    #[test]
    fn empty_polyhedron_detected() {
        let p = Polyhedron::from_constraints(
            1,
            vec![
                Constraint::ineq(ints(&[1]), int(0)),
                Constraint::ineq(ints(&[-1]), int(-1)),
            ],
        )
        .unwrap();
        assert!(p.is_empty());
    }

    #[test]
    fn cone_and_rays() {
        // {x ≥ 0, y ≥ 0}: one vertex at the origin, two rays.
        let p = Polyhedron::from_constraints(
            2,
            vec![
                Constraint::ineq(ints(&[1, 0]), int(0)),
                Constraint::ineq(ints(&[0, 1]), int(0)),
            ],
        )
        .unwrap();
        assert!(!p.is_bounded());
        assert_eq!(p.vertices().len(), 1);
        let mut rays: Vec<Vec<Int>> = p.rays().into_iter().map(|r| r.coords.clone()).collect();
        rays.sort();
        assert_eq!(rays, vec![ints(&[0, 1]), ints(&[1, 0])]);
    }

    #[test]
    fn supporting_cone_at_rect_corner() {
        let p = rect(3, 2);
        let origin = p
            .vertices()
            .into_iter()
            .find(|v| v.coords.iter().all(Zero::is_zero))
            .unwrap()
            .clone();
        let mut normals = p.supporting_cone(&origin).unwrap();
        normals.sort();
        assert_eq!(normals, vec![ints(&[0, 1]), ints(&[1, 0])]);
    }

    #[test]
    fn gcd_tightening_shrinks_to_integer_shadow() {
        // 0 ≤ 2x ≤ 5 tightens to 0 ≤ x ≤ 2.
        let p = Polyhedron::from_constraints(
            1,
            vec![
                Constraint::ineq(ints(&[2]), int(0)),
                Constraint::ineq(ints(&[-2]), int(5)),
            ],
        )
        .unwrap();
        let (lo, hi) = p.affine_range(&ints(&[1]), &int(0)).unwrap();
        assert_eq!(lo, Rat::from_integer(int(0)));
        assert_eq!(hi, Rat::from_integer(int(2)));
    }

    #[test]
    fn split_partitions_integer_points() {
        let p = rect(4, 1);
        let (pos, neg) = p.split(&ints(&[1, 0]), &int(-2)).unwrap();
        // pos: x ≥ 2; neg: x ≤ 1.
        for x in 0..=4i64 {
            for y in 0..=1i64 {
                let pt = ints(&[x, y]);
                let in_pos = pos.contains_int(&pt);
                let in_neg = neg.contains_int(&pt);
                assert!(in_pos ^ in_neg, "point must be in exactly one part");
            }
        }
    }

    #[test]
    fn remove_equalities_lowered() {
        // {x + y = 3, 0 ≤ x ≤ 3} lowers to a segment.
        let p = Polyhedron::from_constraints(
            2,
            vec![
                Constraint::eq(ints(&[1, 1]), int(-3)),
                Constraint::ineq(ints(&[1, 0]), int(0)),
                Constraint::ineq(ints(&[-1, 0]), int(3)),
            ],
        )
        .unwrap();
        match p.remove_equalities().unwrap() {
            RemoveEqualities::Lowered {
                poly,
                particular,
                basis,
            } => {
                assert_eq!(poly.dim(), 1);
                // Back-substitution maps integer points of the segment onto
                // integer points of the original line piece.
                assert_eq!(dot(&ints(&[1, 1]), &particular), int(3));
                let dir = basis.col_vec(0);
                assert_eq!(dot(&ints(&[1, 1]), &dir), int(0));
            }
            other => panic!("expected lowering, got {other:?}"),
        }
    }

    #[test]
    fn equalities_without_integer_points() {
        let p = Polyhedron::from_constraints(
            2,
            vec![Constraint::eq(ints(&[2, 2]), int(-1))],
        )
        .unwrap();
        assert!(matches!(
            p.remove_equalities().unwrap(),
            RemoveEqualities::NoIntegerPoints | RemoveEqualities::Empty
        ));
    }

    #[test]
    fn triangulate_square_cone() {
        // Cone over the four rays of the xy-quadrant "pyramid" in 3D.
        let rays = vec![
            ints(&[1, 0, 1]),
            ints(&[0, 1, 1]),
            ints(&[-1, 0, 1]),
            ints(&[0, -1, 1]),
        ];
        let tris = triangulate_cone(3, &rays, 0).unwrap();
        assert!(tris.len() >= 2);
        for t in &tris {
            assert_eq!(t.len(), 3);
            assert_eq!(rank(t), 3);
        }
    }

    #[test]
    fn chamber_decompose_interval() {
        // {0 ≤ x ≤ p} over context p ≥ 0: one chamber, two parametric verts.
        let p = Polyhedron::from_constraints(
            2,
            vec![
                Constraint::ineq(ints(&[1, 0]), int(0)),
                Constraint::ineq(ints(&[-1, 1]), int(0)),
            ],
        )
        .unwrap();
        let ctx = Polyhedron::from_constraints(
            1,
            vec![Constraint::ineq(ints(&[1]), int(0))],
        )
        .unwrap();
        let (verts, chambers) = chamber_decompose(&p, 1, &ctx).unwrap();
        assert_eq!(verts.len(), 2);
        assert_eq!(chambers.len(), 1);
        assert_eq!(chambers[0].vertices.len(), 2);
    }

    #[test]
    fn image_projection_drops_coordinates() {
        let p = rect(3, 2);
        let q = p.project_out(&[1]).unwrap();
        assert_eq!(q.dim(), 1);
        let (lo, hi) = q.affine_range(&ints(&[1]), &int(0)).unwrap();
        assert_eq!(lo, Rat::from_integer(int(0)));
        assert_eq!(hi, Rat::from_integer(int(3)));
    }
}
