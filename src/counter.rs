//! Scalar counting and parametric enumeration
//!
//! Both paths follow Brion's theorem: the generating function of a polytope
//! is the sum over its vertices of the rational generating functions of the
//! supporting cones, each polar-decomposed into unimodular cones. A generic
//! integer vector λ (never orthogonal to a cone ray) specializes every
//! term to a univariate series in `t`; the count is the signed sum of the
//! `t^d` quotient coefficients.
//!
//! The scalar path accumulates exact rationals; the parametric path keeps
//! the numerator exponent symbolic — the `t^d` quotient coefficient becomes
//! a polynomial in one formal exponent `n`, evaluated at the lattice-point
//! representative `n(p) = λ·L(p)` through the quasi-polynomial algebra —
//! and chambers the parameter space so each cell carries the vertices
//! active on it.

use num::{Integer, One, Signed, Zero};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::arith::{dot, IntMat};
use crate::cone::{decompose_polar, Cone, DecomposeSink};
use crate::evalue::{rat_poly_of, EValue};
use crate::genfun::GenFun;
use crate::lattice_point::{
    lattice_point, lattice_point_scalar, lattice_point_vector, VertexForm,
};
use crate::options::{CountStrategy, Options};
use crate::polyhedron::{
    chamber_decompose, ConKind, Constraint, Generator, Polyhedron, RemoveEqualities,
};
use crate::series::{quotient_in_degree, DPoly, DPolyR};
use crate::todd::ToddCounter;
use crate::{CoreError, Int, Rat};

const MAX_TRY: u32 = 10;

// ============================================================================
// Generic vector search
// ============================================================================

/// Find an integer vector not orthogonal to any of the given rows by
/// bounded random search: ranges of growing magnitude, [`MAX_TRY`] draws
/// each, up to `50·dim` ranges.
fn find_lambda(
    rows: &[Vec<Int>],
    dim: usize,
    rng: &mut StdRng,
) -> Result<Vec<Int>, CoreError> {
    debug_assert!(dim > 0);
    let mut tries = 0u32;
    for range in 1..=50 * dim as u32 {
        let bound = (range + 1) as i64;
        for _ in 0..MAX_TRY {
            tries += 1;
            let lambda: Vec<Int> = (0..dim)
                .map(|_| Int::from(rng.gen_range(-bound..=bound)))
                .collect();
            if lambda.iter().all(Zero::is_zero) {
                continue;
            }
            if rows.iter().all(|r| !dot(&lambda, r).is_zero()) {
                return Ok(lambda);
            }
        }
    }
    Err(CoreError::LambdaSearchFailed { tries })
}

// ============================================================================
// Piece collection
// ============================================================================

struct PieceCollector {
    pieces: Vec<(Cone, i32)>,
}

impl DecomposeSink for PieceCollector {
    fn on_cone(&mut self, cone: &Cone, sign: i32) -> Result<(), CoreError> {
        self.pieces.push((cone.clone(), sign));
        Ok(())
    }
    fn on_polar_cone(&mut self, cone: &Cone, sign: i32) -> Result<(), CoreError> {
        self.pieces.push((cone.clone(), sign));
        Ok(())
    }
}

fn vertex_pieces(
    poly: &Polyhedron,
    vertex: &Generator,
    opts: &Options,
) -> Result<Vec<(Cone, i32)>, CoreError> {
    let normals = poly.supporting_cone(vertex)?;
    let mut sink = PieceCollector { pieces: Vec::new() };
    decompose_polar(&normals, &mut sink, opts)?;
    Ok(sink.pieces)
}

// ============================================================================
// Scalar count
// ============================================================================

/// Exact number of integer points of a bounded polyhedron.
///
/// Equalities are removed first (the unimodular back-substitution is a
/// lattice bijection, so the count is unchanged); an unbounded input is an
/// error the public API maps to the sentinel `-1`.
pub fn count(poly: &Polyhedron, opts: &Options) -> Result<Int, CoreError> {
    if poly.is_empty() {
        return Ok(Int::zero());
    }
    let lowered = match lower_scalar(poly)? {
        None => return Ok(Int::zero()),
        Some(p) => p,
    };
    if lowered.is_empty() {
        return Ok(Int::zero());
    }
    if lowered.dim() == 0 {
        return Ok(Int::one());
    }
    if !lowered.is_bounded() {
        return Err(CoreError::Unbounded);
    }
    count_full_dim(&lowered, opts)
}

/// Iterate equality removal until the polyhedron is full-dimensional,
/// converting implicit equalities (inequalities tight on every generator)
/// as they surface. `None` means no integer points.
fn lower_scalar(poly: &Polyhedron) -> Result<Option<Polyhedron>, CoreError> {
    let mut cur = poly.clone();
    loop {
        cur = match cur.remove_equalities()? {
            RemoveEqualities::Empty | RemoveEqualities::NoIntegerPoints => return Ok(None),
            RemoveEqualities::Lowered { poly, .. } => poly,
        };
        if cur.is_empty() {
            return Ok(Some(cur));
        }
        let implicit: Vec<Constraint> = cur
            .constraints()
            .iter()
            .filter(|c| c.kind == ConKind::Inequality && always_tight(&cur, c))
            .cloned()
            .collect();
        if implicit.is_empty() {
            return Ok(Some(cur));
        }
        let mut cons = cur.constraints().to_vec();
        for c in cons.iter_mut() {
            if implicit.contains(c) {
                c.kind = ConKind::Equality;
            }
        }
        cur = Polyhedron::from_constraints(cur.dim(), cons)?;
    }
}

fn always_tight(poly: &Polyhedron, c: &Constraint) -> bool {
    poly.generators().iter().all(|g| {
        let v = dot(&c.coeffs, &g.coords) + &c.cst * &g.denom;
        v.is_zero()
    })
}

fn count_full_dim(poly: &Polyhedron, opts: &Options) -> Result<Int, CoreError> {
    let dim = poly.dim();
    let vertices = poly.vertices();
    let mut per_vertex: Vec<(Vec<Rat>, Vec<(Cone, i32)>)> = Vec::new();
    for v in &vertices {
        per_vertex.push((v.vertex_rat(), vertex_pieces(poly, v, opts)?));
    }
    let rows: Vec<Vec<Int>> = per_vertex
        .iter()
        .flat_map(|(_, pieces)| pieces.iter())
        .flat_map(|(c, _)| (0..dim).map(|k| c.rays().row_vec(k)))
        .collect();
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let lambda = find_lambda(&rows, dim, &mut rng)?;
    debug!(?lambda, vertices = vertices.len(), "scalar count specialization");

    let total = match opts.strategy {
        CountStrategy::TruncatedSeries => {
            let mut acc = Rat::zero();
            for (vrat, pieces) in &per_vertex {
                for (cone, sign) in pieces {
                    acc += piece_contribution(cone, vrat, &lambda, *sign)?;
                }
            }
            acc
        }
        CountStrategy::ToddLocal => {
            let mut counter = ToddCounter::new(dim, lambda.clone());
            for (vrat, pieces) in &per_vertex {
                for (cone, sign) in pieces {
                    counter.handle(cone, vrat, *sign)?;
                }
            }
            counter.count().clone()
        }
    };
    if !total.is_integer() {
        return Err(CoreError::InvalidInput(format!(
            "count accumulated to the non-integer {total}"
        )));
    }
    Ok(total.to_integer())
}

/// One unimodular cone's signed contribution on the truncated-series path.
fn piece_contribution(
    cone: &Cone,
    vertex: &[Rat],
    lambda: &[Int],
    sign: i32,
) -> Result<Rat, CoreError> {
    let d = cone.dim();
    let mut n = lattice_point_scalar(cone, vertex, lambda)?;
    let mut flips = 0usize;
    let mut den = DPoly::factor(d, &Int::one());
    let mut first = true;
    for k in 0..d {
        let w = dot(lambda, cone.rays().row(k));
        debug_assert!(!w.is_zero(), "lambda must be generic");
        let aw = if w.is_negative() {
            let a = -w;
            n += &a;
            a
        } else {
            flips += 1;
            w
        };
        let f = DPoly::factor(d, &aw);
        if first {
            den = f;
            first = false;
        } else {
            den.mul_assign(&f);
        }
    }
    let num = DPoly::new(d, &n, 0);
    let s = if flips % 2 == 0 { sign } else { -sign };
    Ok(num.div_top(&den, s))
}

// ============================================================================
// Parametric enumeration
// ============================================================================

/// Piecewise quasi-polynomial counting function of a parametric polytope.
///
/// `poly` lives in the combined space (counted variables first, then
/// parameters); `context` constrains the parameters. The result is a
/// partition evalue over the context whose value at each integer parameter
/// point equals the count of the specialized polytope.
pub fn enumerate(
    poly: &Polyhedron,
    nvar: usize,
    context: &Polyhedron,
    opts: &Options,
) -> Result<EValue, CoreError> {
    let nparam = poly.dim() - nvar;
    debug_assert_eq!(context.dim(), nparam);
    if poly.is_empty() {
        return Ok(EValue::zero());
    }
    let lowering = lower_parametric(poly, nvar)?;
    let Some(lowering) = lowering else {
        return Ok(EValue::zero());
    };
    let mut context = context.clone();
    for eq in &lowering.param_eqs {
        context = context.with_constraint(eq.clone())?;
    }
    if context.is_empty() {
        return Ok(EValue::zero());
    }
    let body = &lowering.poly;
    // Bounded in the counted directions for every parameter value.
    for g in body.generators() {
        if g.kind != crate::polyhedron::GenKind::Vertex
            && g.coords[lowering.nvar..].iter().all(Zero::is_zero)
            && g.coords[..lowering.nvar].iter().any(|x| !x.is_zero())
        {
            return Err(CoreError::Unbounded);
        }
    }
    let mut result = if lowering.nvar == 0 {
        // Nothing left to count: 1 on the substituted domain.
        let mut domain = context.clone();
        for c in body.constraints() {
            domain = domain.with_constraint(c.clone())?;
        }
        EValue::Partition {
            pieces: vec![(domain, EValue::one())],
        }
    } else {
        enumerate_full(body, lowering.nvar, &context, opts)?
    };
    // Divisibility conditions from the equality compression gate the count.
    for cond in lowering.conditions.into_iter().rev() {
        result = EValue::Relation {
            cond: Box::new(cond),
            if_zero: Box::new(result),
            otherwise: None,
        };
    }
    result.distribute_into_partition();
    result.reduce();
    Ok(result)
}

struct ParamLowering {
    poly: Polyhedron,
    nvar: usize,
    /// Fractional-part arguments that must vanish for a counted point to
    /// exist (divisibility of the equality system in the parameters).
    conditions: Vec<EValue>,
    /// Equalities induced on the parameters alone.
    param_eqs: Vec<Constraint>,
}

/// Remove equalities from the combined polyhedron, keeping track of the
/// divisibility conditions they impose on the parameters. `None` means the
/// system is inconsistent.
fn lower_parametric(
    poly: &Polyhedron,
    nvar: usize,
) -> Result<Option<ParamLowering>, CoreError> {
    let nparam = poly.dim() - nvar;
    let eqs: Vec<&Constraint> = poly
        .constraints()
        .iter()
        .filter(|c| c.kind == ConKind::Equality)
        .collect();
    if eqs.is_empty() {
        return Ok(Some(ParamLowering {
            poly: poly.clone(),
            nvar,
            conditions: Vec::new(),
            param_eqs: Vec::new(),
        }));
    }
    // E_x x = b(p): column Hermite on the counted part.
    let ex = IntMat::from_rows(
        &eqs.iter()
            .map(|c| c.coeffs[..nvar].to_vec())
            .collect::<Vec<_>>(),
    );
    // b rows as affine forms over (p, 1).
    let b: Vec<Vec<Rat>> = eqs
        .iter()
        .map(|c| {
            let mut row: Vec<Rat> = c.coeffs[nvar..]
                .iter()
                .map(|x| Rat::from_integer(-x.clone()))
                .collect();
            row.push(Rat::from_integer(-c.cst.clone()));
            row
        })
        .collect();
    let (h, w) = crate::arith::col_hermite(&ex);
    let mut y: Vec<Option<Vec<Rat>>> = vec![None; nvar];
    let mut conditions = Vec::new();
    let mut param_eqs = Vec::new();
    let mut c = 0usize;
    for t in 0..eqs.len() {
        let mut acc = b[t].clone();
        for (j, yj) in y.iter().enumerate().take(c) {
            let f = h.at(t, j);
            if f.is_zero() {
                continue;
            }
            let yj = yj.as_ref().expect("pivot already solved");
            for (a, v) in acc.iter_mut().zip(yj) {
                *a -= Rat::from_integer(f.clone()) * v;
            }
        }
        if c < nvar && !h.at(t, c).is_zero() {
            let piv = Rat::from_integer(h.at(t, c).clone());
            // Divisibility: acc(p) ≡ 0 (mod pivot) for an integer solution.
            if !h.at(t, c).abs().is_one() {
                let scaled: Vec<Rat> = acc.iter().map(|a| a / &piv).collect();
                let (coeffs, cst) = scaled.split_at(nparam);
                let arg = EValue::from_affine(coeffs, &cst[0]);
                let cond = EValue::Fractional {
                    arg: Box::new(arg),
                    coeffs: vec![EValue::zero(), EValue::one()],
                };
                conditions.push(cond);
            }
            y[c] = Some(acc.iter().map(|a| a / &piv).collect());
            c += 1;
        } else if acc.iter().any(|a| !a.is_zero()) {
            // No pivot: the affine form must vanish on the parameters.
            let denom = acc
                .iter()
                .fold(Int::one(), |d, a| d.lcm(a.denom()));
            let row: Vec<Int> = acc
                .iter()
                .map(|a| a.numer() * (&denom / a.denom()))
                .collect();
            let (coeffs, cst) = row.split_at(nparam);
            if coeffs.iter().all(Zero::is_zero) {
                if !cst[0].is_zero() {
                    return Ok(None);
                }
            } else {
                param_eqs.push(Constraint::eq(coeffs.to_vec(), cst[0].clone()));
            }
        }
    }
    let nfree = nvar - c;
    // x = W·y with y = (pivot forms in p | free integer variables):
    // build the transformed inequality system over (y_free, p).
    let mut cons: Vec<Constraint> = Vec::new();
    for con in poly.constraints() {
        if con.kind != ConKind::Inequality {
            continue;
        }
        // Free-variable coefficients: a·W restricted to free columns.
        let aw = w.vec_mul(&con.coeffs[..nvar]);
        let free_coeffs: Vec<Int> = (c..nvar).map(|j| aw[j].clone()).collect();
        // Parameter part: a·W_pivot·y_pivot(p) + b·p + c.
        let mut prow: Vec<Rat> = con.coeffs[nvar..]
            .iter()
            .map(|x| Rat::from_integer(x.clone()))
            .collect();
        prow.push(Rat::from_integer(con.cst.clone()));
        for (j, yj) in y.iter().enumerate().take(c) {
            if aw[j].is_zero() {
                continue;
            }
            let yj = yj.as_ref().expect("pivot solved");
            for (a, v) in prow.iter_mut().zip(yj) {
                *a += Rat::from_integer(aw[j].clone()) * v;
            }
        }
        let denom = prow.iter().fold(Int::one(), |d, a| d.lcm(a.denom()));
        let mut coeffs: Vec<Int> = free_coeffs.iter().map(|x| x * &denom).collect();
        coeffs.extend(
            prow[..nparam]
                .iter()
                .map(|a| a.numer() * (&denom / a.denom())),
        );
        let cst = prow[nparam].numer() * (&denom / prow[nparam].denom());
        cons.push(Constraint::ineq(coeffs, cst));
    }
    Ok(Some(ParamLowering {
        poly: Polyhedron::from_constraints(nfree + nparam, cons)?,
        nvar: nfree,
        conditions,
        param_eqs,
    }))
}

fn enumerate_full(
    poly: &Polyhedron,
    nvar: usize,
    context: &Polyhedron,
    opts: &Options,
) -> Result<EValue, CoreError> {
    let d = nvar;
    let (verts, chambers) = chamber_decompose(poly, nvar, context)?;
    debug!(
        vertices = verts.len(),
        chambers = chambers.len(),
        "parametric enumeration"
    );
    // Decompose every vertex cone once; chambers reuse the pieces.
    let mut per_vertex: Vec<Vec<(Cone, i32)>> = Vec::new();
    for pv in &verts {
        if opts.cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let mut sink = PieceCollector { pieces: Vec::new() };
        decompose_polar(&pv.cone_normals, &mut sink, opts)?;
        per_vertex.push(sink.pieces);
    }
    let rows: Vec<Vec<Int>> = per_vertex
        .iter()
        .flatten()
        .flat_map(|(c, _)| (0..d).map(|k| c.rays().row_vec(k)))
        .collect();
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let lambda = find_lambda(&rows, d, &mut rng)?;

    // Symbolic contribution of every vertex.
    let mut contributions: Vec<EValue> = Vec::new();
    for (pv, pieces) in verts.iter().zip(&per_vertex) {
        if opts.cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let form = VertexForm {
            rows: (0..pv.vertex.n_rows())
                .map(|i| pv.vertex.row_vec(i))
                .collect(),
            denom: pv.denom.clone(),
        };
        let mut acc = EValue::zero();
        for (cone, sign) in pieces {
            let mut n = lattice_point(cone, &form, &lambda, Some(&pv.domain))?;
            let mut flips = 0usize;
            let mut den = DPoly::factor(d, &Int::one());
            let mut first = true;
            for k in 0..d {
                let wk = dot(&lambda, cone.rays().row(k));
                let aw = if wk.is_negative() {
                    let a = -wk;
                    n.eadd(&EValue::from_int(a.clone()));
                    a
                } else {
                    flips += 1;
                    wk
                };
                let f = DPoly::factor(d, &aw);
                if first {
                    den = f;
                    first = false;
                } else {
                    den.mul_assign(&f);
                }
            }
            let qpoly = quotient_in_degree(d, &den);
            let mut term = rat_poly_of(&qpoly, &n);
            let s = if flips % 2 == 0 { *sign } else { -*sign };
            if s < 0 {
                term.negate();
            }
            acc.eadd(&term);
        }
        acc.reduce();
        contributions.push(acc);
    }

    let mut pieces: Vec<(Polyhedron, EValue)> = Vec::new();
    for ch in chambers {
        // Two parametric vertices may coincide as affine functions on a
        // boundary cell (their domains close onto each other); the cell
        // carries each geometric vertex once.
        let mut active: Vec<usize> = Vec::new();
        for &vi in &ch.vertices {
            let dup = active
                .iter()
                .any(|&vj| vertices_coincide_on(&verts[vj], &verts[vi], &ch.domain));
            if !dup {
                active.push(vi);
            }
        }
        let mut value = EValue::zero();
        for &vi in &active {
            value.eadd(&contributions[vi]);
        }
        value.reduce_in_domain(&ch.domain);
        value.reduce();
        if value.is_zero() {
            continue;
        }
        pieces.push((ch.domain, value));
    }
    let mut out = EValue::Partition { pieces };
    out.reduce();
    Ok(out)
}

/// Whether two parametric vertices evaluate to the same point everywhere on
/// `domain`: each coordinate of the cross-scaled difference must be the
/// constant zero over it.
fn vertices_coincide_on(
    a: &crate::polyhedron::ParamVertex,
    b: &crate::polyhedron::ParamVertex,
    domain: &Polyhedron,
) -> bool {
    let cols = a.vertex.n_cols();
    for i in 0..a.vertex.n_rows() {
        let row: Vec<Int> = (0..cols)
            .map(|j| a.vertex.at(i, j) * &b.denom - b.vertex.at(i, j) * &a.denom)
            .collect();
        if row.iter().all(Zero::is_zero) {
            continue;
        }
        let (coeffs, cst) = row.split_at(cols - 1);
        let mut form = coeffs.to_vec();
        form.resize(domain.dim(), Int::zero());
        match domain.affine_range(&form, &cst[0]) {
            Some((lo, hi)) if lo.is_zero() && hi.is_zero() => {}
            _ => return false,
        }
    }
    true
}

// ============================================================================
// Generating function construction
// ============================================================================

/// Multivariate rational generating function `Σ_p |P(p) ∩ Z^d| x^p` of a
/// pointed combined polyhedron over `nvar` counted variables and
/// `nparam = dim − nvar` parameters.
pub fn series(poly: &Polyhedron, nvar: usize, opts: &Options) -> Result<GenFun, CoreError> {
    let dim = poly.dim();
    let nparam = dim - nvar;
    let mut gf = GenFun::new(nparam);
    if poly.is_empty() {
        return Ok(gf);
    }
    if !poly.lines().is_empty() {
        return Err(CoreError::InvalidInput(
            "generating function requires a pointed polyhedron".into(),
        ));
    }
    let lowered = match lower_scalar(poly)? {
        None => return Ok(gf),
        Some(p) => p,
    };
    // Equality lowering changes coordinates; for the generating function we
    // need the original parameter exponents, so only accept input that is
    // already full-dimensional.
    if lowered.dim() != dim {
        return Err(CoreError::InvalidInput(
            "generating function requires a full-dimensional polyhedron".into(),
        ));
    }
    let vertices = lowered.vertices();
    let mut per_vertex: Vec<(Vec<Rat>, Vec<(Cone, i32)>)> = Vec::new();
    for v in &vertices {
        per_vertex.push((v.vertex_rat(), vertex_pieces(&lowered, v, opts)?));
    }
    // λ lives on the counted coordinates only; it must miss every ray whose
    // counted part is non-zero.
    let rows: Vec<Vec<Int>> = per_vertex
        .iter()
        .flat_map(|(_, pieces)| pieces.iter())
        .flat_map(|(c, _)| (0..dim).map(|k| c.rays().row(k)[..nvar].to_vec()))
        .filter(|r| r.iter().any(|x| !x.is_zero()))
        .collect();
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let lambda = if nvar == 0 {
        Vec::new()
    } else {
        find_lambda(&rows, nvar, &mut rng)?
    };

    for (vrat, pieces) in &per_vertex {
        if opts.cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        for (cone, sign) in pieces {
            reduce_term_into(&mut gf, cone, vrat, &lambda, *sign, nvar, nparam)?;
        }
    }
    Ok(gf)
}

/// One denominator factor of a partially specialized term: counted weight
/// `s = λ·ρ_x` and symbolic parameter direction `p = ρ_p`.
struct Factor {
    s: Int,
    p: Vec<Int>,
}

/// Partial specialization of one cone term: counted directions specialize
/// through the truncated series in `t`, parameter directions stay symbolic.
fn reduce_term_into(
    gf: &mut GenFun,
    cone: &Cone,
    vertex: &[Rat],
    lambda: &[Int],
    sign: i32,
    nvar: usize,
    nparam: usize,
) -> Result<(), CoreError> {
    let dim = nvar + nparam;
    let mut l = lattice_point_vector(cone, vertex)?;
    let mut coeff_sign = sign;
    let mut pure_var: Vec<Int> = Vec::new();
    let mut pure_param: Vec<Vec<Int>> = Vec::new();
    let mut mixed: Vec<Factor> = Vec::new();
    for k in 0..dim {
        let row = cone.rays().row(k);
        let mut s = dot(lambda, &row[..nvar]);
        let mut p = row[nvar..].to_vec();
        if s.is_negative() || (s.is_zero() && leading_negative(&p)) {
            // 1/(1−x^ρ) = −x^{−ρ}/(1−x^{−ρ})
            coeff_sign = -coeff_sign;
            for (li, ri) in l.iter_mut().zip(row) {
                *li -= ri;
            }
            s = -s;
            for x in p.iter_mut() {
                *x = -x.clone();
            }
        }
        if s.is_zero() {
            if p.iter().all(Zero::is_zero) {
                return Err(CoreError::InvalidInput(
                    "lambda is orthogonal to a counted ray".into(),
                ));
            }
            pure_param.push(p);
        } else if p.iter().all(Zero::is_zero) {
            pure_var.push(s);
        } else {
            mixed.push(Factor { s, p });
        }
    }
    let v = pure_var.len();
    let n_s = dot(lambda, &l[..nvar]);
    let l_p = l[nvar..].to_vec();
    let mut series = DPolyR::new_seeded(v, &n_s, l_p);
    let mut den_rows: Vec<Vec<Int>> = pure_param;
    for fac in &mixed {
        // 1/(1−(1+t)^s x^r) = Σ_j ((1+t)^s−1)^j x^{jr} (1−x^r)^{v−j}
        //                      / (1−x^r)^{v+1}
        let base = {
            let b = DPoly::new(v, &fac.s, 0);
            let mut coeffs: Vec<Int> = (0..=v).map(|k| b.coeff(k).clone()).collect();
            coeffs[0] -= Int::one();
            DPoly::from_coeffs(coeffs)
        };
        series = expansion_product(&series, &base, fac, v);
        for _ in 0..=v {
            den_rows.push(fac.p.clone());
        }
    }
    let mut den: Option<DPoly> = None;
    for s in &pure_var {
        let f = DPoly::factor(v, s);
        match den.as_mut() {
            None => den = Some(f),
            Some(d) => d.mul_assign(&f),
        }
    }
    let quotient = match den {
        None => series,
        Some(d) => series.div_scalar(&d),
    };
    // Each pure-var factor came from 1/(1−(1+t)^s) = −(1/t)·1/f_s.
    let s_total = if v % 2 == 1 { -coeff_sign } else { coeff_sign };
    let scale = Rat::new(Int::from(s_total), quotient.denom().clone());
    let rows: Vec<(Vec<Int>, Int)> = quotient
        .coeff_rows(v)
        .map(|(k, c)| (k.clone(), c.clone()))
        .collect();
    for (key, c) in rows {
        let coeff = &scale * Rat::from_integer(c);
        gf.add(&coeff, &key, &den_rows);
    }
    Ok(())
}

fn leading_negative(p: &[Int]) -> bool {
    p.iter()
        .find(|x| !x.is_zero())
        .is_some_and(Signed::is_negative)
}

/// `series · Σ_j base^j x^{j·r} (1−x^r)^{v−j}` truncated at `t^{v+1}`.
fn expansion_product(series: &DPolyR, base: &DPoly, fac: &Factor, v: usize) -> DPolyR {
    let mut acc: Option<DPolyR> = None;
    let mut base_pow = DPoly::new(v, &Int::zero(), 0); // 1
    for j in 0..=v {
        let mut piece = series.clone();
        let coeffs: Vec<Int> = (0..=v).map(|k| base_pow.coeff(k).clone()).collect();
        let shift: Vec<Int> = fac.p.iter().map(|x| x * Int::from(j as i64)).collect();
        piece.mul_keyed_poly(&coeffs, &shift);
        for _ in 0..v - j {
            piece.mul_one_minus_key(&fac.p);
        }
        match acc.as_mut() {
            None => acc = Some(piece),
            Some(a) => a.add_assign(&piece),
        }
        base_pow.mul_assign(base);
    }
    acc.expect("at least one expansion term")
}

// ============================================================================
// Tests
// ============================================================================
