//! Signed decomposition of simplicial cones into unimodular cones
//!
//! Implements Barvinok's short-vector recursion: a simplicial cone with
//! `|det| > 1` is split into children obtained by replacing one ray with an
//! integer vector `z` whose coordinates in the ray basis are small (found by
//! LLL-reducing the inverse ray matrix). Child determinants are strictly
//! smaller in absolute value, so the work list terminates; the signed
//! indicator functions of the emitted unimodular cones sum to the input
//! cone's indicator modulo lower-dimensional faces.
//!
//! Consumers receive cones through the [`DecomposeSink`] capability — one
//! method for primal pieces and one for pieces that travelled through the
//! polar pipeline (dualized back before delivery) — instead of subclass
//! hierarchies.

use num::{One, Signed, Zero};
use tracing::trace;

use crate::arith::{self, max_abs, primitive, IntMat};
use crate::options::Options;
use crate::polyhedron::{self, PolyError};
use crate::{CoreError, Int};

/// A simplicial cone: `d` linearly independent rays (rows) and the cached
/// determinant of the ray matrix.
#[derive(Clone, Debug)]
pub struct Cone {
    rays: IntMat,
    det: Int,
}

impl Cone {
    /// Build from a square ray matrix; the determinant must be non-zero.
    pub fn new(rays: IntMat) -> Result<Self, CoreError> {
        if rays.n_rows() != rays.n_cols() {
            return Err(CoreError::InvalidInput(format!(
                "cone ray matrix is {}x{}",
                rays.n_rows(),
                rays.n_cols()
            )));
        }
        let det = rays.determinant().map_err(crate::arith::ArithError::from)?;
        if det.is_zero() {
            return Err(CoreError::InvalidInput(
                "cone ray matrix is singular".into(),
            ));
        }
        Ok(Self { rays, det })
    }

    /// Ambient (and intrinsic) dimension.
    #[inline]
    pub fn dim(&self) -> usize {
        self.rays.n_rows()
    }

    /// Ray matrix, one ray per row.
    #[inline]
    pub fn rays(&self) -> &IntMat {
        &self.rays
    }

    /// Determinant of the ray matrix.
    #[inline]
    pub fn det(&self) -> &Int {
        &self.det
    }

    /// Unimodular iff `|det| = 1`.
    pub fn is_unimodular(&self) -> bool {
        self.det.abs().is_one()
    }

    /// Polar dual cone. For ray matrix `R` the polar has one ray per column
    /// of `-R^{-1}`, cleared to integers and made primitive.
    pub fn polar(&self) -> Result<Cone, CoreError> {
        let (inv, _q) = self
            .rays
            .inverse()
            .map_err(crate::arith::ArithError::from)?;
        let d = self.dim();
        let rows: Vec<Vec<Int>> = (0..d)
            .map(|j| {
                let col: Vec<Int> = (0..d).map(|i| -inv.at(i, j).clone()).collect();
                primitive(&col)
            })
            .collect();
        Cone::new(IntMat::from_rows(&rows))
    }

    /// Shortest row of the LLL-reduced inverse basis, as the integer
    /// combination `z` of the rays plus its (scaled) ray-basis coordinates.
    /// Ties on the minimal max-abs break toward the smallest row index.
    fn short_vector(&self, opts: &Options) -> (Vec<Int>, Vec<Int>) {
        let (inv, _q) = self
            .rays
            .inverse()
            .expect("non-singular by construction");
        let (reduced, u) = arith::lll(&inv, opts.lll_delta);
        let mut best = 0usize;
        let mut best_norm = max_abs(reduced.row(0));
        for i in 1..reduced.n_rows() {
            let norm = max_abs(reduced.row(i));
            if norm < best_norm {
                best = i;
                best_norm = norm;
            }
        }
        let mut z = u.row_vec(best);
        let mut lambda = reduced.row_vec(best);
        // Orient z into the half where some coordinate is positive; when it
        // sits on the wrong side of every facet, flip it.
        if lambda.iter().all(|l| !l.is_positive()) {
            for c in z.iter_mut() {
                *c = -c.clone();
            }
            for l in lambda.iter_mut() {
                *l = -l.clone();
            }
        }
        (z, lambda)
    }
}

/// Consumer capability for decomposition output.
///
/// `on_cone` receives primal unimodular pieces from [`decompose`];
/// `on_polar_cone` receives pieces produced by [`decompose_polar`], already
/// dualized back into the primal space.
pub trait DecomposeSink {
    /// Receive one unimodular piece of a primal decomposition.
    fn on_cone(&mut self, cone: &Cone, sign: i32) -> Result<(), CoreError>;
    /// Receive one unimodular piece that travelled through the polar
    /// pipeline and has been dualized back.
    fn on_polar_cone(&mut self, cone: &Cone, sign: i32) -> Result<(), CoreError>;
}

fn sign_of(x: &Int) -> i32 {
    if x.is_negative() {
        -1
    } else {
        1
    }
}

/// Decompose a simplicial cone into signed unimodular cones, delivering each
/// piece to `sink.on_cone`. The accumulated signed indicator equals
/// `sign · 𝟙_cone` on the interior at every point of the emission sequence.
pub fn decompose(
    cone: &Cone,
    sign: i32,
    sink: &mut dyn DecomposeSink,
    opts: &Options,
) -> Result<(), CoreError> {
    decompose_with(cone, sign, opts, &mut |c, s| sink.on_cone(c, s))
}

fn decompose_with(
    cone: &Cone,
    sign: i32,
    opts: &Options,
    emit: &mut dyn FnMut(&Cone, i32) -> Result<(), CoreError>,
) -> Result<(), CoreError> {
    let root_sign = sign_of(cone.det());
    let mut work: Vec<Cone> = Vec::new();
    if cone.is_unimodular() {
        opts.stats.record_base_cone();
        return emit(cone, sign);
    }
    work.push(cone.clone());
    while let Some(c) = work.pop() {
        if opts.cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let (z, lambda) = c.short_vector(opts);
        trace!(det = %c.det(), ?z, "splitting cone on short vector");
        for i in 0..c.dim() {
            if lambda[i].is_zero() {
                continue;
            }
            let mut rays = c.rays().clone();
            rays.set_row(i, &z);
            let child = Cone::new(rays)?;
            debug_assert!(
                child.det().abs() < c.det().abs(),
                "child determinant must shrink"
            );
            if child.is_unimodular() {
                opts.stats.record_base_cone();
                emit(&child, sign * root_sign * sign_of(child.det()))?;
            } else {
                work.push(child);
            }
        }
    }
    Ok(())
}

/// Polar decomposition pipeline for a vertex cone given by its active
/// constraint normals: polarize (rays become the negated normals),
/// triangulate if not simplicial, decompose each simplex, and dualize each
/// unimodular piece back before delivering it to `sink.on_polar_cone`.
pub fn decompose_polar(
    normals: &[Vec<Int>],
    sink: &mut dyn DecomposeSink,
    opts: &Options,
) -> Result<(), CoreError> {
    let dim = normals.first().map_or(0, Vec::len);
    let polar_rays: Vec<Vec<Int>> = normals
        .iter()
        .map(|n| primitive(&n.iter().map(|c| -c.clone()).collect::<Vec<_>>()))
        .collect();
    let simplices = if polar_rays.len() == dim {
        vec![polar_rays]
    } else {
        polyhedron::triangulate_cone(dim, &polar_rays, opts.max_rays)?
    };
    for rays in simplices {
        if rays.len() != dim {
            return Err(PolyError::BadConstraint {
                got: rays.len(),
                dim,
            }
            .into());
        }
        let simplex = Cone::new(IntMat::from_rows(&rays))?;
        decompose_with(&simplex, 1, opts, &mut |piece, sign| {
            let primal = piece.polar()?;
            sink.on_polar_cone(&primal, sign)
        })?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

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

    struct Collect {
        cones: Vec<(IntMat, i32)>,
        polar: Vec<(IntMat, i32)>,
    }

    impl Collect {
        fn new() -> Self {
            Self {
                cones: Vec::new(),
                polar: Vec::new(),
            }
        }
    }

    impl DecomposeSink for Collect {
        fn on_cone(&mut self, cone: &Cone, sign: i32) -> Result<(), CoreError> {
            self.cones.push((cone.rays().clone(), sign));
            Ok(())
        }
        fn on_polar_cone(&mut self, cone: &Cone, sign: i32) -> Result<(), CoreError> {
            self.polar.push((cone.rays().clone(), sign));
            Ok(())
        }
    }

    #[test]
    fn unimodular_cone_passes_through() {
        let c = Cone::new(mat(&[&[1, 0], &[0, 1]])).unwrap();
        let mut sink = Collect::new();
        decompose(&c, 1, &mut sink, &Options::default()).unwrap();
        assert_eq!(sink.cones.len(), 1);
        assert_eq!(sink.cones[0].1, 1);
    }

    #[test]
    fn index_two_cone_splits_into_two_signed_pieces() {
        let c = Cone::new(mat(&[&[1, 0], &[1, 2]])).unwrap();
        assert_eq!(*c.det(), int(2));
        let mut sink = Collect::new();
        let opts = Options::default();
        decompose(&c, 1, &mut sink, &opts).unwrap();
        assert_eq!(sink.cones.len(), 2);
        for (rays, _) in &sink.cones {
            let piece = Cone::new(rays.clone()).unwrap();
            assert!(piece.is_unimodular());
        }
        let signs: Vec<i32> = sink.cones.iter().map(|(_, s)| *s).collect();
        assert_eq!(signs.iter().sum::<i32>().abs(), 0, "one +1 and one -1 piece");
        assert_eq!(opts.stats.base_cones(), 2);
    }

    #[test]
    fn decomposition_terminates_on_larger_index() {
        let c = Cone::new(mat(&[&[1, 0, 0], &[0, 1, 0], &[1, 2, 5]])).unwrap();
        let mut sink = Collect::new();
        decompose(&c, 1, &mut sink, &Options::default()).unwrap();
        assert!(!sink.cones.is_empty());
        for (rays, _) in &sink.cones {
            assert!(Cone::new(rays.clone()).unwrap().is_unimodular());
        }
    }

    #[test]
    fn polar_of_quadrant_is_negative_quadrant() {
        let c = Cone::new(mat(&[&[1, 0], &[0, 1]])).unwrap();
        let p = c.polar().unwrap();
        let mut rows: Vec<Vec<Int>> = (0..2).map(|i| p.rays().row_vec(i)).collect();
        rows.sort();
        assert_eq!(rows, vec![vec![int(-1), int(0)], vec![int(0), int(-1)]]);
        // Dualizing twice returns the original directions.
        let back = p.polar().unwrap();
        let mut rows2: Vec<Vec<Int>> = (0..2).map(|i| back.rays().row_vec(i)).collect();
        rows2.sort();
        assert_eq!(rows2, vec![vec![int(0), int(1)], vec![int(1), int(0)]]);
    }

    #[test]
    fn polar_pipeline_emits_unimodular_primal_pieces() {
        // Supporting cone {x ≥ 0, y ≥ 0} given by its normals.
        let normals = vec![vec![int(1), int(0)], vec![int(0), int(1)]];
        let mut sink = Collect::new();
        decompose_polar(&normals, &mut sink, &Options::default()).unwrap();
        assert_eq!(sink.polar.len(), 1);
        let (rays, sign) = &sink.polar[0];
        assert_eq!(*sign, 1);
        let piece = Cone::new(rays.clone()).unwrap();
        assert!(piece.is_unimodular());
        let mut rows: Vec<Vec<Int>> = (0..2).map(|i| piece.rays().row_vec(i)).collect();
        rows.sort();
        assert_eq!(rows, vec![vec![int(0), int(1)], vec![int(1), int(0)]]);
    }

    #[test]
    fn cancellation_unwinds() {
        let c = Cone::new(mat(&[&[1, 0], &[1, 7]])).unwrap();
        let opts = Options::default();
        opts.cancel.cancel();
        let mut sink = Collect::new();
        let err = decompose(&c, 1, &mut sink, &opts).unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
    }
}
