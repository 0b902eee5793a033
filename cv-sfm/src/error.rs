use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Failures that abort the reconstruction of one image pair.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("no correspondences survived descriptor matching")]
    InsufficientMatches,
    #[error("found {found} correspondences, but at least {required} are needed")]
    InsufficientGeometry { found: usize, required: usize },
    #[error("no candidate pose is coherent and has triangulated points")]
    NoValidPose,
    #[error("singular value decomposition of the essential matrix failed")]
    DegenerateEssentialMatrix,
}

/// Conditions that are logged and reported, but under which reconstruction proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Warning {
    #[error("essential matrix singular value ratio {ratio} is ill-conditioned")]
    IllConditionedEssentialMatrix { ratio: f64 },
    #[error("{points} points did not converge during triangulation")]
    TriangulationDivergence { points: usize },
}
