pub mod constraint;
pub mod freshness;
pub mod index;

pub use constraint::{ChartVersionConstraint, ConstraintError};
pub use freshness::{FreshnessChecker, FreshnessCheckerConfig, HelmIndexError, VersionComparisonResult};
pub use index::{CandidateSelection, IndexEntry, RepositoryIndex};
