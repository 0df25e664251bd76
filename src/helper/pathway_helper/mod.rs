pub mod assign;
pub mod catalog;
pub mod evaluate;
pub mod structure;

pub use assign::{
    AssignmentFallback, AssignmentOutcome, PathwaysAndReactions, assign_pathways,
    union_reaction_scores,
};
pub use catalog::{PathwayCatalog, PathwayCatalogError, PathwayDefinition};
pub use evaluate::{chi2cdf, evaluate_abundance, evaluate_coverage, gap_fill, median_score};
pub use structure::{JoinKind, PathwayNode, PathwayParseError, PathwayStructure};
