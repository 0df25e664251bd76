pub mod alignments;
pub mod gene_table;
pub mod hit_store;
pub mod params;
pub mod pathway_helper;
pub mod pruner;
pub mod reaction_catalog;
pub mod report;
pub mod significance;
pub mod unmapped;
