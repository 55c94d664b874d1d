mod binning;
mod binning_builder;
mod build_error;
mod build_stats;
pub mod diagnostics;
mod partition;
mod result_chunk;
mod result_node;
mod settings;
mod subtree_task;

pub use binning::{compute_bounds, num_buckets_for, BinningOb, MAX_NUM_BUCKETS};
pub use binning_builder::BinningBvhBuilder;
pub use build_error::BuildError;
pub use build_stats::BinningBuildStats;
pub use diagnostics::{sah_cost, validate_build_results};
pub use result_node::{format_result_nodes, ResultNode};
pub use settings::{BinningBuilderSettings, DEFAULT_RESULT_CHUNK_CAPACITY, MAX_SUPPORTED_DEPTH, TRAVERSAL_COST};
