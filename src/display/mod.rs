//! Terminal display utilities for CLI output.

pub mod tables;

pub use tables::{TableBuilder, create_index_summary_table, create_results_table};
