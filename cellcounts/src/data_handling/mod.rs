pub mod cell_counts;
pub mod store;
