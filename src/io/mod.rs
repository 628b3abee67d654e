//! I/O modules for model lookup tables

pub mod gmf_table;

pub use gmf_table::GmfTable;
