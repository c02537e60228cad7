//! Query operations, one module per table.

pub mod assets;
