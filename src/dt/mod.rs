// src/dt/mod.rs

//! Data Transformer items.

pub mod item;
pub mod rewriter;
pub mod spec;

pub use item::DataTransformerExecutable;
pub use rewriter::{append_filter_config, config_to_shorthand, rewrite_resources};
pub use spec::{DataTransformerSpecification, FilterSettings};
