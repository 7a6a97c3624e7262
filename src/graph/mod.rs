//! File graph produced by a crawl.

pub mod engine;

pub use engine::{DependencyGraph, GraphEdge};
