pub mod api;
pub mod classifier;
pub mod embedding;
pub mod error;
pub mod redis;
