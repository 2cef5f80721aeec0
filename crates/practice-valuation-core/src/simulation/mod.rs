pub mod engine;
pub mod sampling;
