pub mod error;
pub mod input;
pub mod precision;
pub mod types;

#[cfg(feature = "valuation")]
pub mod safeguard;

#[cfg(feature = "valuation")]
pub mod valuation;

#[cfg(feature = "valuation")]
pub mod validation;

#[cfg(feature = "simulation")]
pub mod simulation;

#[cfg(feature = "hybrid")]
pub mod config;

#[cfg(feature = "hybrid")]
pub mod hybrid;

#[cfg(feature = "hybrid")]
pub mod engine;

pub use error::PracticeValuationError;
pub use types::*;

/// Standard result type for all practice-valuation operations
pub type PracticeValuationResult<T> = Result<T, PracticeValuationError>;
