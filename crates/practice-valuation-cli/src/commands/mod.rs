pub mod risk;
pub mod simulation;
pub mod valuation;
