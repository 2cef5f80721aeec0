pub mod benchmarks;
pub mod dcf;
pub mod epv;
pub mod multiple;
pub mod sensitivity;
pub mod synergy;
pub mod trend;
pub mod wacc;
