pub mod bounds;
pub mod checks;
pub mod report;
