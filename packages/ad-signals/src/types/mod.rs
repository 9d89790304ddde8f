pub mod assessment;
pub mod config;
pub mod domain;
pub mod report;
pub mod signal;
