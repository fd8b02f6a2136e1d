// Core domain types and rules

pub mod errors;
pub mod impact;
pub mod models;
pub mod pagination;
pub mod requests;
pub mod resilience;
pub mod stats;
