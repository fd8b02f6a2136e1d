// Shared runtime state outside the database

pub mod redis_store;
pub mod stats_cache;
