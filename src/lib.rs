// Library root for the Gifted Giving API

pub mod api;
pub mod auth;
pub mod config;
pub mod core;
pub mod infra;
pub mod metrics;
pub mod notify;
pub mod payments;
pub mod state;
pub mod store;
pub mod utils;
