// Authentication & authorization module

pub mod audit_logger;
pub mod auth_middleware;
pub mod opaque_token;
pub mod password;
pub mod token;
