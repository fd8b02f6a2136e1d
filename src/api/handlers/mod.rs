// Request handlers, one module per resource

pub mod admin;
pub mod auth;
pub mod donations;
pub mod feedback;
pub mod health;
pub mod newsletter;
pub mod programs;
pub mod stories;
pub mod stripe;
pub mod upload;
pub mod users;
pub mod volunteers;
