// Infrastructure adapters: PostgreSQL and local disk

pub mod postgres;
pub mod uploads;
