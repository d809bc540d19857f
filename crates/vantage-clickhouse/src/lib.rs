pub mod analytics_impl;
pub mod backend;
pub mod client;
pub mod queries;

pub use backend::ClickHouseBackend;
pub use client::ClickHouseClient;
