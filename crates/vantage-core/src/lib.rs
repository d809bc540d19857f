pub mod analytics;
pub mod axis;
pub mod cache;
pub mod comparison;
pub mod config;
pub mod error;
pub mod filters;
pub mod flow;
pub mod funnel;
pub mod session;
pub mod store;
pub mod timeframe;
