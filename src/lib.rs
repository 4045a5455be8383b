pub mod api;
pub mod cache;
pub mod config;
pub mod domain;
pub mod logging;
pub mod messaging;
pub mod metrics;
pub mod service;
pub mod store;

#[cfg(test)]
mod testing;
