//! fequery: a typed client for the example collection, fronted by a
//! single-flight query cache and a mutation runner that refreshes the cache
//! after writes.

pub mod app;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod mutation;
pub mod resource;
pub mod transport;
