// Library for tests to access modules

pub mod config;
pub mod downsample;
pub mod history_fetcher;
pub mod models;
pub mod normalizer;
pub mod retention_worker;
pub mod routes;
pub mod sample_store;
