pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod interceptors;
pub mod pipeline;
pub mod queries;
pub mod query;
pub mod services;
pub mod session;
pub mod storage;
