pub mod app;
pub mod cache;
pub mod cli;
pub mod configuration;
pub mod context;
pub mod filter;
pub mod orchestrator;
pub mod processor;
pub mod progress;
pub mod ratelimit;
pub mod report;
pub mod rest;
pub mod source;
pub mod storage;
pub mod throttle;
pub mod tracing;
pub mod trigram;
pub mod types;

#[cfg(test)]
mod testing;
