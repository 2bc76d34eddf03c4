pub mod api;
pub mod backend;
pub mod cleanup;
pub mod config;
pub mod humanize;
pub mod observability;
pub mod orchestrator;
pub mod storage;
pub mod tasks;
