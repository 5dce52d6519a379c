pub mod app;
pub mod assemble;
pub mod config;
pub mod dedup;
pub mod document;
pub mod domain;
pub mod error;
pub mod extract;
pub mod filter;
pub mod output;
pub mod store;
pub mod summary;
pub mod tui;
pub mod walker;
