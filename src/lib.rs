pub mod app;
pub mod backup;
pub mod classify;
pub mod config;
pub mod dedup;
pub mod domain;
pub mod download;
pub mod error;
pub mod filename;
pub mod filter;
pub mod ledger;
pub mod logging;
pub mod output;
pub mod pacing;
pub mod providers;
pub mod store;
pub mod taxonomy;
pub mod validate;
