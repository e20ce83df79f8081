// Library root: re-exports all modules so integration tests and external
// consumers can access the crate's public API.

pub mod channel;
pub mod config;
pub mod db;
pub mod feed;
pub mod interaction;
pub mod ledger;
pub mod relay;
