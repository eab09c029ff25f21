//! CLI command implementations

pub mod autoback;
pub mod backup;
pub mod commit;
pub mod config;
pub mod init;
pub mod list;
pub mod policy;
pub mod prune;
pub mod push;
pub mod restore;
