//! worldsnap CLI library - exports modules for testing

pub mod cmd;
pub mod config;
pub mod context;
pub mod gate;
pub mod host;
pub mod locks;
pub mod ops;
pub mod util;
