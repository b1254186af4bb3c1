pub mod config;
pub mod locks;
