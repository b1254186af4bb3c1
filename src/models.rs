pub mod account;
pub mod blockchain;
pub mod primitives;
pub mod state;
