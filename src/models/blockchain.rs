pub mod coin;
pub mod proxy;
pub mod regtest;
pub mod transaction;
