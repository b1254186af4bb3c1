pub mod logging;
pub mod wallet_node;
