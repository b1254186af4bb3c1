//! public api of the wallet core
//!
//! the account service is the layer a transport (rpc, cli, ...) calls
//! into. every error it returns maps to a finite [ErrorCode] plus a
//! message.
//!
//! [ErrorCode]: account_service::error::ErrorCode
pub mod account_service;
