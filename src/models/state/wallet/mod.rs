//! Key material for accounts: BIP32 derivation and the key repository
//! contract with its in-memory and file-backed implementations.

pub mod address_path;
pub mod file_key_repository;
pub mod hd_node;
pub mod in_memory_key_repository;
pub mod key_repository;
