pub mod account_id;
pub mod address;
pub mod outer_entity;
pub mod satoshi;
