//! One module per `credvault` subcommand.

pub mod actions;
pub mod add;
pub mod audit_cmd;
pub mod copy;
pub mod delete;
pub mod edit;
pub mod folder;
pub mod keygen;
pub mod list;
pub mod move_cmd;
pub mod rotate;
pub mod show;
pub mod unfile;
