//! Clients for the remote services an import talks to.

pub mod catalog;
pub mod registry;
pub mod storage;
