//! Persisted application state of a wallet client.
//!
//! [`core::state_store::StateStore`] keeps the selected network provider,
//! wallet metadata and the list of submitted transactions in a single slot
//! of an external [`external::Storage`].

pub mod core;
pub mod external;
pub mod models;
pub mod utils;
