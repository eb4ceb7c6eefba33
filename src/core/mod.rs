pub use self::state_store::{StateStore, StateStoreError, StateStoreHandler, StoredStateData};

pub mod state_store;
