pub mod api;
pub mod connector;
pub mod error;
pub mod launcher;
pub mod token_store;
pub mod types;

pub use api::{CloudApi, SensePcApiClient};
pub use connector::SessionConnector;
pub use error::CloudError;
pub use launcher::{prepare_connection, ConnectionParams};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
pub use types::*;

#[cfg(test)]
pub use api::MockCloudApi;
