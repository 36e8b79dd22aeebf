pub mod cleanup;
pub mod cli;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod jwt;
pub mod metrics;
pub mod password;
pub mod refresh;
pub mod secret;
pub mod service;
pub mod session;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use db::Database;
pub use error::{AuthError, PublicError, StoreError};
pub use service::{AuthService, Authenticated, LoginGrant, Renewed, within};
pub use store::{CredentialKind, CredentialRecord, CredentialStore, IssuedCredential};
