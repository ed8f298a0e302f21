//! DocFlow session authentication library
//!
//! Provides the session token refresh call and credential file storage for
//! the DocFlow API client. This crate is a standalone library with no
//! dependency on the client crate — it can be tested and used independently.
//!
//! Credential flow:
//! 1. A sign-in (outside this crate) produces an access/refresh token pair
//! 2. Credentials stored via `credentials::CredentialStore::save()`
//! 3. A 401 at request time triggers `token::refresh_session()`
//! 4. Rotated tokens saved via `CredentialStore::save()`
//! 5. Refresh failure tears the session down via `CredentialStore::clear()`

pub mod credentials;
pub mod error;
pub mod token;

pub use credentials::{Credentials, CredentialStore};
pub use error::{Error, Result};
pub use token::{REFRESH_PATH, SessionTokens, refresh_session};
