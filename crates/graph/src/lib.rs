//! Microsoft Graph transport for quire.
//!
//! - [`GraphClient`] performs authenticated GETs with per-request deadlines
//!   and follows `@odata.nextLink` until a listing is complete.
//! - [`GraphCatalog`] binds a client to one SharePoint site and implements
//!   [`RemoteCatalog`](quire_remote::RemoteCatalog) over its OneNote
//!   notebooks, sections and pages.
//! - [`RefreshTokenAuth`] and [`StaticToken`] implement
//!   [`AuthProvider`](quire_remote::AuthProvider); [`provider_from_env`]
//!   picks one based on what the `.env` file holds.
//!
//! Errors use the shared [`quire_remote::error::ErrorKind`] so callers can
//! tell fatal authentication failures apart from per-page failures.

mod auth;
mod client;
mod env;
mod models;

pub use crate::auth::{RefreshTokenAuth, StaticToken, provider_from_env};
pub use crate::client::{DEFAULT_BASE_URL, GraphCatalog, GraphClient};
pub use crate::env::EnvCredentials;
pub use crate::models::Site;
