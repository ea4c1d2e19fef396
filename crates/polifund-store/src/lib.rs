//! # polifund-store
//!
//! Campaign metadata storage for the PolyFund API, backed by SQLite.
//!
//! On-chain state stays on chain; this crate only keeps what the contracts
//! do not: campaign titles, descriptions and locations, the image gallery
//! of each campaign and the metadata of uploaded image files. The image
//! bytes themselves live in the server's image directory.
//!
//! [`Database`] is a synchronous handle over a `rusqlite::Connection`
//! with typed CRUD helpers. [`StorePool`] gives it an explicit
//! open/close lifecycle for use from async code.

pub mod campaigns;
pub mod database;
pub mod images;
pub mod migrations;
pub mod models;
pub mod pool;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use pool::StorePool;
