// src/dc/mod.rs

//! Data Connection items: file and database references, database URL
//! handling and background URL validation.

pub mod db_reference;
pub mod item;
pub mod validator;

pub use db_reference::{parse_url, safe_url, sqlite_path, DbReference, UrlParts};
pub use item::DataConnection;
pub use validator::{validate_url, DatabaseConnectionValidator};
