//! Tidal metadata source for a local music tagging catalog
pub mod api;
pub mod config;
pub mod db;
pub mod mapper;
pub mod models;
pub mod source;
pub mod sync;
pub mod util;
