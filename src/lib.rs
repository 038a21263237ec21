//! Load Location: request a location fix through permission, provider and
//! settings gates, then hand it to a map application as a `geo:` URI.

pub mod config;
pub mod location;
pub mod server;
