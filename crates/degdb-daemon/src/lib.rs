//! Shared pieces of the `degdb` binary: config loading and the embedded
//! HTTP surface, split out so integration tests can drive them without a
//! real listening socket.

pub mod config;
pub mod http;
