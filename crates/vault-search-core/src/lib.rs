//! # Vault Search Core
//!
//! Shared, pure logic for Vault Search: data models, type-aware content
//! chunking, rank fusion, and the keyword/vector search backend contracts.
//!
//! This crate contains no tokio, reqwest, filesystem I/O, or other
//! runtime-heavy dependencies. Everything here is a pure function of its
//! inputs; the async search traits exist only so that storage backends
//! (which live elsewhere) can be plugged in.

pub mod chunk;
pub mod fusion;
pub mod models;
pub mod store;
