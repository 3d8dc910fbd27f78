//! Core data models for the file-storage adapter.
//!
//! `StoredFile` is the transient unit of upload; `AppContext` carries the
//! host-supplied values needed to compose proxied file URLs.

pub mod context;
pub mod stored_file;
