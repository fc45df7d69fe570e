//! # Repository Module
//!
//! SQL lives here and nowhere else.
//!
//! ## Available Repositories
//!
//! - [`kv::KvRepository`] - Whole-value reads and writes keyed by string

pub mod kv;
