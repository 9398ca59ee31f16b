//! Core type definitions used across the SecretHub workspace.

pub mod pagination;

pub use pagination::{PageRequest, PageResponse};
