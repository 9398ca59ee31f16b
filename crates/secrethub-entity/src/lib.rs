//! # secrethub-entity
//!
//! Domain entity models for SecretHub. Every struct in this crate
//! represents a database table row or a domain value object. All entities
//! derive `Debug`, `Clone`, `Serialize`, `Deserialize`, and database
//! entities additionally derive `sqlx::FromRow`.

pub mod checkpoint;
pub mod commit;
pub mod folder;
pub mod job;
pub mod principal;
pub mod resource;
pub mod secret;
