//! Folder point-in-time engine.

pub mod checkpoint;
pub mod commit;
pub mod history;
pub mod reconstruct;
pub mod rollback;
pub mod scheduler;
pub mod service;
pub mod state;
