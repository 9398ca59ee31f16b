//! Folder domain entities.

pub mod model;
pub mod version;

pub use model::Folder;
pub use version::FolderVersion;
