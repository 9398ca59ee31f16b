//! Secret domain entities.

pub mod model;
pub mod version;

pub use model::Secret;
pub use version::SecretVersion;
