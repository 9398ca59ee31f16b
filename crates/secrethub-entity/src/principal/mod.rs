//! Principals and environments referenced by commits.

pub mod environment;
pub mod identity;
pub mod user;

pub use environment::Environment;
pub use identity::Identity;
pub use user::User;
