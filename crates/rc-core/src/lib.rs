//! rusty-comments/crates/rc-core/src/lib.rs
//!
//! The comment policy, registry and interface definitions for rusty-comments.

pub mod configuration;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod policy;
pub mod registry;
pub mod request;
pub mod spam;
pub mod traits;

// Re-exporting for easier access in other crates
pub use configuration::*;
pub use error::*;
pub use models::*;
pub use policy::*;
pub use registry::{Registration, Registry, RegistryBuilder};
pub use request::*;
pub use traits::*;
