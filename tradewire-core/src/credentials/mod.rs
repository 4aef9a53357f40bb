//! Session credentials: an in-memory snapshot mirrored to durable storage.

pub mod durable;
pub mod store;

pub use durable::{DurableStore, JsonFileStore, MemoryStore};
pub use store::{CredentialStore, Credentials, UserProfile};
