//! Resource stores.
//!
//! Each store owns one resource's lifecycle and takes the acting `Principal` as an
//! explicit argument, consulting the access policy before touching the repository.

mod categories;
mod content;
mod identity;

pub use categories::CategoryStore;
pub use content::{ContentStore, DocumentUpload, document_extension};
pub use identity::IdentityStore;

/// Whether an update replaces the full field set (`PUT`) or only the provided fields (`PATCH`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Replace,
    Partial,
}
