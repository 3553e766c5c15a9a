//! Types shared by every gitlink crate: the linked identity the vault
//! persists, the upstream GitLab models, the host command wire format and the
//! events pushed to a user's client surface.

pub mod api;
pub mod events;
pub mod gitlab;
pub mod models;
