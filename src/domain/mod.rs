//! Domain layer types and invariants.

pub mod entities;
pub mod front_matter;
pub mod public_url;
pub mod slug;
