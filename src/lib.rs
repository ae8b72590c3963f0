//! Folio: the content ingestion core of a self-hosted blog.
//!
//! Uploaded archives are unpacked into a private workspace, their content root
//! is located, a unique slug is reserved under the storage root and the post
//! is placed there together with its parsed front matter and hero image.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
