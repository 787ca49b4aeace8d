#![doc = "blog-sync-core: core publish pipeline for blog-sync."]

//! This crate contains all pipeline logic for publishing a structured note
//! page as a markdown blog post: front-matter extraction, COS request
//! signing, asset reconciliation against a bucket listing, and the
//! create-or-update publish flow against a repository file API.
//! Concrete network clients live in the CLI crate.
//!
//! # Usage
//! Add this as a dependency for all shared publish, signing, and
//! reconciliation code.

pub mod assets;
pub mod auth;
pub mod contract;
pub mod frontmatter;
pub mod publish;
