// src/lib.rs

//! Pakt Package Manager
//!
//! Cross-platform package manager that installs, removes, and queries
//! software packages inside user-owned, root-free installation prefixes
//! (akin to language-ecosystem virtual environments).
//!
//! # Architecture
//!
//! - Binary index: all configured repositories merged into one in-memory,
//!   digest-deduplicated view of the available packages
//! - Solver: install/remove/upgrade goals turned into ordered, validated
//!   action plans; state is only mutated when a plan is applied
//! - Prefix-local state: installed packages, file manifests, and synced
//!   repository descriptors in a per-prefix SQLite database
//! - Content addressing: SHA-256 sumsha as canonical package identity,
//!   integrity check, and cache key

pub mod checksum;
mod error;
pub mod index;
pub mod install;
pub mod prefix;
pub mod repository;
pub mod solver;
pub mod state;
pub mod version;

pub use error::{Error, Result};
