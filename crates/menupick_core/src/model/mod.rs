//! Domain model for the persisted dish collection.
//!
//! # Responsibility
//! - Define the canonical item record shared by both storage media.
//! - Own name normalization and case-insensitive comparison rules.
//!
//! # Invariants
//! - Item ids are positive and never reused by the medium that issued them.
//! - Names are trimmed and non-empty before they reach any backend.

pub mod item;
