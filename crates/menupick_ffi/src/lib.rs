//! Flutter-facing bindings for MenuPick core.

pub mod api;
