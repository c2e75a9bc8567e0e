//! Core data models for the object gate.
//!
//! `ObjectInfo` maps onto the `objects` table via `sqlx::FromRow` and is what
//! every backend reports for a stored object.

pub mod object;
