//! Domain model module declarations.

pub mod item;
pub mod media;
pub mod payload;
