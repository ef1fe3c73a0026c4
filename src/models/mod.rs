//! Typed records used across layers.

pub mod email;
pub mod notification;
