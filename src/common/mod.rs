//! Utilities shared by the package and content layers.

pub mod xml;
