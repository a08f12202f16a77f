//! Network-facing implementations of the domain traits.

pub mod email;
