//! Domain types and the SMTP session driver. Performs no I/O of its own.

pub mod communication;
