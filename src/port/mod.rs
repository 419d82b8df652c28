// src/port/mod.rs

//! TCP port reclamation.
//!
//! A [`PortReclaimer`] frees a port still held by a previous incarnation of
//! the supervised server. Finding who owns a port is platform specific and
//! sits behind the [`PortOwnerLookup`] trait:
//!
//! - [`LsofLookup`] on Unix-like systems,
//! - [`NetstatLookup`] on Windows,
//! - [`ProbeOnlyLookup`] when neither tool is installed (waits, never kills).
//!
//! The variant is chosen once, in [`PortReclaimer::detect`].

pub mod lookup;
pub mod lsof;
pub mod netstat;
pub mod reclaimer;

pub use lookup::{PortOwnerLookup, ProbeOnlyLookup};
pub use lsof::LsofLookup;
pub use netstat::NetstatLookup;
pub use reclaimer::{port_is_free, PortReclaimer};
