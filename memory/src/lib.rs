//! Symbolic memory plugin: paged concrete bytes, interval-indexed
//! symbolic addresses, and the load/store/merge algorithm that unifies
//! them behind permission-checked mapped regions.
//!
//! The constraint solver and the expression AST are an external
//! collaborator, defined in the [`expr`] crate; architecture metadata
//! (word size, endianness, register layout) is another, in [`arch`].
//! This crate owns only the memory model itself.

pub mod backer;
mod cell;
pub mod config;
pub mod error;
mod plugin;

pub use backer::{MemoryBacker, PermsRange, PermsBacker, Segment};
pub use config::MemoryConfig;
pub use error::{AccessKind, MemError};
pub use plugin::{MemId, SymbolicMemory};

pub use arch::Arch;
pub use expr::{Expr, Solver};
pub use regions::Perms;
