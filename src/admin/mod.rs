//! Ops tooling layered over a graph handle: stats, integrity
//! verification, and GC, mirroring `sombra::admin`'s
//! `stats`/`verify`/`vacuum` triad.

pub mod gc;
pub mod stats;
pub mod verify;
