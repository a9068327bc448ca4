//! # eventgraph — a multi-writer, event-sourced graph database
//!
//! `eventgraph` materializes a coherent graph from patches appended by
//! independent writers, replayed through a CRDT reducer over a
//! content-addressed, git-like object store (immutable objects keyed by
//! content hash, named references, tree objects, commit-like objects
//! carrying a message/tree/parents).
//!
//! ## Quick start
//!
//! ```no_run
//! use eventgraph::config::EngineConfig;
//! use eventgraph::materialize::Graph;
//! use eventgraph::storage_port::InMemoryObjectStore;
//!
//! # async fn run() -> eventgraph::error::Result<()> {
//! let store = InMemoryObjectStore::new();
//! let graph = Graph::open(&store, "eventgraph", "my-graph", EngineConfig::default());
//! let state = graph.materialize().await?;
//! println!("live nodes: {}", state.node_alive.visible_elements().count());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **CRDT layer** (`model`, `crdt`): dots, version vectors, OR-sets,
//!   LWW registers, the patch schema, and the deterministic
//!   `JoinReducer`.
//! - **Durability layer** (`checkpoint`, `refsync`): checkpoint
//!   creation/loading/incremental replay, and the graph-ref
//!   fast-forward/anchor-synthesis algorithm.
//! - **Bitmap index** (`bitmap`): in-memory and memory-bounded streaming
//!   builders, a lazy LRU-cached reader, a staleness detector, and the
//!   rebuild orchestrator.
//! - **Query layer** (`traversal`): BFS/DFS/ancestors/descendants/
//!   reachability over the bitmap index.
//! - **Orchestration** (`materialize`): the `Graph` handle tying the
//!   above together with opportunistic checkpoint/GC policy.
//! - **Ops tooling** (`admin`): stats, integrity verification, and GC,
//!   independent of any particular caller.
//!
//! The object store itself (`storage_port::ObjectStore`) is the single
//! external collaborator this crate depends on; everything above talks
//! to storage only through that trait.

pub mod abort;
pub mod admin;
pub mod bitmap;
pub mod canonical;
pub mod checkpoint;
pub mod config;
pub mod crdt;
pub mod error;
pub mod materialize;
pub mod model;
pub mod refsync;
pub mod session;
pub mod storage_port;
pub mod traversal;

pub use crate::config::EngineConfig;
pub use crate::error::{EventgraphError, Result};
pub use crate::materialize::Graph;
pub use crate::model::{Dot, EdgeKey, EventId, Frontier, Oid, PropKey, VersionVector};
pub use crate::storage_port::ObjectStore;
