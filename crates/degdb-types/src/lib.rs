//! # degdb-types
//!
//! Shared data model for degdb: triples, peers, and the query shapes
//! (`ArrayOp`, `TripleTemplate`, `QueryRequest`) that the wire, storage,
//! network and query crates all build on.

pub mod peer;
pub mod query;
pub mod triple;

pub use peer::Peer;
pub use query::{ArrayOp, OpMode, QueryRequest, QueryType, TripleTemplate};
pub use triple::{clone_triples, sort_triples, Triple};
