//! Lodestar - per-request authorization and query-resolution engine
//!
//! Sits between a declarative API layer and a document store: computes the
//! complete set of documents a caller may touch from their root identities
//! and a static join graph, compiles declarative filter expressions into
//! backend query predicates, and runs every data operation through a fixed,
//! extensible multi-stage pipeline with authorization and field-level
//! redaction at well-defined points.

pub mod authz;
pub mod errors;
pub mod filter;
pub mod hooks;
pub mod pipeline;
pub mod settings;
pub mod store;
