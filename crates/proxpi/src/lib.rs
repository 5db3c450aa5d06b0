//! The HTTP contract layer (spec.md §6): wires `proxpi-index`'s
//! `CacheAggregator` and `proxpi-cache`'s `FileCache` behind an `axum`
//! router. Split out as a library (with `main.rs` as a thin binary shim)
//! so the route wiring can be driven end-to-end from integration tests,
//! the way the teacher keeps its actual logic in library crates and tests
//! it there rather than through `rattler-bin` itself.

pub mod config;
pub mod error;
pub mod render;
pub mod routes;
pub mod state;
