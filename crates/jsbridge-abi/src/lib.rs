//! # jsbridge-abi
//!
//! The native boundary of the embedding stack: locating and loading the
//! engine's shared library, resolving its C entry points lazily, and
//! exposing them behind the capability-checked [`NodeApi`] trait.
//!
//! ## Architecture
//!
//! - `loader` — cross-platform shared-library loading with the bundled /
//!   environment / OS-default probe order
//! - `symbols` — lazily-resolved, once-initialized function-pointer slots
//! - `api` — the `NodeApi` trait: one method per bound entry point plus an
//!   `is_supported` capability query
//! - `libnode` — the production implementation calling through the symbol
//!   table
//! - `mock` (feature `mock`) — deterministic in-process engine double

pub mod api;
pub mod libnode;
pub mod loader;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod symbols;

pub use api::{ApiOp, ApiResult, ModuleInitFn, ModuleReleaseFn, NodeApi};
pub use libnode::LibNodeApi;
pub use loader::EngineLibrary;
pub use symbols::{SlotState, SymbolSlot};
