//! In-process reference evaluator
//!
//! Answers the collection commands against an in-memory media library so
//! the client side can be driven end to end without a media server.
//!
//! ```text
//!  Message ──> CollectionService ──> Object::call(command)
//!                    │                     │
//!                    │            ┌────────┴─────────┐
//!                    │            │                  │
//!                    │      CollectionStore     Evaluator
//!                    │      (save/get/...)    evaluate + fetch
//!                    │            │                  │
//!                    └── emit(CollectionChanged)   Library
//! ```

pub mod config;
pub mod eval;
pub mod fetch;
pub mod library;
pub mod service;
pub mod store;

pub use config::IndexConfig;
pub use eval::{Evaluator, ALL_MEDIA};
pub use library::Library;
pub use service::CollectionService;
pub use store::{ChangeKind, CollectionChange, CollectionStore};
