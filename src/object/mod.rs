//! Object dispatch engine
//!
//! Every addressable entity is an `Object`: a reference-counted handle with
//! a command table and a signal table, both guarded by one per-object lock.
//!
//! # Architecture
//!
//! ```text
//!                       Object (Arc<ObjectInner>)
//!                 ┌──────────────────────────────────┐
//!                 │ tables: Mutex<Tables {           │
//!                 │   commands: BTreeMap<id, Fn>,    │
//!                 │   signals:  BTreeMap<id,         │
//!                 │     VecDeque<(Fn, context)>>,    │
//!                 │ }>                               │
//!                 └───────┬──────────────────┬───────┘
//!                         │                  │
//!        call(id, args) ──┘                  └── emit(id, value)
//!        lookup under lock,                      snapshot under lock,
//!        invoke unlocked                         unlock, invoke snapshot
//! ```
//!
//! There is no global lock: threads working on different objects never
//! contend, and refcount changes are plain atomics.

pub mod dispatch;
pub mod handle;
pub mod registry;

pub use handle::{
    command_handler, signal_handler, CommandArgs, CommandFn, CommandHandler, Context, Object,
    SignalFn, SignalHandler, Subscription, WeakObject,
};
