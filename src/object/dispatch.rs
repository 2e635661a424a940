//! Signal emission and command invocation
//!
//! Emission works in three steps: snapshot the handler list under the
//! object lock, release the lock, then run the snapshot. Handlers run on
//! the emitting thread with no lock held, so they may connect, disconnect
//! or emit again on the same object. A change made by a handler takes
//! effect from the next emission on.
//!
//! A panicking handler is not caught here; the panic unwinds into the
//! caller of `emit` or `call`.

use crate::value::Value;

use super::handle::{CommandArgs, HandlerEntry, Object};

impl Object {
    /// Emit `signal_id` with `value` to every connected handler.
    ///
    /// Handlers are invoked in connection order. `value` is consumed and
    /// released once the last handler has returned.
    pub fn emit(&self, signal_id: u32, value: Value) {
        let snapshot: Vec<HandlerEntry> = {
            let tables = self.inner.tables.lock();
            match tables.signals.get(&signal_id) {
                // Stored newest first
                Some(list) => list.iter().rev().cloned().collect(),
                None => Vec::new(),
            }
        };

        if snapshot.is_empty() {
            tracing::trace!(object = %self.inner.name, signal = signal_id, "Emit without handlers");
            return;
        }

        // Hold our own reference for the duration of the handler run
        let this = self.clone();
        for entry in &snapshot {
            (entry.handler)(&this, &value, entry.context.as_ref());
        }

        drop(value);
    }

    /// Invoke command `command_id` with `args`.
    ///
    /// An id with no registered handler is silently ignored and leaves
    /// `args` untouched.
    pub fn call(&self, command_id: u32, args: &mut CommandArgs) {
        let handler = self.inner.tables.lock().commands.get(&command_id).cloned();

        match handler {
            Some(handler) => handler(self, args),
            None => {
                tracing::debug!(
                    object = %self.inner.name,
                    command = command_id,
                    "Call to unregistered command ignored"
                );
            }
        }
    }
}
