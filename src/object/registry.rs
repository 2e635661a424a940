//! Command and signal registration

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::Value;

use super::handle::{
    command_handler, signal_handler, CommandArgs, CommandHandler, Context, HandlerEntry, Object,
    SignalHandler, Subscription,
};

impl Object {
    /// Register the handler for command `id`.
    ///
    /// Registering the same handler twice is a no-op. Registering a
    /// different handler for an id that is already taken is rejected with
    /// `InvalidArgument` in debug builds; release builds log it and
    /// overwrite.
    pub fn register_command(&self, id: u32, handler: CommandHandler) -> Result<()> {
        let mut tables = self.inner.tables.lock();

        match tables.commands.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(handler);
            }
            Entry::Occupied(existing) if Arc::ptr_eq(existing.get(), &handler) => {}
            Entry::Occupied(mut existing) => {
                if cfg!(debug_assertions) {
                    return Err(Error::invalid(format!(
                        "command {} already registered on {}",
                        id, self.inner.name
                    )));
                }
                tracing::warn!(
                    object = %self.inner.name,
                    command = id,
                    "Command handler overwritten"
                );
                existing.insert(handler);
            }
        }

        Ok(())
    }

    /// Register a closure as the handler for command `id`
    pub fn command<F>(&self, id: u32, f: F) -> Result<()>
    where
        F: Fn(&Object, &mut CommandArgs) + Send + Sync + 'static,
    {
        self.register_command(id, command_handler(f))
    }

    pub fn has_command(&self, id: u32) -> bool {
        self.inner.tables.lock().commands.contains_key(&id)
    }

    /// Connect `handler` with `context` to signal `id`.
    ///
    /// The same (handler, context) pair may be connected several times;
    /// every connection is invoked.
    pub fn connect_signal(
        &self,
        id: u32,
        handler: SignalHandler,
        context: Option<Context>,
    ) -> Subscription {
        let mut tables = self.inner.tables.lock();

        let token = tables.next_token;
        tables.next_token += 1;

        tables
            .signals
            .entry(id)
            .or_default()
            .push_front(HandlerEntry {
                token,
                handler,
                context,
            });

        Subscription {
            signal_id: id,
            token,
        }
    }

    /// Connect a closure that does not need a context
    pub fn connect<F>(&self, id: u32, f: F) -> Subscription
    where
        F: Fn(&Object, &Value) + Send + Sync + 'static,
    {
        self.connect_signal(id, signal_handler(move |object, value, _| f(object, value)), None)
    }

    /// Disconnect one connection of (handler, context) from signal `id`.
    ///
    /// Only the most recently connected match is removed. Fails with
    /// `NotFound` if the pair is not connected.
    pub fn disconnect_signal(
        &self,
        id: u32,
        handler: &SignalHandler,
        context: Option<&Context>,
    ) -> Result<()> {
        let mut tables = self.inner.tables.lock();

        let removed = tables.signals.get_mut(&id).and_then(|list| {
            let pos = list.iter().position(|e| e.matches(handler, context))?;
            list.remove(pos)
        });

        match removed {
            Some(_) => {
                prune(&mut tables.signals, id);
                Ok(())
            }
            None => {
                tracing::warn!(
                    object = %self.inner.name,
                    signal = id,
                    "Disconnect of a handler that is not connected"
                );
                Err(Error::NotFound(format!(
                    "handler for signal {} on {}",
                    id, self.inner.name
                )))
            }
        }
    }

    /// Remove the connection identified by `subscription`
    pub fn unsubscribe(&self, subscription: &Subscription) -> Result<()> {
        let mut tables = self.inner.tables.lock();
        let id = subscription.signal_id;

        let removed = tables.signals.get_mut(&id).and_then(|list| {
            let pos = list.iter().position(|e| e.token == subscription.token)?;
            list.remove(pos)
        });

        match removed {
            Some(_) => {
                prune(&mut tables.signals, id);
                Ok(())
            }
            None => Err(Error::NotFound(format!(
                "subscription to signal {} on {}",
                id, self.inner.name
            ))),
        }
    }

    /// Drop every connection to signal `id`, returning how many there were
    pub fn disconnect_all(&self, id: u32) -> usize {
        self.inner
            .tables
            .lock()
            .signals
            .remove(&id)
            .map_or(0, |list| list.len())
    }

    /// Number of connections to signal `id`
    pub fn handler_count(&self, id: u32) -> usize {
        self.inner
            .tables
            .lock()
            .signals
            .get(&id)
            .map_or(0, |list| list.len())
    }
}

fn prune(signals: &mut BTreeMap<u32, VecDeque<HandlerEntry>>, id: u32) {
    if signals.get(&id).is_some_and(|list| list.is_empty()) {
        signals.remove(&id);
    }
}
