//! Client connection
//!
//! Wraps a `Channel` with request-id allocation, the table of pending
//! replies and a local object on which broadcasts are re-emitted.
//!
//! ```text
//!   send_command ──> register PendingReply(id) ──> channel.send(Message)
//!
//!   channel reader ──> Incoming
//!                        ├─ reply:     pending.remove(id).complete(result)
//!                        └─ broadcast: broadcasts.emit(signal, payload)
//! ```
//!
//! The reply is registered before the message leaves, so a fast peer can
//! never answer a request the connection does not know about yet.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::object::{signal_handler, Object, SignalHandler, Subscription, WeakObject};
use crate::protocol::{Incoming, Message, ObjectId, SignalId, COMMAND_SIGNAL_BROADCAST};
use crate::value::Value;

use super::channel::Channel;
use super::config::ConnectionConfig;
use super::pending::PendingReply;

struct ConnectionInner {
    config: ConnectionConfig,
    channel: Arc<dyn Channel>,
    next_request_id: AtomicU32,
    pending: Mutex<HashMap<u32, PendingReply>>,
    /// Broadcasts are re-emitted here under their signal id
    broadcasts: Object,
    /// Signals the peer has been asked to broadcast
    requested: Mutex<BTreeSet<u32>>,
}

impl ConnectionInner {
    fn handle_incoming(&self, incoming: Incoming) {
        match incoming.request_id {
            Some(request_id) => {
                let pending = self.pending.lock().remove(&request_id);
                match pending {
                    Some(reply) => {
                        let result = incoming.into_result();
                        if let Err(e) = &result {
                            tracing::debug!(
                                client = %self.config.client_name,
                                request_id = request_id,
                                error = %e,
                                "Command failed"
                            );
                        }
                        reply.complete(result);
                    }
                    None => {
                        tracing::debug!(
                            client = %self.config.client_name,
                            request_id = request_id,
                            "Reply to unknown request dropped"
                        );
                    }
                }
            }
            None => {
                tracing::trace!(
                    client = %self.config.client_name,
                    signal = incoming.id,
                    "Broadcast received"
                );
                self.broadcasts.emit(incoming.id, incoming.payload);
            }
        }
    }

    fn handle_disconnect(&self) {
        let pending: Vec<PendingReply> = self.pending.lock().drain().map(|(_, r)| r).collect();
        let signals = std::mem::take(&mut *self.requested.lock());

        let mut dropped = 0;
        for signal in signals {
            dropped += self.broadcasts.disconnect_all(signal);
        }
        tracing::info!(
            client = %self.config.client_name,
            pending = pending.len(),
            subscriptions = dropped,
            "Connection lost"
        );

        for reply in pending {
            reply.complete(Err(Error::NotConnected));
        }
    }
}

/// Client side of one channel
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Attach to `channel` with default configuration
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self::with_config(channel, ConnectionConfig::default())
    }

    pub fn with_config(channel: Arc<dyn Channel>, config: ConnectionConfig) -> Self {
        let broadcasts = Object::new(format!("{}.broadcasts", config.client_name));
        let inner = Arc::new(ConnectionInner {
            config,
            channel: Arc::clone(&channel),
            next_request_id: AtomicU32::new(1),
            pending: Mutex::new(HashMap::new()),
            broadcasts,
            requested: Mutex::new(BTreeSet::new()),
        });

        let weak: Weak<ConnectionInner> = Arc::downgrade(&inner);
        channel.on_receive(Arc::new(move |incoming| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_incoming(incoming);
            }
        }));
        let weak = Arc::downgrade(&inner);
        channel.on_disconnect(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.handle_disconnect();
            }
        }));

        tracing::debug!(client = %inner.config.client_name, "Connection attached");
        Self { inner }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn is_connected(&self) -> bool {
        self.inner.channel.is_connected()
    }

    /// Fail with `NotConnected` unless the channel is up
    pub fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Send `command_id` to `object` and return the reply handle
    pub fn send_command(
        &self,
        object: ObjectId,
        command_id: u32,
        args: Vec<Value>,
    ) -> Result<PendingReply> {
        self.ensure_connected()?;

        let request_id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let reply = PendingReply::new(request_id);
        let weak = Arc::downgrade(&self.inner);
        reply.set_cancel_hook(move |id| {
            if let Some(inner) = weak.upgrade() {
                inner.pending.lock().remove(&id);
            }
        });
        self.inner.pending.lock().insert(request_id, reply.clone());

        let message = Message::new(request_id, object, command_id, args);
        if let Err(e) = self.inner.channel.send(message) {
            self.inner.pending.lock().remove(&request_id);
            return Err(e);
        }

        tracing::trace!(
            client = %self.inner.config.client_name,
            request_id = request_id,
            object = ?object,
            command = command_id,
            "Command sent"
        );
        Ok(reply)
    }

    /// Subscribe `handler` to broadcasts of `signal`.
    ///
    /// The peer is asked to start broadcasting the first time a signal is
    /// subscribed to. The subscription lasts until it is disconnected or
    /// the connection ends.
    pub fn subscribe_broadcast(
        &self,
        signal: SignalId,
        handler: SignalHandler,
    ) -> Result<BroadcastHandle> {
        self.ensure_connected()?;

        let id = signal.as_u32();
        let first = self.inner.requested.lock().insert(id);
        if first {
            let request = self.send_command(
                ObjectId::Signal,
                COMMAND_SIGNAL_BROADCAST,
                vec![Value::from(id)],
            );
            if let Err(e) = request {
                self.inner.requested.lock().remove(&id);
                return Err(e);
            }
        }

        let subscription = self.inner.broadcasts.connect_signal(id, handler, None);
        Ok(BroadcastHandle {
            broadcasts: self.inner.broadcasts.downgrade(),
            subscription,
        })
    }

    /// Subscribe a closure to broadcasts of `signal`
    pub fn on_broadcast<F>(&self, signal: SignalId, f: F) -> Result<BroadcastHandle>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe_broadcast(signal, signal_handler(move |_, value, _| f(value)))
    }

    /// Replies still waiting for an answer
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Local object broadcasts are emitted on
    pub fn broadcasts(&self) -> &Object {
        &self.inner.broadcasts
    }
}

/// Live broadcast subscription
pub struct BroadcastHandle {
    broadcasts: WeakObject,
    subscription: Subscription,
}

impl BroadcastHandle {
    /// Stop receiving. Fails with `NotFound` if the subscription already
    /// ended, for example because the connection was lost.
    pub fn disconnect(self) -> Result<()> {
        match self.broadcasts.upgrade() {
            Some(object) => object.unsubscribe(&self.subscription),
            None => Err(Error::NotFound("broadcast subscription".into())),
        }
    }
}
