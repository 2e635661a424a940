//! In-process channel
//!
//! Connects a `Connection` to a `CollectionService` in the same process.
//! Messages go through a bounded queue to a single reader task, which calls
//! the addressed command and hands the reply back to the connection. With
//! `wire_roundtrip` set every message and reply is encoded and decoded on
//! the way, as it would be on a socket.
//!
//! Broadcast requests are served here: the channel connects a forwarder to
//! the service's collection object that turns each emission into a
//! broadcast for this client.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::index::CollectionService;
use crate::object::{signal_handler, SignalHandler};
use crate::protocol::{Incoming, Message, ObjectId, SignalId, COMMAND_SIGNAL_BROADCAST};
use crate::value::Value;

use super::channel::{Channel, DisconnectFn, ReceiveFn};
use super::config::ConnectionConfig;

enum Frame {
    Decoded(Message),
    Wire(Bytes),
}

struct LoopbackInner {
    config: ConnectionConfig,
    service: Arc<CollectionService>,
    connected: AtomicBool,
    tx: Mutex<Option<mpsc::Sender<Frame>>>,
    receivers: Mutex<Vec<ReceiveFn>>,
    disconnects: Mutex<Vec<DisconnectFn>>,
    /// Signal forwarders connected on the service, by signal id
    forwarders: Mutex<Vec<(u32, SignalHandler)>>,
    sent: AtomicUsize,
}

impl LoopbackInner {
    fn process(self: &Arc<Self>, frame: Frame) {
        let message = match frame {
            Frame::Decoded(message) => message,
            Frame::Wire(bytes) => match Message::decode(bytes.clone()) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(
                        client = %self.config.client_name,
                        error = %e,
                        "Undecodable message"
                    );
                    // answer whenever the header names the request
                    if let Some((request_id, object_id)) = Message::peek_header(&bytes) {
                        self.deliver(Incoming::reply(request_id, object_id, Err(e.into())));
                    }
                    return;
                }
            },
        };
        if !self.connected.load(Ordering::Acquire) {
            return;
        }

        let outcome = match message.object_id {
            ObjectId::Signal => self.serve_signal(message.command_id, &message.args),
            object => self.service.call(object, message.command_id, message.args),
        };
        self.deliver(Incoming::reply(
            message.request_id,
            message.object_id.as_u32(),
            outcome,
        ));
    }

    fn serve_signal(self: &Arc<Self>, command_id: u32, args: &[Value]) -> Result<Value> {
        if command_id != COMMAND_SIGNAL_BROADCAST {
            return Ok(Value::None);
        }
        let signal = args
            .first()
            .and_then(Value::as_int)
            .and_then(|id| u32::try_from(id).ok())
            .and_then(SignalId::from_u32)
            .ok_or_else(|| Error::invalid("broadcast request needs a known signal id"))?
            .as_u32();

        let mut forwarders = self.forwarders.lock();
        if forwarders.iter().any(|(id, _)| *id == signal) {
            return Ok(Value::None);
        }

        let weak: Weak<LoopbackInner> = Arc::downgrade(self);
        let handler = signal_handler(move |_, value, _| {
            if let Some(inner) = weak.upgrade() {
                let payload = value.clone();
                let object = ObjectId::Collection.as_u32();
                inner.deliver(Incoming::broadcast(object, signal, payload));
            }
        });
        self.service
            .collection_object()
            .connect_signal(signal, SignalHandler::clone(&handler), None);
        forwarders.push((signal, handler));

        tracing::debug!(
            client = %self.config.client_name,
            signal = signal,
            "Broadcast forwarding enabled"
        );
        Ok(Value::None)
    }

    fn deliver(&self, incoming: Incoming) {
        let incoming = if self.config.wire_roundtrip {
            match Incoming::decode(incoming.encode()) {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::warn!(
                        client = %self.config.client_name,
                        error = %e,
                        "Undecodable reply"
                    );
                    match incoming.request_id {
                        Some(request_id) => {
                            Incoming::reply(request_id, incoming.object_id, Err(e.into()))
                        }
                        None => return,
                    }
                }
            }
        } else {
            incoming
        };
        if !self.connected.load(Ordering::Acquire) {
            return;
        }

        let receivers: Vec<ReceiveFn> = self.receivers.lock().clone();
        for receiver in receivers {
            receiver(incoming.clone());
        }
    }

    fn detach_forwarders(&self) {
        let forwarders = std::mem::take(&mut *self.forwarders.lock());
        let object = self.service.collection_object();
        for (signal, handler) in forwarders {
            if let Err(e) = object.disconnect_signal(signal, &handler, None) {
                tracing::warn!(signal = signal, error = %e, "Forwarder already detached");
            }
        }
    }
}

impl Drop for LoopbackInner {
    fn drop(&mut self) {
        self.detach_forwarders();
    }
}

/// Channel to an in-process collection service
pub struct LoopbackChannel {
    inner: Arc<LoopbackInner>,
}

impl LoopbackChannel {
    /// Open a channel to `service`; must be called inside a tokio runtime
    pub fn spawn(service: Arc<CollectionService>) -> Arc<Self> {
        Self::spawn_with_config(service, ConnectionConfig::default())
    }

    pub fn spawn_with_config(
        service: Arc<CollectionService>,
        config: ConnectionConfig,
    ) -> Arc<Self> {
        let (tx, mut rx) = mpsc::channel::<Frame>(config.queue_capacity.max(1));
        let client = config.client_name.clone();
        let inner = Arc::new(LoopbackInner {
            config,
            service,
            connected: AtomicBool::new(true),
            tx: Mutex::new(Some(tx)),
            receivers: Mutex::new(Vec::new()),
            disconnects: Mutex::new(Vec::new()),
            forwarders: Mutex::new(Vec::new()),
            sent: AtomicUsize::new(0),
        });

        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                match weak.upgrade() {
                    Some(inner) => inner.process(frame),
                    None => break,
                }
            }
            tracing::debug!(client = %client, "Loopback reader finished");
        });

        tracing::info!(client = %inner.config.client_name, "Loopback channel open");
        Arc::new(Self { inner })
    }

    /// Close the channel: pending replies fail, forwarders are detached and
    /// disconnect callbacks run. Closing twice is a no-op.
    pub fn close(&self) {
        if !self.inner.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        self.inner.tx.lock().take();
        self.inner.detach_forwarders();

        tracing::info!(client = %self.inner.config.client_name, "Loopback channel closed");

        let callbacks: Vec<DisconnectFn> = self.inner.disconnects.lock().clone();
        for callback in callbacks {
            callback();
        }
    }

    /// Messages accepted by `send` so far
    pub fn sent_count(&self) -> usize {
        self.inner.sent.load(Ordering::Relaxed)
    }
}

impl Channel for LoopbackChannel {
    fn send(&self, message: Message) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let frame = if self.inner.config.wire_roundtrip {
            Frame::Wire(message.encode())
        } else {
            Frame::Decoded(message)
        };

        let tx = self.inner.tx.lock();
        let tx = tx.as_ref().ok_or(Error::NotConnected)?;
        tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::QueueFull,
            mpsc::error::TrySendError::Closed(_) => Error::NotConnected,
        })?;

        self.inner.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    fn on_receive(&self, callback: ReceiveFn) {
        self.inner.receivers.lock().push(callback);
    }

    fn on_disconnect(&self, callback: DisconnectFn) {
        self.inner.disconnects.lock().push(callback);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::client::collections::*;
    use crate::client::{Connection, ReplyStatus};
    use crate::collection::{CollectionNode, FilterKind, Namespace};
    use crate::index::{CollectionChange, ChangeKind, IndexConfig};
    use crate::query::{Aggregate, FetchSpec};

    type Fixture = (Arc<CollectionService>, Arc<LoopbackChannel>, Connection);

    fn setup(config: ConnectionConfig) -> Fixture {
        crate::init_test_tracing();
        let index_config = IndexConfig::default().random_seed(5);
        let service = Arc::new(CollectionService::with_config(index_config));
        service.add_media([("artist", "Air"), ("album", "Moon Safari"), ("tracknr", "1")]);
        service.add_media([("artist", "Air"), ("album", "Moon Safari"), ("tracknr", "2")]);
        service.add_media([("artist", "Air"), ("album", "Talkie Walkie"), ("tracknr", "1")]);
        service.add_media([("artist", "Bonobo"), ("album", "Black Sands"), ("tracknr", "1")]);

        let channel = LoopbackChannel::spawn_with_config(Arc::clone(&service), config.clone());
        let conn = Connection::with_config(channel.clone(), config);
        (service, channel, conn)
    }

    #[tokio::test]
    async fn test_save_get_list_roundtrip() {
        let (_service, _channel, conn) = setup(ConnectionConfig::default());
        let coll = CollectionNode::filter(FilterKind::Equals, "artist", "Air", None);

        coll_save(&conn, &coll, "Air", Namespace::Collections).unwrap().wait().await.unwrap();

        let got = coll_get(&conn, "Air", Namespace::Collections).unwrap().wait().await.unwrap();
        assert_eq!(got.as_collection().map(|c| c.as_ref()), Some(coll.as_ref()));

        let names = coll_list(&conn, Namespace::All).unwrap().wait().await.unwrap();
        assert_eq!(names.string_list(), Some(vec!["Air".to_string()]));

        let missing = coll_get(&conn, "Nope", Namespace::Playlists).unwrap().wait().await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_query_ids_matches_manual_query_with_literal_spec() {
        let (_service, _channel, conn) = setup(ConnectionConfig::default());
        let coll = CollectionNode::universe();
        let no_order: [&str; 0] = [];

        let via_recipe = coll_query_ids(&conn, &coll, &no_order, 0, 0).unwrap().wait().await;
        let via_recipe = via_recipe.unwrap();

        let literal = Value::dict([
            ("type", Value::from("cluster-list")),
            ("cluster-by", Value::from("position")),
            (
                "data",
                Value::dict([
                    ("type", Value::from("metadata")),
                    ("aggregate", Value::from("first")),
                    ("get", Value::list(["id"])),
                ]),
            ),
        ]);
        let manual = coll_query(&conn, &coll, &literal).unwrap().wait().await.unwrap();

        assert_eq!(via_recipe, manual);
        assert_eq!(via_recipe, Value::list([1, 2, 3, 4]));
    }

    #[tokio::test]
    async fn test_query_ids_orders_then_limits() {
        let (_service, _channel, conn) = setup(ConnectionConfig::default());
        let coll = CollectionNode::universe();

        let ids = coll_query_ids(&conn, &coll, &["album", "-tracknr"], 0, 0).unwrap().wait().await;
        assert_eq!(ids.unwrap(), Value::list([4, 2, 1, 3]));

        let page = coll_query_ids(&conn, &coll, &["album", "-tracknr"], 1, 2).unwrap().wait().await;
        assert_eq!(page.unwrap(), Value::list([2, 1]));
    }

    #[tokio::test]
    async fn test_query_infos_and_custom_fetch() {
        let (_service, _channel, conn) = setup(ConnectionConfig::default());
        let coll = CollectionNode::universe();

        let rows = coll_query_infos(&conn, &coll, &["-artist"], 0, 0, &["artist"], &["artist"])
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(
            rows,
            Value::list([Value::dict([("artist", "Bonobo")]), Value::dict([("artist", "Air")])])
        );

        let per_artist = FetchSpec::cluster_dict("artist", FetchSpec::count()).into_value();
        let counts = coll_query(&conn, &coll, &per_artist).unwrap().wait().await.unwrap();
        assert_eq!(counts, Value::dict([("Air", 3), ("Bonobo", 1)]));

        let albums = FetchSpec::metadata(&["album"], Aggregate::List).into_value();
        let listed = coll_query(&conn, &coll, &albums).unwrap().wait().await.unwrap();
        assert_eq!(listed.as_list().map(|l| l.len()), Some(4));
    }

    #[tokio::test]
    async fn test_remote_errors_come_back_on_the_reply() {
        let (_service, _channel, conn) = setup(ConnectionConfig::default());
        let bad = Value::dict([("type", "cluster-list")]);
        let result = coll_query(&conn, &CollectionNode::universe(), &bad).unwrap().wait().await;
        assert!(matches!(result, Err(Error::Remote(_))));
    }

    #[tokio::test]
    async fn test_too_deep_query_is_answered_with_an_error() {
        let (_service, channel, conn) = setup(ConnectionConfig::default());
        let order: Vec<String> = (0..130).map(|i| format!("p{}", i)).collect();

        let reply = coll_query_ids(&conn, &CollectionNode::universe(), &order, 0, 0).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), reply.wait()).await;
        assert!(matches!(result, Ok(Err(Error::Remote(_)))));
        assert_eq!(conn.pending_count(), 0);

        assert!(channel.is_connected());
        coll_list(&conn, Namespace::All).unwrap().wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_dag_sharing_survives_the_wire() {
        let (_service, _channel, conn) = setup(ConnectionConfig::default());
        let shared = CollectionNode::filter(FilterKind::Equals, "artist", "Air", None);
        let dag = CollectionNode::union(&[
            CollectionNode::intersection(&[shared.clone(), CollectionNode::id_list([1, 2])]),
            CollectionNode::complement(&shared),
        ]);

        coll_save(&conn, &dag, "Dag", Namespace::Playlists).unwrap().wait().await.unwrap();
        let got = coll_get(&conn, "Dag", Namespace::Playlists).unwrap().wait().await.unwrap();
        let got = got.as_collection().unwrap();

        assert_eq!(got.as_ref(), dag.as_ref());
        let left = got.operands()[0].operands()[0].clone();
        let right = got.operands()[1].operands()[0].clone();
        assert!(Arc::ptr_eq(&left, &right));
    }

    #[tokio::test]
    async fn test_collection_changed_broadcasts() {
        let (_service, _channel, conn) = setup(ConnectionConfig::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handler = signal_handler(move |_, value, _| {
            let _ = tx.send(CollectionChange::from_value(value));
        });
        let handle = broadcast_collection_changed(&conn, handler).unwrap();

        let coll = CollectionNode::id_list([1]);
        coll_save(&conn, &coll, "Queue", Namespace::Playlists).unwrap().wait().await.unwrap();
        coll_rename(&conn, "Queue", "Later", Namespace::Playlists).unwrap().wait().await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        let first = first.flatten().unwrap();
        assert_eq!(first.kind, ChangeKind::Add);
        assert_eq!(first.namespace, Namespace::Playlists);

        let second = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        let second = second.flatten().unwrap();
        assert_eq!(second.kind, ChangeKind::Rename);
        assert_eq!(second.new_name.as_deref(), Some("Later"));

        handle.disconnect().unwrap();
        coll_remove(&conn, "Later", Namespace::Playlists).unwrap().wait().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_detaches_forwarders_and_fails_fast() {
        let (service, channel, conn) = setup(ConnectionConfig::default());
        let signal = SignalId::CollectionChanged.as_u32();
        conn.on_broadcast(SignalId::CollectionChanged, |_| {}).unwrap();
        coll_sync(&conn).unwrap().wait().await.unwrap();
        assert_eq!(service.collection_object().handler_count(signal), 1);
        assert_eq!(service.sync_count(), 1);

        channel.close();
        channel.close();

        assert!(!conn.is_connected());
        assert_eq!(service.collection_object().handler_count(signal), 0);
        assert!(matches!(coll_list(&conn, Namespace::All), Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_close_fails_pending_replies() {
        let (_service, channel, conn) = setup(ConnectionConfig::default());
        let reply = coll_list(&conn, Namespace::All).unwrap();
        channel.close();

        assert_eq!(reply.status(), ReplyStatus::Failed);
        assert_eq!(reply.wait().await, Err(Error::NotConnected));
    }

    #[tokio::test]
    async fn test_without_wire_roundtrip() {
        let config = ConnectionConfig::with_name("direct").skip_wire_roundtrip();
        let (_service, channel, conn) = setup(config);
        let coll = CollectionNode::id_list([4, 3]);

        let ids = coll_query_ids(&conn, &coll, &["id"], 0, 0).unwrap().wait().await.unwrap();
        assert_eq!(ids, Value::list([3, 4]));
        assert_eq!(channel.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_queue_full() {
        let config = ConnectionConfig::default().queue_capacity(1);
        let (_service, _channel, conn) = setup(config);

        // Nothing yields between the two sends, so the reader cannot drain
        let first = coll_list(&conn, Namespace::All).unwrap();
        let second = coll_list(&conn, Namespace::All);
        assert!(matches!(second, Err(Error::QueueFull)));
        assert_eq!(conn.pending_count(), 1);
        first.wait().await.unwrap();
    }
}
