//! Collection commands
//!
//! Each function checks the connection, validates its arguments locally,
//! lays them out in the command's positional order and sends the command.
//! Local failures are returned right away and nothing is sent; remote
//! failures arrive through the returned `PendingReply`.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::collection::{add_order_operators, Collection, Namespace};
use crate::error::{Error, Result};
use crate::object::SignalHandler;
use crate::protocol::{CollectionCommand, ObjectId, SignalId, COMMAND_COLL_SYNC};
use crate::query::ids_query;
use crate::value::Value;

use super::connection::{BroadcastHandle, Connection};
use super::pending::PendingReply;

/// Characters left as-is when encoding playlist paths; space becomes `+`
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b':')
    .remove(b'/')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b' ');

fn send(conn: &Connection, command: CollectionCommand, args: Vec<Value>) -> Result<PendingReply> {
    conn.send_command(ObjectId::Collection, command.id(), args)
}

fn require_name(name: &str, what: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid(format!("{} must not be empty", what)));
    }
    Ok(())
}

fn string_list<S: AsRef<str>>(items: &[S]) -> Value {
    Value::list(items.iter().map(|s| s.as_ref()))
}

/// Fetch the saved collection `name`
pub fn coll_get(conn: &Connection, name: &str, namespace: Namespace) -> Result<PendingReply> {
    conn.ensure_connected()?;
    require_name(name, "collection name")?;
    send(
        conn,
        CollectionCommand::Get,
        vec![name.into(), namespace.as_str().into()],
    )
}

/// Ask the server to write saved collections to storage
pub fn coll_sync(conn: &Connection) -> Result<PendingReply> {
    conn.send_command(ObjectId::CollSync, COMMAND_COLL_SYNC, Vec::new())
}

/// Names of the collections saved in `namespace`
pub fn coll_list(conn: &Connection, namespace: Namespace) -> Result<PendingReply> {
    conn.ensure_connected()?;
    send(conn, CollectionCommand::List, vec![namespace.as_str().into()])
}

/// Save `collection` as `name`, replacing any collection of that name
pub fn coll_save(
    conn: &Connection,
    collection: &Collection,
    name: &str,
    namespace: Namespace,
) -> Result<PendingReply> {
    conn.ensure_connected()?;
    require_name(name, "collection name")?;
    namespace.ensure_writable()?;
    send(
        conn,
        CollectionCommand::Save,
        vec![
            name.into(),
            namespace.as_str().into(),
            Value::Collection(Collection::clone(collection)),
        ],
    )
}

pub fn coll_remove(conn: &Connection, name: &str, namespace: Namespace) -> Result<PendingReply> {
    conn.ensure_connected()?;
    require_name(name, "collection name")?;
    namespace.ensure_writable()?;
    send(
        conn,
        CollectionCommand::Remove,
        vec![name.into(), namespace.as_str().into()],
    )
}

/// Names of the saved collections in `namespace` that contain media `mid`
pub fn coll_find(conn: &Connection, mid: i64, namespace: Namespace) -> Result<PendingReply> {
    conn.ensure_connected()?;
    if mid <= 0 {
        return Err(Error::invalid("media id must be positive"));
    }
    send(
        conn,
        CollectionCommand::Find,
        vec![mid.into(), namespace.as_str().into()],
    )
}

pub fn coll_rename(
    conn: &Connection,
    from_name: &str,
    to_name: &str,
    namespace: Namespace,
) -> Result<PendingReply> {
    conn.ensure_connected()?;
    require_name(from_name, "source name")?;
    require_name(to_name, "target name")?;
    namespace.ensure_writable()?;
    send(
        conn,
        CollectionCommand::Rename,
        vec![from_name.into(), to_name.into(), namespace.as_str().into()],
    )
}

/// Evaluate `collection` and apply `fetch` to the matches.
///
/// The spec is forwarded as given; only an absent spec is rejected.
pub fn coll_query(
    conn: &Connection,
    collection: &Collection,
    fetch: &Value,
) -> Result<PendingReply> {
    conn.ensure_connected()?;
    if fetch.is_none() {
        return Err(Error::invalid("fetch spec is required"));
    }
    send(
        conn,
        CollectionCommand::Query,
        vec![Value::Collection(Collection::clone(collection)), fetch.clone()],
    )
}

/// Ordered list of the media ids matching `collection`.
///
/// `order` uses the ordering syntax of [`add_order_operators`]; `start` and
/// `length` page through the ordered matches (both 0 for everything).
pub fn coll_query_ids<S: AsRef<str>>(
    conn: &Connection,
    collection: &Collection,
    order: &[S],
    start: u32,
    length: u32,
) -> Result<PendingReply> {
    conn.ensure_connected()?;
    let (windowed, spec) = ids_query(collection, order, start, length);
    coll_query(conn, &windowed, &spec.into_value())
}

/// One row of `fetch` properties per match, or per distinct combination of
/// `group` values when grouping.
pub fn coll_query_infos<S: AsRef<str>>(
    conn: &Connection,
    collection: &Collection,
    order: &[S],
    start: u32,
    length: u32,
    fetch: &[S],
    group: &[S],
) -> Result<PendingReply> {
    conn.ensure_connected()?;
    if fetch.is_empty() {
        return Err(Error::invalid("at least one property to fetch is required"));
    }
    let ordered = add_order_operators(collection, order);
    send(
        conn,
        CollectionCommand::QueryInfos,
        vec![
            Value::Collection(ordered),
            start.into(),
            length.into(),
            string_list(fetch),
            string_list(group),
        ],
    )
}

/// Import a playlist file into an idlist collection
pub fn coll_idlist_from_playlist_file(conn: &Connection, path: &str) -> Result<PendingReply> {
    conn.ensure_connected()?;
    require_name(path, "playlist path")?;
    send(
        conn,
        CollectionCommand::IdlistFromPlaylist,
        vec![encode_path_url(path).into()],
    )
}

/// Percent-encode `path` as a file url; spaces become `+`
pub fn encode_path_url(path: &str) -> String {
    let url = if path.contains("://") {
        path.to_string()
    } else {
        format!("file://{}", path)
    };
    utf8_percent_encode(&url, PATH_ENCODE_SET)
        .to_string()
        .replace(' ', "+")
}

/// Subscribe to collection-changed broadcasts
pub fn broadcast_collection_changed(
    conn: &Connection,
    handler: SignalHandler,
) -> Result<BroadcastHandle> {
    conn.subscribe_broadcast(SignalId::CollectionChanged, handler)
}
