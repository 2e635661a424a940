//! Loopback query demo
//!
//! Run with: cargo run --example loopback_query
//!
//! Starts an in-process collection service, fills a small library, and
//! drives it through a `Connection` the way a remote client would:
//!
//! ```text
//!   Connection ──> LoopbackChannel ──> CollectionService
//!       ▲               (wire)                │
//!       └──────── replies / broadcasts ───────┘
//! ```

use std::sync::Arc;

use medialib_rs::client::{
    broadcast_collection_changed, coll_list, coll_query, coll_query_ids, coll_query_infos,
    coll_save, LoopbackChannel,
};
use medialib_rs::collection::FilterKind;
use medialib_rs::index::{CollectionChange, CollectionService};
use medialib_rs::object::signal_handler;
use medialib_rs::query::{Aggregate, FetchSpec};
use medialib_rs::{CollectionNode, Connection, Namespace};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("medialib_rs=debug".parse()?),
        )
        .init();

    let service = Arc::new(CollectionService::new());
    for (artist, album, track) in [
        ("Air", "Moon Safari", "1"),
        ("Air", "Moon Safari", "2"),
        ("Air", "Talkie Walkie", "1"),
        ("Bonobo", "Black Sands", "1"),
    ] {
        service.add_media([("artist", artist), ("album", album), ("tracknr", track)]);
    }

    let channel = LoopbackChannel::spawn(Arc::clone(&service));
    let conn = Connection::new(channel.clone());

    let _changes = broadcast_collection_changed(
        &conn,
        signal_handler(|_, value, _| {
            if let Some(change) = CollectionChange::from_value(value) {
                println!("changed: {:?} {:?}", change.kind, change.namespace);
            }
        }),
    )?;

    let all = CollectionNode::universe();
    let ids = coll_query_ids(&conn, &all, &["album", "-tracknr"], 0, 0)?.wait().await?;
    println!("ids by album, track descending: {:?}", ids);

    let rows = coll_query_infos(&conn, &all, &["artist"], 0, 0, &["artist"], &["artist"])?
        .wait()
        .await?;
    println!("artists: {:?}", rows);

    let per_artist = FetchSpec::cluster_dict("artist", FetchSpec::count()).into_value();
    let counts = coll_query(&conn, &all, &per_artist)?.wait().await?;
    println!("tracks per artist: {:?}", counts);

    let albums = FetchSpec::metadata(&["album"], Aggregate::List).into_value();
    let air = CollectionNode::filter(FilterKind::Equals, "artist", "Air", None);
    println!("air albums: {:?}", coll_query(&conn, &air, &albums)?.wait().await?);

    coll_save(&conn, &air, "Air", Namespace::Playlists)?.wait().await?;
    let names = coll_list(&conn, Namespace::All)?.wait().await?;
    println!("saved: {:?}", names);

    channel.close();
    Ok(())
}
