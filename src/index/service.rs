//! Collection service
//!
//! Exposes a library and a collection store as addressable objects. Each
//! command of the collection object is a handler registered on that object;
//! mutations of the store are announced on the same object through the
//! collection-changed signal.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::collection::{CollectionNode, Namespace};
use crate::error::{Error, Result};
use crate::object::{CommandArgs, Object};
use crate::protocol::{CollectionCommand, ObjectId, SignalId, COMMAND_COLL_SYNC};
use crate::value::Value;

use super::config::IndexConfig;
use super::eval::Evaluator;
use super::library::{Library, PROPERTY_URL};
use super::store::{CollectionChange, CollectionStore};

const FILE_SCHEME: &str = "file://";

struct State {
    config: IndexConfig,
    library: Mutex<Library>,
    store: Mutex<CollectionStore>,
    rng: Mutex<StdRng>,
    syncs: AtomicU64,
}

impl State {
    /// Run `f` with an evaluator; locks library, store, rng in that order
    fn with_evaluator<T>(&self, f: impl FnOnce(&mut Evaluator<'_>) -> Result<T>) -> Result<T> {
        let library = self.library.lock();
        let store = self.store.lock();
        let mut rng = self.rng.lock();
        let mut evaluator = Evaluator::new(&library, &store, &mut rng);
        f(&mut evaluator)
    }
}

/// In-process evaluator behind the collection and sync objects
pub struct CollectionService {
    state: Arc<State>,
    collection: Object,
    coll_sync: Object,
}

impl CollectionService {
    pub fn new() -> Self {
        Self::with_config(IndexConfig::default())
    }

    pub fn with_config(config: IndexConfig) -> Self {
        let seed = config.random_seed.unwrap_or_else(rand::random);
        let collection = Object::new(format!("{}.collection", config.name));
        let coll_sync = Object::new(format!("{}.coll_sync", config.name));
        let state = Arc::new(State {
            config,
            library: Mutex::new(Library::new()),
            store: Mutex::new(CollectionStore::new()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            syncs: AtomicU64::new(0),
        });

        let service = Self {
            state,
            collection,
            coll_sync,
        };
        service.register_commands();

        tracing::info!(name = %service.state.config.name, "Collection service created");
        service
    }

    fn register_commands(&self) {
        for command in CollectionCommand::ALL {
            let state = Arc::clone(&self.state);
            let registered = self.collection.command(command.id(), move |object, args| {
                let outcome = handle(&state, object, command, args);
                if let Err(e) = &outcome {
                    tracing::debug!(command = command.name(), error = %e, "Command failed");
                }
                args.finish(outcome);
            });
            if let Err(e) = registered {
                tracing::error!(command = command.name(), error = %e, "Failed to register command");
            }
        }

        let state = Arc::clone(&self.state);
        let registered = self.coll_sync.command(COMMAND_COLL_SYNC, move |_, args| {
            let generation = state.syncs.fetch_add(1, Ordering::Relaxed) + 1;
            let saved = state.store.lock().len();
            tracing::debug!(generation = generation, collections = saved, "Collections synced");
            args.finish(Ok(Value::None));
        });
        if let Err(e) = registered {
            tracing::error!(error = %e, "Failed to register sync command");
        }
    }

    /// The object addressed by `id`, if this service serves it
    pub fn object(&self, id: ObjectId) -> Option<&Object> {
        match id {
            ObjectId::Collection => Some(&self.collection),
            ObjectId::CollSync => Some(&self.coll_sync),
            ObjectId::Signal => None,
        }
    }

    /// Object that emits the collection-changed signal
    pub fn collection_object(&self) -> &Object {
        &self.collection
    }

    /// Invoke `command_id` on `object_id` with positional `args`
    pub fn call(&self, object_id: ObjectId, command_id: u32, args: Vec<Value>) -> Result<Value> {
        let object = self
            .object(object_id)
            .ok_or_else(|| Error::invalid(format!("object {:?} has no commands", object_id)))?;
        let mut call = CommandArgs::new(args);
        object.call(command_id, &mut call);
        call.into_result()
    }

    /// Add a media entry and return its id
    pub fn add_media<I, K, V>(&self, properties: I) -> i64
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.state.library.lock().add(properties)
    }

    /// Inspect or modify the library
    pub fn with_library<T>(&self, f: impl FnOnce(&mut Library) -> T) -> T {
        f(&mut self.state.library.lock())
    }

    /// Number of sync requests served
    pub fn sync_count(&self) -> u64 {
        self.state.syncs.load(Ordering::Relaxed)
    }
}

impl Default for CollectionService {
    fn default() -> Self {
        Self::new()
    }
}

fn namespace_arg(args: &CommandArgs, index: usize) -> Result<Namespace> {
    args.str_arg(index, "namespace")?.parse()
}

fn window_arg(args: &CommandArgs, index: usize, name: &str) -> Result<u64> {
    u64::try_from(args.int_arg(index, name)?)
        .map_err(|_| Error::invalid(format!("{} must not be negative", name)))
}

fn announce(object: &Object, change: CollectionChange) {
    object.emit(SignalId::CollectionChanged.as_u32(), change.to_value());
}

fn handle(
    state: &State,
    object: &Object,
    command: CollectionCommand,
    args: &CommandArgs,
) -> Result<Value> {
    match command {
        CollectionCommand::Get => {
            let name = args.str_arg(0, "name")?;
            let namespace = namespace_arg(args, 1)?;
            let collection = state.store.lock().get(name, namespace)?;
            Ok(Value::Collection(collection))
        }
        CollectionCommand::List => {
            let namespace = namespace_arg(args, 0)?;
            Ok(Value::list(state.store.lock().list(namespace)))
        }
        CollectionCommand::Save => {
            let name = args.str_arg(0, "name")?;
            let namespace = namespace_arg(args, 1)?;
            let collection = args.collection_arg(2, "collection")?;
            let change = state.store.lock().save(name, namespace, Arc::clone(collection))?;
            announce(object, change);
            Ok(Value::None)
        }
        CollectionCommand::Remove => {
            let name = args.str_arg(0, "name")?;
            let namespace = namespace_arg(args, 1)?;
            let change = state.store.lock().remove(name, namespace)?;
            announce(object, change);
            Ok(Value::None)
        }
        CollectionCommand::Rename => {
            let from = args.str_arg(0, "from_name")?;
            let to = args.str_arg(1, "to_name")?;
            let namespace = namespace_arg(args, 2)?;
            let change = state.store.lock().rename(from, to, namespace)?;
            announce(object, change);
            Ok(Value::None)
        }
        CollectionCommand::Find => {
            let mid = args.int_arg(0, "mid")?;
            let namespace = namespace_arg(args, 1)?;
            let entries = state.store.lock().entries(namespace);
            state.with_evaluator(|eval| {
                let mut names = Vec::new();
                for (ns, name, collection) in entries {
                    match eval.evaluate(&collection) {
                        Ok(ids) if ids.contains(&mid) => names.push(Value::from(name)),
                        Ok(_) => {}
                        Err(e) => {
                            tracing::debug!(
                                name = %name,
                                namespace = %ns,
                                error = %e,
                                "Skipping unevaluable collection"
                            );
                        }
                    }
                }
                Ok(Value::list(names))
            })
        }
        CollectionCommand::Query => {
            let collection = args.collection_arg(0, "collection")?;
            let spec = args.arg(1, "fetch")?;
            state.with_evaluator(|eval| {
                let ids = eval.evaluate(collection)?;
                eval.fetch(&ids, spec, state.config.strict_fetch_spec)
            })
        }
        CollectionCommand::QueryInfos => {
            let collection = args.collection_arg(0, "collection")?;
            let start = window_arg(args, 1, "start")?;
            let length = window_arg(args, 2, "length")?;
            let fetch = args.string_list_arg(3, "fetch")?;
            let group = match args.args.get(4) {
                None | Some(Value::None) => Vec::new(),
                Some(_) => args.string_list_arg(4, "group")?,
            };
            if fetch.is_empty() {
                return Err(Error::invalid("fetch list must not be empty"));
            }
            state.with_evaluator(|eval| {
                let ids = eval.evaluate(collection)?;
                Ok(Value::list(eval.infos(&ids, &fetch, &group, start, length)))
            })
        }
        CollectionCommand::IdlistFromPlaylist => {
            let url = args.str_arg(0, "url")?;
            let path = decode_file_url(url)?;
            let entries = read_playlist(&path)?;

            let mut library = state.library.lock();
            let mut ids = Vec::with_capacity(entries.len());
            for entry in entries {
                let url = Value::from(entry);
                let id = match library.find_by(PROPERTY_URL, &url) {
                    Some(id) => id,
                    None => library.add([(PROPERTY_URL, url)]),
                };
                ids.push(id);
            }

            tracing::debug!(path = %path.display(), entries = ids.len(), "Playlist imported");
            Ok(Value::Collection(CollectionNode::id_list(ids)))
        }
    }
}

/// Undo the client-side url encoding: `+` is a space, then percent escapes
fn decode_file_url(url: &str) -> Result<PathBuf> {
    let spaced = url.replace('+', " ");
    let decoded = percent_decode_str(&spaced)
        .decode_utf8()
        .map_err(|_| Error::Remote(format!("playlist url is not valid UTF-8: {}", url)))?;
    let path = decoded.strip_prefix(FILE_SCHEME).unwrap_or(&decoded);
    Ok(PathBuf::from(path))
}

/// Entries of an m3u-style playlist as urls; relative paths are resolved
/// against the playlist's directory
fn read_playlist(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Remote(format!("cannot read playlist {}: {}", path.display(), e)))?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));

    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            if line.contains("://") {
                line.to_string()
            } else {
                let resolved = base.join(line);
                format!("{}{}", FILE_SCHEME, resolved.display())
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{add_order_operators, Collection};
    use crate::index::store::ChangeKind;
    use crate::query::{ids_fetch_spec, FetchSpec};

    fn service() -> CollectionService {
        let service = CollectionService::with_config(IndexConfig::default().random_seed(11));
        service.add_media([("artist", "Air"), ("title", "La femme d'argent")]);
        service.add_media([("artist", "Air"), ("title", "Sexy Boy")]);
        service.add_media([("artist", "Bonobo"), ("title", "Kiara")]);
        service
    }

    fn call(
        service: &CollectionService,
        command: CollectionCommand,
        args: Vec<Value>,
    ) -> Result<Value> {
        service.call(ObjectId::Collection, command.id(), args)
    }

    fn save(
        service: &CollectionService,
        name: &str,
        namespace: &str,
        coll: &Collection,
    ) -> Result<Value> {
        call(
            service,
            CollectionCommand::Save,
            vec![name.into(), namespace.into(), Arc::clone(coll).into()],
        )
    }

    #[test]
    fn test_save_get_list_remove() {
        let service = service();
        let coll = CollectionNode::id_list([2, 3]);

        save(&service, "Mix", "Playlists", &coll).unwrap();
        let got = call(&service, CollectionCommand::Get, vec!["Mix".into(), "Playlists".into()]);
        assert_eq!(got.unwrap().as_collection().unwrap(), &coll);

        let listed = call(&service, CollectionCommand::List, vec!["*".into()]).unwrap();
        assert_eq!(listed.string_list(), Some(vec!["Mix".to_string()]));

        call(&service, CollectionCommand::Remove, vec!["Mix".into(), "Playlists".into()]).unwrap();
        assert!(matches!(
            call(&service, CollectionCommand::Get, vec!["Mix".into(), "Playlists".into()]),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_writes_to_all_are_rejected() {
        let service = service();
        let result = save(&service, "Mix", "*", &CollectionNode::universe());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_changes_are_announced() {
        let service = service();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        service
            .collection_object()
            .connect(SignalId::CollectionChanged.as_u32(), move |_, value| {
                sink.lock().push(CollectionChange::from_value(value).unwrap().kind);
            });

        let coll = CollectionNode::universe();
        save(&service, "A", "Collections", &coll).unwrap();
        save(&service, "A", "Collections", &coll).unwrap();
        call(
            &service,
            CollectionCommand::Rename,
            vec!["A".into(), "B".into(), "Collections".into()],
        )
        .unwrap();
        call(&service, CollectionCommand::Remove, vec!["B".into(), "Collections".into()]).unwrap();

        assert_eq!(
            *seen.lock(),
            vec![ChangeKind::Add, ChangeKind::Update, ChangeKind::Rename, ChangeKind::Remove]
        );
    }

    #[test]
    fn test_find() {
        let service = service();
        save(&service, "Air", "Collections", &CollectionNode::id_list([1, 2])).unwrap();
        save(&service, "Queue", "Playlists", &CollectionNode::id_list([2])).unwrap();

        let found = call(&service, CollectionCommand::Find, vec![2.into(), "*".into()]).unwrap();
        assert_eq!(found.string_list(), Some(vec!["Air".to_string(), "Queue".to_string()]));

        let found = call(&service, CollectionCommand::Find, vec![1.into(), "Playlists".into()]);
        assert_eq!(found.unwrap().string_list(), Some(vec![]));
    }

    #[test]
    fn test_query_and_query_infos() {
        let service = service();
        let coll = add_order_operators(&CollectionNode::universe(), &["-id"]);

        let ids = call(
            &service,
            CollectionCommand::Query,
            vec![coll.clone().into(), ids_fetch_spec().into()],
        );
        assert_eq!(ids.unwrap(), Value::list([3, 2, 1]));

        let count = call(
            &service,
            CollectionCommand::Query,
            vec![coll.clone().into(), FetchSpec::count().into()],
        );
        assert_eq!(count.unwrap(), Value::Int64(3));

        let rows = call(
            &service,
            CollectionCommand::QueryInfos,
            vec![
                coll.into(),
                0.into(),
                0.into(),
                Value::list(["artist"]),
                Value::list(["artist"]),
            ],
        )
        .unwrap();
        let expected = Value::list([
            Value::dict([("artist", "Bonobo")]),
            Value::dict([("artist", "Air")]),
        ]);
        assert_eq!(rows, expected);
    }

    #[test]
    fn test_bad_fetch_spec_is_remote_error() {
        let service = service();
        let spec = Value::dict([("type", "metadata")]);
        let args = vec![CollectionNode::universe().into(), spec];
        let result = call(&service, CollectionCommand::Query, args);
        assert!(matches!(result, Err(Error::Remote(_))));
    }

    #[test]
    fn test_sync_and_unknown_command() {
        let service = service();
        service.call(ObjectId::CollSync, COMMAND_COLL_SYNC, vec![]).unwrap();
        assert_eq!(service.sync_count(), 1);

        assert_eq!(service.call(ObjectId::Collection, 999, vec![]).unwrap(), Value::None);
        assert!(service.call(ObjectId::Signal, 32, vec![]).is_err());
    }

    #[test]
    fn test_playlist_import() {
        let dir = std::env::temp_dir().join(format!("medialib-rs-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("my list.m3u");
        let contents = "#EXTM3U\nfile:///music/a.ogg\n\nb.ogg\nfile:///music/a.ogg\n";
        std::fs::write(&path, contents).unwrap();

        let service = service();
        let existing = service.add_media([("url", "file:///music/a.ogg")]);

        let url = format!("file://{}", path.display()).replace(' ', "+");
        let result = call(&service, CollectionCommand::IdlistFromPlaylist, vec![url.into()]);
        let ids = result.unwrap().as_collection().unwrap().idlist().to_vec();

        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], existing);
        assert_eq!(ids[2], existing);
        let added = service.with_library(|lib| lib.property(ids[1], "url"));
        assert_eq!(
            added,
            Some(Value::from(format!("file://{}", dir.join("b.ogg").display())))
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_playlist_is_remote_error() {
        let service = service();
        let result = call(
            &service,
            CollectionCommand::IdlistFromPlaylist,
            vec!["file:///does/not/exist.m3u".into()],
        );
        assert!(matches!(result, Err(Error::Remote(_))));
    }
}
