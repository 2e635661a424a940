//! Object, command, signal and reply identifiers
//!
//! Command ids start at [`COMMAND_FIRST`]; lower ids are reserved for
//! replies. Each command has a fixed positional argument contract, listed
//! by [`CollectionCommand::arguments`].

/// First id usable by commands
pub const COMMAND_FIRST: u32 = 32;

/// Reply carrying a successful result
pub const REPLY_OK: u32 = 0;
/// Reply carrying an opaque evaluator error
pub const REPLY_ERROR: u32 = 1;
/// Reply carrying a lookup miss
pub const REPLY_NOT_FOUND: u32 = 2;

/// Ask the peer to forward a signal as a broadcast; args: signal id
pub const COMMAND_SIGNAL_BROADCAST: u32 = COMMAND_FIRST;

/// Flush saved collections to storage; no args
pub const COMMAND_COLL_SYNC: u32 = COMMAND_FIRST;

/// Addressable objects on the server side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectId {
    /// Broadcast subscription management
    Signal,
    /// Saved collections and queries
    Collection,
    /// Collection persistence
    CollSync,
}

impl ObjectId {
    pub fn as_u32(self) -> u32 {
        match self {
            ObjectId::Signal => 0,
            ObjectId::Collection => 1,
            ObjectId::CollSync => 2,
        }
    }

    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => ObjectId::Signal,
            1 => ObjectId::Collection,
            2 => ObjectId::CollSync,
            _ => return None,
        })
    }
}

/// Signals that can be subscribed to as broadcasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalId {
    /// A saved collection was added, updated, removed or renamed
    CollectionChanged,
}

impl SignalId {
    pub fn as_u32(self) -> u32 {
        match self {
            SignalId::CollectionChanged => 1,
        }
    }

    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(SignalId::CollectionChanged),
            _ => None,
        }
    }
}

/// Commands of the collection object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionCommand {
    Get,
    List,
    Save,
    Remove,
    Find,
    Rename,
    Query,
    QueryInfos,
    IdlistFromPlaylist,
}

impl CollectionCommand {
    pub const ALL: [CollectionCommand; 9] = [
        CollectionCommand::Get,
        CollectionCommand::List,
        CollectionCommand::Save,
        CollectionCommand::Remove,
        CollectionCommand::Find,
        CollectionCommand::Rename,
        CollectionCommand::Query,
        CollectionCommand::QueryInfos,
        CollectionCommand::IdlistFromPlaylist,
    ];

    pub fn id(self) -> u32 {
        COMMAND_FIRST
            + match self {
                CollectionCommand::Get => 0,
                CollectionCommand::List => 1,
                CollectionCommand::Save => 2,
                CollectionCommand::Remove => 3,
                CollectionCommand::Find => 4,
                CollectionCommand::Rename => 5,
                CollectionCommand::Query => 6,
                CollectionCommand::QueryInfos => 7,
                CollectionCommand::IdlistFromPlaylist => 8,
            }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.id() == id)
    }

    /// Positional argument names, in wire order
    pub fn arguments(self) -> &'static [&'static str] {
        match self {
            CollectionCommand::Get => &["name", "namespace"],
            CollectionCommand::List => &["namespace"],
            CollectionCommand::Save => &["name", "namespace", "collection"],
            CollectionCommand::Remove => &["name", "namespace"],
            CollectionCommand::Find => &["mid", "namespace"],
            CollectionCommand::Rename => &["from_name", "to_name", "namespace"],
            CollectionCommand::Query => &["collection", "fetch"],
            CollectionCommand::QueryInfos => &["collection", "start", "length", "fetch", "group"],
            CollectionCommand::IdlistFromPlaylist => &["url"],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CollectionCommand::Get => "get",
            CollectionCommand::List => "list",
            CollectionCommand::Save => "save",
            CollectionCommand::Remove => "remove",
            CollectionCommand::Find => "find",
            CollectionCommand::Rename => "rename",
            CollectionCommand::Query => "query",
            CollectionCommand::QueryInfos => "query_infos",
            CollectionCommand::IdlistFromPlaylist => "idlist_from_playlist",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_ids_are_unique_and_reversible() {
        let mut seen = std::collections::HashSet::new();
        for cmd in CollectionCommand::ALL {
            assert!(cmd.id() >= COMMAND_FIRST);
            assert!(seen.insert(cmd.id()));
            assert_eq!(CollectionCommand::from_id(cmd.id()), Some(cmd));
        }
        assert_eq!(CollectionCommand::from_id(REPLY_OK), None);
    }

    #[test]
    fn test_object_ids() {
        for obj in [ObjectId::Signal, ObjectId::Collection, ObjectId::CollSync] {
            assert_eq!(ObjectId::from_u32(obj.as_u32()), Some(obj));
        }
        assert_eq!(ObjectId::from_u32(77), None);
    }

    #[test]
    fn test_argument_contracts() {
        assert_eq!(CollectionCommand::Save.arguments(), &["name", "namespace", "collection"]);
        assert_eq!(CollectionCommand::QueryInfos.arguments().len(), 5);
        assert_eq!(
            SignalId::from_u32(SignalId::CollectionChanged.as_u32()),
            Some(SignalId::CollectionChanged)
        );
    }
}
