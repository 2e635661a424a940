//! Saved-collection namespaces

use std::str::FromStr;

use crate::error::{Error, Result};

/// Partition of saved collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Plain saved collections
    Collections,
    /// Saved playlists
    Playlists,
    /// Both of the above; read-only
    All,
}

impl Namespace {
    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Collections => "Collections",
            Namespace::Playlists => "Playlists",
            Namespace::All => "*",
        }
    }

    /// Namespaces a read on `self` spans
    pub fn expand(self) -> &'static [Namespace] {
        match self {
            Namespace::Collections => &[Namespace::Collections],
            Namespace::Playlists => &[Namespace::Playlists],
            Namespace::All => &[Namespace::Collections, Namespace::Playlists],
        }
    }

    /// Reject `All` for save, remove and rename
    pub fn ensure_writable(self) -> Result<()> {
        match self {
            Namespace::All => Err(Error::invalid(
                "the All namespace is read-only",
            )),
            _ => Ok(()),
        }
    }
}

impl FromStr for Namespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Collections" => Ok(Namespace::Collections),
            "Playlists" => Ok(Namespace::Playlists),
            "*" => Ok(Namespace::All),
            other => Err(Error::invalid(format!("unknown namespace: {}", other))),
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        for ns in [Namespace::Collections, Namespace::Playlists, Namespace::All] {
            assert_eq!(ns.as_str().parse::<Namespace>().unwrap(), ns);
        }
        assert!(matches!(
            "Queue".parse::<Namespace>(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_all_is_read_only() {
        assert!(Namespace::Collections.ensure_writable().is_ok());
        assert!(Namespace::Playlists.ensure_writable().is_ok());
        assert!(matches!(
            Namespace::All.ensure_writable(),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(Namespace::All.expand().len(), 2);
    }
}
