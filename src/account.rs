use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::vdf::{self, DecodeOptions, FormatError, Node};

/// Offset between a 64-bit Steam id and the 32-bit account id used in `userdata/`.
pub const STEAMID_LONG_BASE: i64 = 76_561_197_960_265_728;

const USERS_KEY: &str = "users";
const MOST_RECENT_KEY: &str = "MostRecent";

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed login registry{}: {reason}", display_origin(.path))]
    Malformed {
        path: Option<PathBuf>,
        reason: String,
    },
    #[error("no active account{}: no entry under \"users\" has MostRecent = 1", display_origin(.path))]
    NoActiveAccount { path: Option<PathBuf> },
    #[error("bad id format: \"{0}\" is not a long-form Steam id")]
    BadIdFormat(String),
}

fn display_origin(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|path| format!(" in {}", path.display()))
        .unwrap_or_default()
}

impl ResolutionError {
    fn with_path(self, origin: &Path) -> Self {
        match self {
            ResolutionError::Malformed { reason, .. } => ResolutionError::Malformed {
                path: Some(origin.to_path_buf()),
                reason,
            },
            ResolutionError::NoActiveAccount { .. } => ResolutionError::NoActiveAccount {
                path: Some(origin.to_path_buf()),
            },
            other => other,
        }
    }
}

/// Account id as it appears in `userdata/<id>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortId(String);

impl ShortId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ShortId> for String {
    fn from(id: ShortId) -> Self {
        id.0
    }
}

/// Converts a long-form id from `loginusers.vdf` to the short form.
pub fn shorten_steam_id(long_id: &str) -> Result<ShortId, ResolutionError> {
    let parsed: i64 = long_id
        .trim()
        .parse()
        .map_err(|_| ResolutionError::BadIdFormat(long_id.to_string()))?;
    if parsed < STEAMID_LONG_BASE {
        return Err(ResolutionError::BadIdFormat(long_id.to_string()));
    }
    Ok(ShortId((parsed - STEAMID_LONG_BASE).to_string()))
}

pub fn resolve_active_account(
    path: &Path,
    options: &DecodeOptions,
) -> Result<ShortId, ResolutionError> {
    let text = fs::read_to_string(path).map_err(|source| ResolutionError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    resolve_from_text(&text, options).map_err(|err| err.with_path(path))
}

pub fn resolve_from_text(text: &str, options: &DecodeOptions) -> Result<ShortId, ResolutionError> {
    let document = vdf::decode_with(text, options).map_err(|err: FormatError| {
        ResolutionError::Malformed {
            path: None,
            reason: err.to_string(),
        }
    })?;
    resolve_from_document(&document)
}

/// Picks the account flagged `MostRecent`. When several are flagged the one that comes
/// last in the file wins.
pub fn resolve_from_document(document: &Node) -> Result<ShortId, ResolutionError> {
    let users = document
        .navigate(&[USERS_KEY])
        .and_then(Node::as_mapping)
        .ok_or_else(|| ResolutionError::Malformed {
            path: None,
            reason: "missing top-level \"users\" block".to_string(),
        })?;

    let mut active = None;
    for (long_id, entry) in users.iter() {
        let flagged = entry
            .get_scalar(&[MOST_RECENT_KEY])
            .is_some_and(|value| value.trim() == "1");
        if flagged {
            active = Some(long_id);
        }
    }

    let long_id = active.ok_or(ResolutionError::NoActiveAccount { path: None })?;
    shorten_steam_id(long_id)
}
