use std::fmt::{Debug, Display, Formatter};
use std::fs::{create_dir_all, read, remove_dir_all, rename, write};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::theory::abs::def::Def;
use crate::Error;
use crate::Error::CacheCorrupt;

pub const MAGIC: &[u8; 4] = b"VCLC";
pub const VERSION: u32 = 2;

const EXTENSION: &str = "vcc";

/// A BLAKE3 digest.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(bytes: &[u8]) -> Self {
        blake3::hash(bytes).into()
    }

    /// Hash of some own content followed by the hashes it depends on.
    pub fn with_deps(own: &[u8], deps: impl IntoIterator<Item = ContentHash>) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(own);
        hasher.update(b"\x00");
        for d in deps {
            hasher.update(&d.0);
        }
        hasher.finalize().into()
    }

    /// Hash of the encoded definitions.
    pub fn of_defs(defs: &[Def]) -> Result<Self, Error> {
        let bytes = bincode::serialize(defs).map_err(|e| CacheCorrupt(e.to_string()))?;
        Ok(Self::of(&bytes))
    }

    pub fn digest(&self) -> blake3::Hash {
        blake3::Hash::from(self.0)
    }

    pub fn to_hex(&self) -> String {
        self.digest().to_hex().to_string()
    }
}

impl From<blake3::Hash> for ContentHash {
    fn from(h: blake3::Hash) -> Self {
        Self(*h.as_bytes())
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.digest().to_hex().as_str())
    }
}

impl Debug for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", &self.to_hex()[..12])
    }
}

/// The persisted result of checking one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub module: String,
    /// Hash of the module source together with its dependency hashes.
    pub hash: ContentHash,
    /// Imported modules and the hashes they had when this entry was made.
    pub deps: Vec<(String, ContentHash)>,
    /// Exported definitions in declaration order.
    pub defs: Vec<Def>,
}

impl CacheEntry {
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let data = bincode::serialize(self).map_err(|e| CacheCorrupt(e.to_string()))?;
        let mut out = Vec::with_capacity(MAGIC.len() + std::mem::size_of::<u32>() + data.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&data);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let header = MAGIC.len() + std::mem::size_of::<u32>();
        if bytes.len() < header || &bytes[..MAGIC.len()] != MAGIC {
            return Err(CacheCorrupt("bad magic".to_string()));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[MAGIC.len()..header]);
        let version = u32::from_le_bytes(version);
        if version != VERSION {
            return Err(CacheCorrupt(format!(
                "format version {version}, expected {VERSION}"
            )));
        }
        bincode::deserialize(&bytes[header..]).map_err(|e| CacheCorrupt(e.to_string()))
    }

    /// Whether the entry still describes `hash` with the given dependency
    /// hashes.
    pub fn is_valid(&self, hash: &ContentHash, deps: &[(String, ContentHash)]) -> bool {
        self.hash == *hash && self.deps == deps
    }
}

/// Cache entries stored as one file per module.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, module: &str) -> PathBuf {
        self.dir.join(format!("{module}.{EXTENSION}"))
    }

    /// Reads the entry of a module. Missing and unreadable entries are both
    /// misses.
    pub fn load(&self, module: &str) -> Option<CacheEntry> {
        let path = self.path(module);
        let bytes = match read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(target: "cache", "cannot read {}: {e}", path.display());
                return None;
            }
        };
        match CacheEntry::decode(&bytes) {
            Ok(entry) if entry.module == module => Some(entry),
            Ok(entry) => {
                warn!(target: "cache", "{} holds module {}", path.display(), entry.module);
                None
            }
            Err(e) => {
                warn!(target: "cache", "{}: {e}", path.display());
                None
            }
        }
    }

    pub fn store(&self, entry: &CacheEntry) -> Result<(), Error> {
        create_dir_all(&self.dir)?;
        let path = self.path(&entry.module);
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        write(&tmp, entry.encode()?)?;
        rename(&tmp, &path)?;
        info!(target: "cache", "stored {} ({})", entry.module, entry.hash);
        Ok(())
    }

    pub fn clean(&self) -> Result<(), Error> {
        match remove_dir_all(&self.dir) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
