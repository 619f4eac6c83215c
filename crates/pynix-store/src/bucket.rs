//! Sharded on-disk store: `{dir}/{shard}.json`, one object per shard.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use pynix_util::errors::{PynixError, PynixResult};
use pynix_util::hash::shard_key;
use serde_json::{Map, Value};

use crate::store::MetadataStore;

type Shard = Rc<Map<String, Value>>;

/// Lazily loading reader over a bucket directory.
///
/// Each shard file is parsed at most once per store instance. A missing
/// shard file is an empty shard.
#[derive(Debug)]
pub struct BucketStore {
    dir: PathBuf,
    shards: RefCell<HashMap<String, Shard>>,
}

impl BucketStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            shards: RefCell::new(HashMap::new()),
        }
    }

    /// Open an existing bucket directory.
    pub fn open(dir: &Path) -> PynixResult<Self> {
        if !dir.is_dir() {
            return Err(PynixError::Store {
                message: format!("bucket directory {} does not exist", dir.display()),
            });
        }
        Ok(Self::new(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn shard_path(&self, shard: &str) -> PathBuf {
        self.dir.join(format!("{shard}.json"))
    }

    fn shard(&self, shard: &str) -> PynixResult<Shard> {
        if let Some(loaded) = self.shards.borrow().get(shard) {
            return Ok(Rc::clone(loaded));
        }

        let path = self.shard_path(shard);
        let map = if path.is_file() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Value>(&content)? {
                Value::Object(map) => map,
                _ => {
                    return Err(PynixError::Store {
                        message: format!("{} is not a JSON object", path.display()),
                    })
                }
            }
        } else {
            tracing::debug!("shard {} missing, treating as empty", path.display());
            Map::new()
        };

        let map = Rc::new(map);
        self.shards
            .borrow_mut()
            .insert(shard.to_string(), Rc::clone(&map));
        Ok(map)
    }
}

impl MetadataStore for BucketStore {
    fn get(&self, name: &str) -> PynixResult<Option<Value>> {
        let shard = self.shard(&shard_key(name))?;
        Ok(shard.get(name).cloned())
    }

    fn names_in_shard(&self, shard: &str) -> PynixResult<Vec<String>> {
        let mut names: Vec<String> = self.shard(shard)?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
