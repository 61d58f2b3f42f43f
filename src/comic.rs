use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

pub type ComicId = u64;

/// A single comic issue. The id is assigned by whichever store owns the
/// record; an id carried in an inbound payload is advisory only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comic {
    #[serde(default)]
    pub id: ComicId,
    pub title: String,
    pub writer: String,
    pub artist: String,
    pub letterer: String,
}

/// In-memory comic store. Keys are unique, ids are never reused within a
/// process, and nothing survives process exit.
#[derive(Debug, Default)]
pub struct ComicStore {
    comics: HashMap<ComicId, Comic>,
    next_id: ComicId,
}

impl ComicStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed used by the server binary at startup, standing in for an
    /// external bulk-load collaborator.
    pub fn load() -> Self {
        let mut store = Self::new();
        store.create(Comic {
            id: 0,
            title: "The Amazing Spider-Man #1".to_string(),
            writer: "Stan Lee".to_string(),
            artist: "Steve Ditko".to_string(),
            letterer: "Artie Simek".to_string(),
        });
        store
    }

    /// Inserts a new record under a freshly assigned id and returns the
    /// canonical stored record.
    pub fn create(&mut self, mut comic: Comic) -> &Comic {
        let id = self.next_id;
        self.next_id += 1;
        comic.id = id;
        self.comics.entry(id).or_insert(comic)
    }

    pub fn read(&self, id: ComicId) -> Option<&Comic> {
        self.comics.get(&id)
    }

    /// Replaces the record under `id`, forcing the stored id to match the
    /// key. Returns `None` when the id is absent; never creates.
    pub fn update(&mut self, id: ComicId, mut comic: Comic) -> Option<&Comic> {
        let slot = self.comics.get_mut(&id)?;
        comic.id = id;
        *slot = comic;
        Some(slot)
    }

    /// Removes the record under `id`. Idempotent: deleting an absent id
    /// is not an error.
    pub fn delete(&mut self, id: ComicId) -> bool {
        self.comics.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.comics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comics.is_empty()
    }
}

/// Store handle shared by all server sessions. The runtime may run more
/// than one worker thread, so store operations are serialized behind a
/// Tokio mutex held only for the duration of one operation.
pub type SharedStore = Arc<Mutex<ComicStore>>;

pub fn shared(store: ComicStore) -> SharedStore {
    Arc::new(Mutex::new(store))
}
