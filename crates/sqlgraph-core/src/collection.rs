//! Lazily loaded one-to-many collections.

use crate::error::Result;
use crate::mapping::Entity;
use crate::object::Ref;
use crate::value::Value;
use std::fmt;
use std::sync::OnceLock;

/// Runs the query behind a [`LazyCollection`].
///
/// Implemented by the session; a loader returns every `E` whose
/// `back_reference` property points at the owner with key `owner_key`.
pub trait CollectionLoader {
    fn load_collection<E: Entity>(
        &mut self,
        back_reference: &str,
        owner_key: &Value,
    ) -> Result<Vec<Ref<E>>>;
}

/// Identifies the owner a collection was attached to.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionOwner {
    pub owner_type: &'static str,
    pub owner_key: Value,
    pub back_reference: String,
}

/// A one-to-many collection that is fetched on first access.
///
/// The materializer attaches a bound collection to every object it
/// constructs with a known key. A default-constructed collection is
/// detached and loads as empty.
pub struct LazyCollection<E> {
    owner: Option<CollectionOwner>,
    loaded: OnceLock<Vec<Ref<E>>>,
}

impl<E: Entity> LazyCollection<E> {
    pub fn detached() -> Self {
        Self {
            owner: None,
            loaded: OnceLock::new(),
        }
    }

    pub fn bound(owner_type: &'static str, owner_key: Value, back_reference: String) -> Self {
        Self {
            owner: Some(CollectionOwner {
                owner_type,
                owner_key,
                back_reference,
            }),
            loaded: OnceLock::new(),
        }
    }

    pub fn owner(&self) -> Option<&CollectionOwner> {
        self.owner.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// Items, if already loaded.
    pub fn get(&self) -> Option<&[Ref<E>]> {
        self.loaded.get().map(Vec::as_slice)
    }

    /// Load the collection through `loader` (cached after first success).
    ///
    /// A failed load leaves the collection unloaded so it can be retried.
    pub fn load<L: CollectionLoader>(&self, loader: &mut L) -> Result<&[Ref<E>]> {
        if let Some(items) = self.loaded.get() {
            return Ok(items);
        }
        let items = match &self.owner {
            Some(owner) => loader.load_collection::<E>(&owner.back_reference, &owner.owner_key)?,
            None => Vec::new(),
        };
        Ok(self.loaded.get_or_init(|| items))
    }

    /// Drop loaded items so the next `load` queries again.
    pub fn reset(&mut self) {
        self.loaded = OnceLock::new();
    }
}

impl<E: Entity> Default for LazyCollection<E> {
    fn default() -> Self {
        Self::detached()
    }
}

impl<E> Clone for LazyCollection<E> {
    fn clone(&self) -> Self {
        let loaded = OnceLock::new();
        if let Some(items) = self.loaded.get() {
            let _ = loaded.set(items.clone());
        }
        Self {
            owner: self.owner.clone(),
            loaded,
        }
    }
}

impl<E> fmt::Debug for LazyCollection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match (self.loaded.get(), &self.owner) {
            (Some(_), _) => "loaded",
            (None, Some(_)) => "unloaded",
            (None, None) => "detached",
        };
        f.debug_struct("LazyCollection")
            .field("state", &state)
            .field("owner", &self.owner)
            .field("len", &self.loaded.get().map(Vec::len))
            .finish()
    }
}
