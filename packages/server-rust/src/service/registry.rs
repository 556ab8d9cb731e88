use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::collection::Collection;
use super::operation::OperationError;

// ---------------------------------------------------------------------------
// CollectionRegistry
// ---------------------------------------------------------------------------

/// Registry of the collections served by one API instance.
///
/// Written while the API is assembled and read afterwards. A name can be
/// registered once; there is no deregistration. Iteration follows
/// registration order.
pub struct CollectionRegistry {
    by_name: DashMap<String, Arc<Collection>>,
    order: RwLock<Vec<String>>,
}

impl CollectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Registers a collection under its schema name.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::DuplicateRegistration`] if the name is taken.
    /// The existing collection is left untouched.
    pub fn register(&self, collection: Collection) -> Result<Arc<Collection>, OperationError> {
        let name = collection.name().to_string();
        match self.by_name.entry(name.clone()) {
            Entry::Occupied(_) => Err(OperationError::DuplicateRegistration { name }),
            Entry::Vacant(slot) => {
                let collection = Arc::new(collection);
                slot.insert(Arc::clone(&collection));
                self.order.write().push(name);
                Ok(collection)
            }
        }
    }

    /// Retrieve a collection by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<Collection>> {
        self.by_name.get(name).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Collection names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.order.read().clone()
    }

    /// All collections in registration order.
    #[must_use]
    pub fn collections(&self) -> Vec<Arc<Collection>> {
        self.order
            .read()
            .iter()
            .filter_map(|name| self.lookup(name))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Default for CollectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
