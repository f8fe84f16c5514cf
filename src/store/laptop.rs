use std::collections::HashMap;
use std::sync::RwLock;

use super::filter;
use super::StoreError;
use crate::pb::{Filter, Laptop};

/// Callback invoked once per laptop matched by [`LaptopStore::search`].
///
/// Returning an error stops the scan and the error is handed back to the
/// caller of `search`.
pub type Visit<'a> = dyn FnMut(Laptop) -> Result<(), StoreError> + 'a;

/// Keyed storage for laptops.
///
/// Laptops go in and come out by value; callers never hold a reference into
/// the store's own state.
pub trait LaptopStore: Send + Sync {
    /// Insert a laptop. Fails with `AlreadyExists` if the id is taken.
    fn save(&self, laptop: &Laptop) -> Result<(), StoreError>;

    /// Look up a laptop by id. `Ok(None)` means absent, not an error.
    fn find(&self, id: &str) -> Result<Option<Laptop>, StoreError>;

    /// Visit every laptop matching `filter`, in no particular order.
    fn search(&self, filter: Option<&Filter>, visit: &mut Visit<'_>) -> Result<(), StoreError>;
}

/// HashMap-backed laptop store behind a single `RwLock`.
///
/// `save` takes the write lock for the whole map, `find` and `search` share
/// the read lock. `search` picks its matches under the read lock but runs
/// `visit` without it, so a slow visitor never holds writers back.
#[derive(Default)]
pub struct InMemoryLaptopStore {
    data: RwLock<HashMap<String, Laptop>>,
}

impl InMemoryLaptopStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LaptopStore for InMemoryLaptopStore {
    fn save(&self, laptop: &Laptop) -> Result<(), StoreError> {
        let mut data = self
            .data
            .write()
            .map_err(|_| StoreError::LockPoisoned("save"))?;

        if data.contains_key(&laptop.id) {
            return Err(StoreError::AlreadyExists(laptop.id.clone()));
        }

        data.insert(laptop.id.clone(), laptop.clone());
        Ok(())
    }

    fn find(&self, id: &str) -> Result<Option<Laptop>, StoreError> {
        let data = self
            .data
            .read()
            .map_err(|_| StoreError::LockPoisoned("find"))?;
        Ok(data.get(id).cloned())
    }

    fn search(&self, filter: Option<&Filter>, visit: &mut Visit<'_>) -> Result<(), StoreError> {
        let ids: Vec<String> = {
            let data = self
                .data
                .read()
                .map_err(|_| StoreError::LockPoisoned("search"))?;
            data.values()
                .filter(|laptop| filter::matches(filter, laptop))
                .map(|laptop| laptop.id.clone())
                .collect()
        };

        // Laptops are never removed, so every collected id still resolves.
        for id in ids {
            if let Some(laptop) = self.find(&id)? {
                visit(laptop)?;
            }
        }
        Ok(())
    }
}
