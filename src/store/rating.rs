use std::collections::HashMap;
use std::sync::Mutex;

use super::StoreError;

/// Running aggregate of the scores given to one laptop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rating {
    pub count: u32,
    pub sum: f64,
}

impl Rating {
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / f64::from(self.count)
        }
    }
}

pub trait RatingStore: Send + Sync {
    /// Add a score and return the aggregate after the update.
    fn add(&self, laptop_id: &str, score: f64) -> Result<Rating, StoreError>;

    fn find(&self, laptop_id: &str) -> Result<Option<Rating>, StoreError>;
}

/// Every `add` is a read-modify-write, so the map sits behind a `Mutex`
/// and the whole update happens under one guard.
#[derive(Default)]
pub struct InMemoryRatingStore {
    ratings: Mutex<HashMap<String, Rating>>,
}

impl InMemoryRatingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RatingStore for InMemoryRatingStore {
    fn add(&self, laptop_id: &str, score: f64) -> Result<Rating, StoreError> {
        let mut ratings = self
            .ratings
            .lock()
            .map_err(|_| StoreError::LockPoisoned("rating add"))?;

        let rating = ratings.entry(laptop_id.to_string()).or_insert(Rating {
            count: 0,
            sum: 0.0,
        });
        rating.count = rating.count.saturating_add(1);
        rating.sum += score;
        Ok(*rating)
    }

    fn find(&self, laptop_id: &str) -> Result<Option<Rating>, StoreError> {
        let ratings = self
            .ratings
            .lock()
            .map_err(|_| StoreError::LockPoisoned("rating find"))?;
        Ok(ratings.get(laptop_id).copied())
    }
}
