//! Member / restaurant directory
//!
//! Members and restaurants are owned by other services; the waitlist only
//! needs to know that they exist, their display names, who owns a
//! restaurant and which timezone it runs in.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use shared::models::{Member, Restaurant};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to read directory seed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid directory seed: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn find_member(&self, member_id: i64) -> DirectoryResult<Option<Member>>;
}

#[async_trait]
pub trait RestaurantDirectory: Send + Sync {
    async fn find_restaurant(&self, restaurant_id: i64) -> DirectoryResult<Option<Restaurant>>;
}

/// Seed file layout
#[derive(Debug, Default, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub restaurants: Vec<Restaurant>,
}

/// DashMap-backed directory
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    members: Arc<DashMap<i64, Member>>,
    restaurants: Arc<DashMap<i64, Restaurant>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: DirectorySeed) -> Self {
        let directory = Self::new();
        for member in seed.members {
            directory.upsert_member(member);
        }
        for restaurant in seed.restaurants {
            directory.upsert_restaurant(restaurant);
        }
        directory
    }

    /// Load `{members: [..], restaurants: [..]}` from a JSON file
    pub fn load(path: impl AsRef<Path>) -> DirectoryResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let seed: DirectorySeed = serde_json::from_str(&raw)?;
        Ok(Self::from_seed(seed))
    }

    pub fn upsert_member(&self, member: Member) {
        self.members.insert(member.id, member);
    }

    pub fn upsert_restaurant(&self, restaurant: Restaurant) {
        self.restaurants.insert(restaurant.id, restaurant);
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn restaurant_count(&self) -> usize {
        self.restaurants.len()
    }
}

#[async_trait]
impl MemberDirectory for InMemoryDirectory {
    async fn find_member(&self, member_id: i64) -> DirectoryResult<Option<Member>> {
        Ok(self.members.get(&member_id).map(|m| m.clone()))
    }
}

#[async_trait]
impl RestaurantDirectory for InMemoryDirectory {
    async fn find_restaurant(&self, restaurant_id: i64) -> DirectoryResult<Option<Restaurant>> {
        Ok(self.restaurants.get(&restaurant_id).map(|r| r.clone()))
    }
}
