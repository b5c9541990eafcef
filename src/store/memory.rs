//! In-process cache store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CacheStorage;
use crate::error::Result;
use crate::request::{Request, Response};

struct Generation {
    name: String,
    entries: HashMap<String, (Request, Response)>,
}

impl Generation {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }
}

/// Cache store that keeps every generation in memory.
///
/// Generations are kept in creation order so lookups behave like the
/// disk store.
#[derive(Default)]
pub struct MemoryCacheStorage {
    generations: RwLock<Vec<Generation>>,
}

impl MemoryCacheStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a generation, or `None` if it does not exist.
    pub async fn entry_count(&self, name: &str) -> Option<usize> {
        self.generations
            .read()
            .await
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.entries.len())
    }
}

fn find_or_create<'a>(generations: &'a mut Vec<Generation>, name: &str) -> &'a mut Generation {
    let index = match generations.iter().position(|g| g.name == name) {
        Some(index) => index,
        None => {
            generations.push(Generation::new(name));
            generations.len() - 1
        }
    };
    &mut generations[index]
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let mut generations = self.generations.write().await;
        find_or_create(&mut generations, name);
        Ok(())
    }

    async fn add_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<()> {
        let mut generations = self.generations.write().await;
        let generation = find_or_create(&mut generations, name);
        for (request, response) in entries {
            generation
                .entries
                .insert(request.cache_key(), (request, response));
        }
        Ok(())
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        if !request.is_get() {
            return Ok(None);
        }
        let key = request.cache_key();
        let generations = self.generations.read().await;
        Ok(generations
            .iter()
            .find_map(|g| g.entries.get(&key))
            .map(|(_, response)| response.clone()))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let generations = self.generations.read().await;
        Ok(generations.iter().map(|g| g.name.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut generations = self.generations.write().await;
        let before = generations.len();
        generations.retain(|g| g.name != name);
        Ok(generations.len() != before)
    }

    async fn requests(&self, name: &str) -> Result<Vec<Request>> {
        let generations = self.generations.read().await;
        let mut requests: Vec<Request> = generations
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.entries.values().map(|(req, _)| req.clone()).collect())
            .unwrap_or_default();
        requests.sort_by(|a, b| a.url().cmp(b.url()));
        Ok(requests)
    }
}
