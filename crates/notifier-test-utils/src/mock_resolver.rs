//! Static name resolver.

use async_trait::async_trait;
use common::types::RoomId;
use live_notifier::clients::NameResolver;
use live_notifier::errors::ResolveError;
use std::collections::HashMap;

/// `NameResolver` backed by a fixed table. Unknown rooms are `NotFound`.
#[derive(Debug, Clone, Default)]
pub struct StaticNameResolver {
    names: HashMap<RoomId, String>,
    unavailable: bool,
}

impl StaticNameResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_room(mut self, room_id: u64, name: &str) -> Self {
        self.names.insert(RoomId(room_id), name.to_string());
        self
    }

    /// Resolver whose upstream is down.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            names: HashMap::new(),
            unavailable: true,
        }
    }
}

#[async_trait]
impl NameResolver for StaticNameResolver {
    async fn resolve_name(&self, room_id: RoomId) -> Result<String, ResolveError> {
        if self.unavailable {
            return Err(ResolveError::Unavailable("scripted outage".to_string()));
        }
        self.names
            .get(&room_id)
            .cloned()
            .ok_or(ResolveError::NotFound)
    }
}
