//! Per-session identity map: at most one in-memory instance per node id.

use std::collections::HashMap;

use neomap_core::NodeId;

use crate::entity::AnyEntity;

#[derive(Debug, Default)]
pub struct IdentityMap {
    by_id: HashMap<NodeId, AnyEntity>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&AnyEntity> {
        self.by_id.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Track `entity` as the instance for `id`. An instance already tracked
    /// for that id is kept; returns whether `entity` is now the tracked one.
    pub fn attach(&mut self, id: NodeId, entity: AnyEntity) -> bool {
        let tracked = self.by_id.entry(id).or_insert_with(|| entity.clone());
        tracked.same(&entity)
    }

    /// Stop tracking whatever instance is held for `id`.
    pub fn detach(&mut self, id: NodeId) -> Option<AnyEntity> {
        self.by_id.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnyEntity> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
    }
}
