//! # Query Manager
//!
//! Caches live queries by canonical filter and keeps them in sync with the
//! archetype index.
//!
//! A new query scans the existing archetypes once. After that it only ever
//! evaluates archetypes as they are created, and learns about membership
//! through the rows of the archetypes it subscribed to.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::archetype::{Archetype, ArchetypeId};
use super::archetype_manager::ArchetypeManager;
use super::entity::EntityId;
use super::query::{Filter, Query, QueryId};
use crate::error::{EcsError, EcsResult};

/// Shared, reference-counted queries.
#[derive(Debug, Default)]
pub struct QueryManager {
    queries: BTreeMap<QueryId, Query>,
    by_filter: HashMap<Filter, QueryId>,
    next_id: u32,
}

impl QueryManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the query for `filter`, building it on first request.
    ///
    /// Every call adds a reference; balance it with [`release`](Self::release).
    pub fn acquire(&mut self, filter: Filter, archetypes: &mut ArchetypeManager) -> QueryId {
        if let Some(id) = self.by_filter.get(&filter) {
            if let Some(query) = self.queries.get_mut(id) {
                query.retain();
                return *id;
            }
        }

        let id = QueryId::new(self.next_id);
        self.next_id += 1;
        let mut query = Query::new(id, filter.clone());

        let matching: Vec<ArchetypeId> = archetypes
            .archetypes()
            .iter()
            .filter(|archetype| filter.matches(&archetype.mask()))
            .map(Archetype::id)
            .collect();
        for archetype_id in matching {
            if let Some(archetype) = archetypes.archetype_mut(archetype_id) {
                query.watch(archetype_id, archetype.entities());
                archetype.subscribe(id);
            }
        }

        debug!(query = %id, filter = %filter, archetypes = query.archetypes().len(), tracked = query.len(), "query created");
        self.by_filter.insert(filter, id);
        self.queries.insert(id, query);
        id
    }

    /// Drops one reference. The query is destroyed (and unsubscribed from
    /// its archetypes) when the last reference goes. Returns `true` then.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownQuery`] if `id` is not live.
    pub fn release(&mut self, id: QueryId, archetypes: &mut ArchetypeManager) -> EcsResult<bool> {
        let query = self.queries.get_mut(&id).ok_or(EcsError::UnknownQuery(id))?;
        if !query.release() {
            return Ok(false);
        }
        if let Some(query) = self.queries.remove(&id) {
            for archetype_id in query.archetypes() {
                if let Some(archetype) = archetypes.archetype_mut(*archetype_id) {
                    archetype.unsubscribe(id);
                }
            }
            self.by_filter.remove(query.filter());
            debug!(query = %id, "query dropped");
        }
        Ok(true)
    }

    /// Looks up a live query.
    #[must_use]
    pub fn get(&self, id: QueryId) -> Option<&Query> {
        self.queries.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: QueryId) -> Option<&mut Query> {
        self.queries.get_mut(&id)
    }

    /// Finds the live query for a filter.
    #[must_use]
    pub fn find(&self, filter: &Filter) -> Option<QueryId> {
        self.by_filter.get(filter).copied()
    }

    /// Iterates over live queries in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Query> {
        self.queries.values()
    }

    /// Number of live queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// True without live queries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Subscribes matching queries to a new archetype.
    ///
    /// The row that created the archetype is already in it when this runs;
    /// members reach the queries only through the row events that follow.
    pub(crate) fn on_archetype_created(&mut self, archetype: &mut Archetype) {
        for query in self.queries.values_mut() {
            if query.filter().matches(&archetype.mask()) {
                query.watch(archetype.id(), &[]);
                archetype.subscribe(query.id());
            }
        }
    }

    pub(crate) fn on_row_added(&mut self, subscribers: &[QueryId], entity: EntityId) {
        for id in subscribers {
            if let Some(query) = self.queries.get_mut(id) {
                query.on_row_added(entity);
            }
        }
    }

    pub(crate) fn on_row_removed(&mut self, subscribers: &[QueryId], entity: EntityId) {
        for id in subscribers {
            if let Some(query) = self.queries.get_mut(id) {
                query.on_row_removed(entity);
            }
        }
    }

    pub(crate) fn reset_diffs(&mut self) {
        for query in self.queries.values_mut() {
            query.reset_diffs();
        }
    }

    pub(crate) fn finalize(&mut self) {
        for query in self.queries.values_mut() {
            query.finalize();
        }
    }
}
