// src/connection/operations/table.rs

//! The dual-index collection of pending operations.

use super::Operation;
use crate::connection::ClientId;
use crate::core::protocol::Message;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Pending operations indexed two ways: uniquely by correlation id and
/// non-uniquely by the owning client. Both indices are updated by every
/// mutator, so they agree at all times.
#[derive(Debug, Default)]
pub struct OperationTable {
    by_correlation: HashMap<Uuid, Operation>,
    by_client: HashMap<ClientId, HashSet<Uuid>>,
}

impl OperationTable {
    /// Inserts an operation, replacing any previous one under the same
    /// correlation id.
    pub fn insert(&mut self, operation: Operation) {
        let id = operation.id();
        let client = operation.client().id();
        if let Some(previous) = self.by_correlation.insert(id, operation) {
            let previous_client = previous.client().id();
            if previous_client != client {
                self.unindex(previous_client, &id);
            }
        }
        self.by_client.entry(client).or_default().insert(id);
    }

    /// Removes and returns the operation under `id`.
    pub fn take(&mut self, id: &Uuid) -> Option<Operation> {
        let operation = self.by_correlation.remove(id)?;
        self.unindex(operation.client().id(), id);
        Some(operation)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.by_correlation.contains_key(id)
    }

    /// Finds, among the operations owned by `client`, one that claims the
    /// given outbound message.
    pub fn claiming(&self, client: ClientId, message: &Message) -> Option<Uuid> {
        let ids = self.by_client.get(&client)?;
        ids.iter()
            .find(|id| {
                self.by_correlation
                    .get(*id)
                    .is_some_and(|op| op.claims_outgoing(message))
            })
            .copied()
    }

    /// Removes and returns every operation owned by `client`.
    pub fn take_client_operations(&mut self, client: ClientId) -> Vec<Operation> {
        let Some(ids) = self.by_client.remove(&client) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.by_correlation.remove(id))
            .collect()
    }

    /// Empties the table, returning every operation.
    pub fn drain(&mut self) -> Vec<Operation> {
        self.by_client.clear();
        self.by_correlation.drain().map(|(_, op)| op).collect()
    }

    pub fn len(&self) -> usize {
        self.by_correlation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_correlation.is_empty()
    }

    fn unindex(&mut self, client: ClientId, id: &Uuid) {
        if let Some(ids) = self.by_client.get_mut(&client) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_client.remove(&client);
            }
        }
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let indexed: usize = self.by_client.values().map(HashSet::len).sum();
        indexed == self.by_correlation.len()
            && self.by_client.iter().all(|(client, ids)| {
                ids.iter().all(|id| {
                    self.by_correlation
                        .get(id)
                        .is_some_and(|op| op.client().id() == *client)
                })
            })
    }
}
