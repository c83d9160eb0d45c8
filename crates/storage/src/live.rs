use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt::Display;

use gradepoint_core::ids::ClassId;

use crate::error::StorageError;
use crate::traits::{ChangeSet, DiffCallback, DiffEvent, LiveResults, Predicate, QueryId, SubscriptionToken};

struct LiveQuery {
    predicate: Predicate,
    rows: Vec<ClassId>,
    failed: bool,
}

struct Subscription {
    query_id: QueryId,
    callback: DiffCallback,
}

/// Bookkeeping for live queries shared by store backends: snapshots, the
/// set of classes written since the last delivery, and a FIFO of events
/// waiting for their callbacks.
#[derive(Default)]
pub struct LiveRegistry {
    next_query: u64,
    next_token: u64,
    queries: BTreeMap<QueryId, LiveQuery>,
    subscriptions: BTreeMap<SubscriptionToken, Subscription>,
    queue: VecDeque<(SubscriptionToken, DiffEvent)>,
    touched: BTreeSet<ClassId>,
}

impl LiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, predicate: Predicate, rows: Vec<ClassId>) -> LiveResults {
        self.next_query += 1;
        let query_id = QueryId(self.next_query);
        self.queries.insert(
            query_id,
            LiveQuery {
                predicate: predicate.clone(),
                rows,
                failed: false,
            },
        );
        LiveResults { query_id, predicate }
    }

    pub fn rows(&self, query_id: QueryId) -> Result<&[ClassId], StorageError> {
        self.queries
            .get(&query_id)
            .map(|q| q.rows.as_slice())
            .ok_or(StorageError::UnknownQuery(query_id.0))
    }

    pub fn release(&mut self, query_id: QueryId) {
        self.queries.remove(&query_id);
        self.subscriptions.retain(|_, s| s.query_id != query_id);
        self.queue.retain(|(token, _)| self.subscriptions.contains_key(token));
    }

    pub fn subscribe(
        &mut self,
        query_id: QueryId,
        callback: DiffCallback,
    ) -> Result<SubscriptionToken, StorageError> {
        let query = self
            .queries
            .get(&query_id)
            .ok_or(StorageError::UnknownQuery(query_id.0))?;
        let first = if query.failed {
            DiffEvent::Failed("live query is no longer valid".into())
        } else {
            DiffEvent::Initial {
                rows: query.rows.clone(),
            }
        };
        self.next_token += 1;
        let token = SubscriptionToken(self.next_token);
        self.subscriptions.insert(token, Subscription { query_id, callback });
        self.queue.push_back((token, first));
        Ok(token)
    }

    pub fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        let removed = self.subscriptions.remove(&token).is_some();
        if removed {
            self.queue.retain(|(t, _)| *t != token);
        }
        removed
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Record classes written by a committed transaction.
    pub fn mark_touched(&mut self, ids: impl IntoIterator<Item = ClassId>) {
        self.touched.extend(ids);
    }

    /// Re-evaluate every live query if anything was written, queue the
    /// resulting diffs, then run callbacks for the whole queue.
    pub fn deliver<E, F>(&mut self, mut evaluate: F) -> usize
    where
        E: Display,
        F: FnMut(&Predicate) -> Result<Vec<ClassId>, E>,
    {
        if !self.touched.is_empty() {
            let touched = std::mem::take(&mut self.touched);
            for (query_id, query) in self.queries.iter_mut().filter(|(_, q)| !q.failed) {
                let event = match evaluate(&query.predicate) {
                    Ok(rows) => {
                        let changes = diff_rows(&query.rows, &rows, &touched);
                        query.rows = rows;
                        if changes.is_empty() {
                            continue;
                        }
                        DiffEvent::Updated(changes)
                    }
                    Err(e) => {
                        tracing::error!(query = query_id.0, error = %e, "live query re-evaluation failed");
                        query.failed = true;
                        DiffEvent::Failed(e.to_string())
                    }
                };
                for (token, _) in self.subscriptions.iter().filter(|(_, s)| s.query_id == *query_id) {
                    self.queue.push_back((*token, event.clone()));
                }
            }
        }

        let mut delivered = 0;
        while let Some((token, event)) = self.queue.pop_front() {
            if let Some(subscription) = self.subscriptions.get_mut(&token) {
                (subscription.callback)(&event);
                delivered += 1;
            }
        }
        if delivered > 0 {
            tracing::trace!(delivered, "delivered live query notifications");
        }
        delivered
    }
}

/// Diff two snapshots of a live query. Rows present in both keep their
/// relative order; they count as modified when their class was written.
pub fn diff_rows(old: &[ClassId], new: &[ClassId], touched: &BTreeSet<ClassId>) -> ChangeSet {
    let old_set: HashSet<&ClassId> = old.iter().collect();
    let new_set: HashSet<&ClassId> = new.iter().collect();

    let mut changes = ChangeSet {
        rows: new.to_vec(),
        ..ChangeSet::default()
    };
    for (index, id) in old.iter().enumerate() {
        if !new_set.contains(id) {
            changes.deletions.push(index);
        } else if touched.contains(id) {
            changes.modifications.push(index);
        }
    }
    for (index, id) in new.iter().enumerate() {
        if !old_set.contains(id) {
            changes.insertions.push(index);
        }
    }
    changes
}
