use futures::future::poll_fn;
use std::{
    collections::HashSet,
    future::Future,
    hash::Hash,
    task::{ready, Context, Poll},
};
use tokio::task::{JoinError, JoinSet};

/// A set of tasks keyed by a unique name, spawned on a Tokio runtime.
///
/// At most one task per key is in flight. Tasks return their key alongside their output,
/// which is how the key is released once the task finishes. The controller uses this to run
/// one installation sequence per switch: different switches proceed concurrently while a
/// second sequence for the same switch is refused.
#[derive(Debug)]
pub struct JoinMap<K, V> {
    keys: HashSet<K>,
    joinset: JoinSet<(K, V)>,
}

impl<K, V> Default for JoinMap<K, V> {
    fn default() -> Self {
        Self { keys: HashSet::new(), joinset: JoinSet::new() }
    }
}

impl<K, V> JoinMap<K, V> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tasks still in flight.
    pub fn len(&self) -> usize {
        self.joinset.len()
    }

    /// Returns whether no task is in flight.
    pub fn is_empty(&self) -> bool {
        self.joinset.is_empty()
    }
}

impl<K, V> JoinMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    /// Spawns `future` under `key`. Returns `false` without spawning if a task with the same
    /// key is still in flight.
    pub fn spawn<F>(&mut self, key: K, future: F) -> bool
    where
        F: Future<Output = (K, V)> + Send + 'static,
    {
        if !self.keys.insert(key) {
            return false;
        }

        self.joinset.spawn(future);
        true
    }

    /// Returns `true` if a task for `key` is in flight.
    pub fn contains_key(&self, key: &K) -> bool {
        self.keys.contains(key)
    }

    /// Waits for the next task to finish. Returns `None` once the map is empty.
    ///
    /// Cancel safe: if this is raced in a `tokio::select!` and loses, no task output is lost.
    pub async fn join_next(&mut self) -> Option<Result<(K, V), JoinError>> {
        poll_fn(|cx| self.poll_join_next(cx)).await
    }

    /// Polls for the next finished task, releasing its key.
    pub fn poll_join_next(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<(K, V), JoinError>>> {
        match ready!(self.joinset.poll_join_next(cx)) {
            Some(Ok((key, value))) => {
                self.keys.remove(&key);
                Poll::Ready(Some(Ok((key, value))))
            }
            Some(Err(err)) => Poll::Ready(Some(Err(err))),
            None => Poll::Ready(None),
        }
    }
}
