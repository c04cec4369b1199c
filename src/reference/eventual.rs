//! Eventually-resolved ordered sequences.
//!
//! [`Eventual`] is the fetch state machine shared by every lazily resolved
//! collection: `Unfetched -> Fetching -> Fetched`, with callers arriving while
//! a fetch is in flight parked in a FIFO queue and handed the same outcome.
//! [`Sequence`] layers the combinators on top; combinators that produce a
//! collection return a [`Derived`] handle whose own resolution chains off its
//! parent.

use crate::core::{DocError, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{Level, event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Unfetched,
    Fetching,
    Fetched,
}

/// Knows how to bring an [`Eventual`] up to date.
#[async_trait]
pub trait Resolver<T: Send + 'static>: Send + Sync {
    /// Whether the current items are stale or incomplete.
    fn needs_fetch(&self, phase: FetchPhase, items: &[T]) -> bool;

    /// Produces the resolved items, given the ones already known.
    async fn fetch(&self, known: Vec<T>) -> Result<Vec<T>>;
}

type Waiter<T> = oneshot::Sender<Result<Vec<T>>>;

struct State<T> {
    phase: FetchPhase,
    items: Vec<T>,
    waiters: VecDeque<Waiter<T>>,
    /// Set when a reset arrives while a fetch is in flight.
    stale: bool,
}

pub struct Eventual<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Eventual<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Eventual<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = self.state.lock().map(|s| s.phase).ok();
        f.debug_struct("Eventual").field("phase", &phase).finish()
    }
}

impl<T: Clone + Send + 'static> Default for Eventual<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: Clone + Send + 'static> Eventual<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                phase: FetchPhase::Unfetched,
                items,
                waiters: VecDeque::new(),
                stale: false,
            })),
        }
    }

    pub fn phase(&self) -> Result<FetchPhase> {
        Ok(self.state.lock()?.phase)
    }

    /// Current items without triggering a fetch.
    pub fn snapshot(&self) -> Result<Vec<T>> {
        Ok(self.state.lock()?.items.clone())
    }

    /// Forces the next resolution to fetch again. A fetch already in flight
    /// still settles its callers, but leaves the phase `Unfetched`.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state.lock()?;
        match state.phase {
            FetchPhase::Fetched => state.phase = FetchPhase::Unfetched,
            FetchPhase::Fetching => state.stale = true,
            FetchPhase::Unfetched => {}
        }
        Ok(())
    }

    /// Mutates the items in place; the phase is left untouched.
    pub fn update<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> Result<R> {
        let mut state = self.state.lock()?;
        Ok(f(&mut state.items))
    }

    /// Resolves the sequence.
    ///
    /// At most one fetch is in flight: callers arriving meanwhile are queued
    /// and receive the outcome of that fetch, in arrival order. A failed fetch
    /// returns the phase to `Unfetched`.
    pub async fn resolve(&self, resolver: &dyn Resolver<T>) -> Result<Vec<T>> {
        let queued = {
            let mut state = self.state.lock()?;
            let phase = state.phase;
            match phase {
                FetchPhase::Fetching => {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    Some(rx)
                }
                _ if !resolver.needs_fetch(phase, &state.items) => {
                    state.phase = FetchPhase::Fetched;
                    return Ok(state.items.clone());
                }
                _ => {
                    state.phase = FetchPhase::Fetching;
                    None
                }
            }
        };

        if let Some(rx) = queued {
            return rx.await.map_err(|_| {
                DocError::ReferenceIntegrity("pending resolution was abandoned".into())
            })?;
        }

        let known = self.snapshot()?;
        let outcome = resolver.fetch(known).await;

        let waiters = {
            let mut state = self.state.lock()?;
            let stale = std::mem::take(&mut state.stale);
            match &outcome {
                Ok(items) => {
                    state.items = items.clone();
                    state.phase = if stale {
                        FetchPhase::Unfetched
                    } else {
                        FetchPhase::Fetched
                    };
                }
                Err(_) => state.phase = FetchPhase::Unfetched,
            }
            std::mem::take(&mut state.waiters)
        };

        event!(
            Level::DEBUG,
            waiters = waiters.len(),
            ok = outcome.is_ok(),
            "resolution settled"
        );
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        outcome
    }
}

/// Combinators over an eventually-resolved ordered sequence.
#[async_trait]
pub trait Sequence<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    /// Every member, once resolved.
    async fn all(&self) -> Result<Vec<T>>;

    async fn at(&self, index: usize) -> Result<Option<T>> {
        Ok(self.all().await?.into_iter().nth(index))
    }

    async fn for_each(&self, f: &mut (dyn for<'x> FnMut(&'x T, usize) + Send)) -> Result<()> {
        let items = self.all().await?;
        for (idx, item) in items.iter().enumerate() {
            f(item, idx);
        }
        Ok(())
    }

    fn slice(&self, start: usize, end: usize) -> Derived<T>
    where
        Self: Clone + Sized + 'static,
    {
        let parent = self.clone();
        Derived::new(move || {
            let parent = parent.clone();
            async move {
                let items = parent.all().await?;
                let end = end.min(items.len());
                let start = start.min(end);
                Ok(items[start..end].to_vec())
            }
        })
    }

    fn filter<F>(&self, predicate: F) -> Derived<T>
    where
        Self: Clone + Sized + 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let parent = self.clone();
        let predicate = Arc::new(predicate);
        Derived::new(move || {
            let parent = parent.clone();
            let predicate = predicate.clone();
            async move {
                let items = parent.all().await?;
                Ok(items.into_iter().filter(|item| predicate(item)).collect())
            }
        })
    }

    fn map<U, F>(&self, f: F) -> Derived<U>
    where
        Self: Clone + Sized + 'static,
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let parent = self.clone();
        let f = Arc::new(f);
        Derived::new(move || {
            let parent = parent.clone();
            let f = f.clone();
            async move {
                let items = parent.all().await?;
                Ok(items.into_iter().map(|item| f(item)).collect())
            }
        })
    }
}

type Upstream<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<T>>> + Send + Sync>;

/// A collection derived from another sequence (slice, filter, map).
pub struct Derived<T> {
    upstream: Upstream<T>,
    cell: Eventual<T>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            upstream: self.upstream.clone(),
            cell: self.cell.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Derived<T> {
    pub fn new<F, Fut>(source: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
    {
        let upstream: Upstream<T> =
            Arc::new(move || Box::pin(source()) as BoxFuture<'static, Result<Vec<T>>>);
        Self {
            upstream,
            cell: Eventual::default(),
        }
    }

    pub fn phase(&self) -> Result<FetchPhase> {
        self.cell.phase()
    }
}

struct Chained<'a, T>(&'a Upstream<T>);

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Resolver<T> for Chained<'_, T> {
    fn needs_fetch(&self, phase: FetchPhase, _items: &[T]) -> bool {
        phase != FetchPhase::Fetched
    }

    async fn fetch(&self, _known: Vec<T>) -> Result<Vec<T>> {
        (self.0)().await
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Sequence<T> for Derived<T> {
    async fn all(&self) -> Result<Vec<T>> {
        self.cell.resolve(&Chained(&self.upstream)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Resolver<u32> for Counting {
        fn needs_fetch(&self, phase: FetchPhase, _items: &[u32]) -> bool {
            phase != FetchPhase::Fetched
        }

        async fn fetch(&self, _known: Vec<u32>) -> Result<Vec<u32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(vec![1, 2, 3])
        }
    }

    #[tokio::test]
    async fn concurrent_resolutions_share_one_fetch() {
        let cell = Eventual::<u32>::default();
        let resolver = Counting {
            calls: AtomicUsize::new(0),
        };

        let (a, b) = tokio::join!(cell.resolve(&resolver), cell.resolve(&resolver));

        assert_eq!(a.unwrap(), vec![1, 2, 3]);
        assert_eq!(b.unwrap(), vec![1, 2, 3]);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cell.phase().unwrap(), FetchPhase::Fetched);
    }

    #[tokio::test]
    async fn reset_forces_a_new_fetch() {
        let cell = Eventual::<u32>::default();
        let resolver = Counting {
            calls: AtomicUsize::new(0),
        };

        cell.resolve(&resolver).await.unwrap();
        cell.resolve(&resolver).await.unwrap();
        cell.reset().unwrap();
        cell.resolve(&resolver).await.unwrap();

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reset_during_fetch_leaves_the_cell_unfetched() {
        let cell = Eventual::<u32>::default();
        let resolver = Counting {
            calls: AtomicUsize::new(0),
        };

        let (first, _) = tokio::join!(cell.resolve(&resolver), async {
            assert_eq!(cell.phase().unwrap(), FetchPhase::Fetching);
            cell.reset().unwrap();
        });

        assert_eq!(first.unwrap(), vec![1, 2, 3]);
        assert_eq!(cell.phase().unwrap(), FetchPhase::Unfetched);

        cell.resolve(&resolver).await.unwrap();
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cell.phase().unwrap(), FetchPhase::Fetched);
    }

    #[tokio::test]
    async fn derived_handles_chain_off_their_parent() {
        let source = Derived::new(|| async { Ok(vec![1u32, 2, 3, 4, 5]) });

        let evens = source.filter(|n| n % 2 == 0);
        let doubled = evens.map(|n| n * 10);
        let window = source.slice(1, 3);

        assert_eq!(doubled.all().await.unwrap(), vec![20, 40]);
        assert_eq!(window.all().await.unwrap(), vec![2, 3]);
        assert_eq!(source.at(4).await.unwrap(), Some(5));
        assert_eq!(source.at(9).await.unwrap(), None);

        let mut seen = Vec::new();
        window.for_each(&mut |n, _| seen.push(*n)).await.unwrap();
        assert_eq!(seen, vec![2, 3]);
    }
}
