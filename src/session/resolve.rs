use std::{future::Future, pin::Pin};

use tracing::debug;

type Lookup<'a, T> = Pin<Box<dyn Future<Output = Option<T>> + Send + 'a>>;

/// Ordered chain of named lookups. The first one that yields a value wins and
/// the rest are never polled.
///
/// ```text
/// Resolver::new()
///     .then("session", async move { live_user })
///     .then("persisted", self.persisted_user())
///     .resolve_or("default", UserProfile::default())
///     .await
/// ```
pub struct Resolver<'a, T> {
    lookups: Vec<(&'static str, Lookup<'a, T>)>,
}

/// A resolved value and the name of the source that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub source: &'static str,
    pub value: T,
}

impl<'a, T> Default for Resolver<'a, T> {
    fn default() -> Self {
        Self { lookups: Vec::new() }
    }
}

impl<'a, T> Resolver<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(
        mut self,
        source: &'static str,
        lookup: impl Future<Output = Option<T>> + Send + 'a,
    ) -> Self {
        self.lookups.push((source, Box::pin(lookup)));
        self
    }

    pub async fn resolve(self) -> Option<Resolved<T>> {
        for (source, lookup) in self.lookups {
            if let Some(value) = lookup.await {
                debug!(source, "resolved from source");
                return Some(Resolved { source, value });
            }
        }
        None
    }

    /// Like `resolve`, falling back to `default` when every lookup misses.
    pub async fn resolve_or(self, source: &'static str, default: T) -> Resolved<T> {
        match self.resolve().await {
            Some(resolved) => resolved,
            None => {
                debug!(source, "resolved from fallback default");
                Resolved { source, value: default }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn first_available_source_wins() {
        let r = Resolver::new()
            .then("a", async { None })
            .then("b", async { Some(2) })
            .then("c", async { Some(3) })
            .resolve()
            .await
            .unwrap();
        assert_eq!(r, Resolved { source: "b", value: 2 });
    }

    #[tokio::test]
    async fn later_lookups_are_not_polled() {
        let calls = AtomicUsize::new(0);
        let r = Resolver::new()
            .then("a", async { Some("hit") })
            .then("b", async {
                calls.fetch_add(1, Ordering::SeqCst);
                Some("miss")
            })
            .resolve()
            .await
            .unwrap();
        assert_eq!(r.value, "hit");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn default_used_when_all_miss() {
        let r = Resolver::<u8>::new()
            .then("a", async { None })
            .resolve_or("default", 7)
            .await;
        assert_eq!(r, Resolved { source: "default", value: 7 });
        assert!(Resolver::<u8>::new().resolve().await.is_none());
    }
}
