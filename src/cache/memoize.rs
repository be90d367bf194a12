//! Memoization Wrapper
//!
//! Wraps an async function so repeated calls with the same arguments are
//! answered from a [`TieredCache`].
//!
//! ```ignore
//! let lookup = memoize(cache.clone(), |id: &u32| id.to_string(), CacheOptions::new().with_prefix("exercise"))
//!     .wrap(|id: u32| async move { repository.load_exercise(id).await });
//!
//! let exercise = lookup.call(7).await?;
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use super::entry::CacheOptions;
use super::manager::{CacheValue, TieredCache};

/// Builder pairing a cache, a key derivation and the options used on write
pub struct Memoizer<T: CacheValue, K> {
    cache: Arc<TieredCache<T>>,
    key_fn: K,
    options: CacheOptions,
}

/// Start memoizing into `cache`, keyed by `key_fn(args)`
pub fn memoize<T, A, K>(cache: Arc<TieredCache<T>>, key_fn: K, options: CacheOptions) -> Memoizer<T, K>
where
    T: CacheValue,
    K: Fn(&A) -> String,
{
    Memoizer {
        cache,
        key_fn,
        options,
    }
}

impl<T: CacheValue, K> Memoizer<T, K> {
    /// Attach the wrapped function
    pub fn wrap<A, F, Fut, E>(self, inner: F) -> Memoized<T, A, K, F>
    where
        K: Fn(&A) -> String,
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        Memoized {
            cache: self.cache,
            key_fn: self.key_fn,
            options: self.options,
            inner,
            _args: PhantomData,
        }
    }
}

/// A memoized async function
pub struct Memoized<T: CacheValue, A, K, F> {
    cache: Arc<TieredCache<T>>,
    key_fn: K,
    options: CacheOptions,
    inner: F,
    _args: PhantomData<fn(A)>,
}

impl<T, A, K, F, Fut, E> Memoized<T, A, K, F>
where
    T: CacheValue,
    K: Fn(&A) -> String,
    F: Fn(A) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    /// Cached result for `args`, or the wrapped call's result (stored on success)
    pub async fn call(&self, args: A) -> std::result::Result<T, E> {
        let key = (self.key_fn)(&args);
        if let Some(value) = self.cache.get(&key, &self.options).await {
            return Ok(value);
        }

        let value = (self.inner)(args).await?;
        self.cache.set(&key, value.clone(), &self.options).await;
        Ok(value)
    }

    /// The underlying cache
    pub fn cache(&self) -> &Arc<TieredCache<T>> {
        &self.cache
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_memoized_calls_inner_once() {
        let cache = Arc::new(TieredCache::<u64>::in_memory());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let square = memoize(cache.clone(), |n: &u64| n.to_string(), CacheOptions::new().with_prefix("square"))
            .wrap(move |n: u64| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(n * n)
                }
            });

        assert_eq!(square.call(4).await, Ok(16));
        assert_eq!(square.call(4).await, Ok(16));
        assert_eq!(square.call(5).await, Ok(25));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.l1().contains("square:4"));
    }

    #[tokio::test]
    async fn test_memoized_error_not_cached() {
        let cache = Arc::new(TieredCache::<u64>::in_memory());
        let failing = memoize(cache.clone(), |n: &u64| n.to_string(), CacheOptions::new())
            .wrap(|_n: u64| async { Err::<u64, _>("unavailable") });

        assert_eq!(failing.call(1).await, Err("unavailable"));
        assert!(failing.cache().l1().is_empty());
    }
}
