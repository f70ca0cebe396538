//! Deferred, at-most-once constructed values.

use parking_lot::Mutex;
use std::fmt;
use std::sync::OnceLock;

type Constructor<T, E> = Box<dyn Fn() -> Result<T, E> + Send + Sync>;

/// A value that is constructed on first access and cached afterwards.
///
/// Construction uses double-checked locking: a lock-free check of the cache,
/// then a lock and a second check before the constructor is invoked. Under
/// concurrent first access the constructor therefore runs exactly once and all
/// callers observe the same value.
///
/// A constructor error is handed to the caller that triggered the construction
/// and the value stays unconstructed, so the next access retries. Callers that
/// were waiting on the lock behind a failed construction retry in turn instead
/// of observing the earlier error.
///
/// A constructor that legitimately produces "nothing" should use an `Option`
/// as `T`: a cached `None` counts as constructed and is never rebuilt.
pub struct LazyValue<T, E = anyhow::Error> {
    state: State<T, E>,
}

enum State<T, E> {
    Fixed(T),
    Deferred {
        cell: OnceLock<T>,
        lock: Mutex<()>,
        constructor: Constructor<T, E>,
    },
}

impl<T, E> LazyValue<T, E> {
    /// Creates a value that is built by `constructor` on first access.
    pub fn new<F>(constructor: F) -> Self
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        Self {
            state: State::Deferred {
                cell: OnceLock::new(),
                lock: Mutex::new(()),
                constructor: Box::new(constructor),
            },
        }
    }

    /// Creates an already constructed value.
    pub fn of(value: T) -> Self {
        Self {
            state: State::Fixed(value),
        }
    }

    /// Returns the value, constructing it first if necessary.
    pub fn get_value(&self) -> Result<&T, E> {
        let (cell, lock, constructor) = match &self.state {
            State::Fixed(value) => return Ok(value),
            State::Deferred {
                cell,
                lock,
                constructor,
            } => (cell, lock, constructor),
        };

        if let Some(value) = cell.get() {
            return Ok(value);
        }

        let _guard = lock.lock();
        if let Some(value) = cell.get() {
            return Ok(value);
        }

        let constructed = constructor()?;
        Ok(cell.get_or_init(|| constructed))
    }

    /// Whether the value has been constructed.
    pub fn is_initialised(&self) -> bool {
        self.get_if_initialised().is_some()
    }

    /// Returns the value only if it was already constructed.
    ///
    /// This never triggers construction, which lets teardown code skip
    /// resources that were never built.
    pub fn get_if_initialised(&self) -> Option<&T> {
        match &self.state {
            State::Fixed(value) => Some(value),
            State::Deferred { cell, .. } => cell.get(),
        }
    }
}

impl<T: fmt::Debug, E> fmt::Debug for LazyValue<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get_if_initialised() {
            Some(value) => f.debug_tuple("LazyValue").field(value).finish(),
            None => f.write_str("LazyValue(<unconstructed>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_constructs_on_first_access() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy: LazyValue<u32> = LazyValue::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        });

        assert!(!lazy.is_initialised());
        assert_eq!(lazy.get_if_initialised(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(*lazy.get_value().unwrap(), 42);
        assert_eq!(*lazy.get_value().unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.get_if_initialised(), Some(&42));
    }

    #[test]
    fn test_fixed_value_is_initialised() {
        let lazy: LazyValue<&str> = LazyValue::of("ready");
        assert!(lazy.is_initialised());
        assert_eq!(*lazy.get_value().unwrap(), "ready");
    }

    #[test]
    fn test_cached_none_is_not_rebuilt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy: LazyValue<Option<String>> = LazyValue::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        });

        assert_eq!(lazy.get_value().unwrap(), &None);
        assert_eq!(lazy.get_value().unwrap(), &None);
        assert!(lazy.is_initialised());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_leaves_value_unconstructed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy: LazyValue<u32> = LazyValue::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("connection refused");
            }
            Ok(7)
        });

        let err = lazy.get_value().unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
        assert!(!lazy.is_initialised());

        assert_eq!(*lazy.get_value().unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_access_constructs_once() {
        const THREADS: usize = 16;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy: LazyValue<Arc<String>> = LazyValue::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(10));
            Ok(Arc::new("shared".to_owned()))
        });
        let barrier = Barrier::new(THREADS);

        let values: Vec<Arc<String>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        Arc::clone(lazy.get_value().unwrap())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = &values[0];
        assert!(values.iter().all(|v| Arc::ptr_eq(v, first)));
    }

    #[test]
    fn test_concurrent_access_shares_cached_none() {
        const THREADS: usize = 16;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy: LazyValue<Option<Arc<String>>> = LazyValue::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(10));
            Ok(None)
        });
        let barrier = Barrier::new(THREADS);

        // Addresses of the cached slot each caller got back.
        let values: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        let value = lazy.get_value().unwrap();
                        assert!(value.is_none());
                        value as *const Option<Arc<String>> as usize
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| *v == values[0]));
        assert!(lazy.is_initialised());
    }

    #[test]
    fn test_concurrent_waiters_retry_after_failure() {
        const THREADS: usize = 8;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy: LazyValue<usize> = LazyValue::new(move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            if attempt == 0 {
                anyhow::bail!("first attempt fails");
            }
            Ok(attempt)
        });
        let barrier = Barrier::new(THREADS);

        let results: Vec<Result<usize, String>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        lazy.get_value().map(|v| *v).map_err(|e| e.to_string())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        // Exactly one caller sees the failure, everybody else the retried value.
        let failures = results.iter().filter(|r| r.is_err()).count();
        assert_eq!(failures, 1);
        assert!(results.iter().flatten().all(|v| *v == 1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
