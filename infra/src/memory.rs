//! An `r2d2` connection manager over shared in-process state.
//!
//! Every connection handed out by a [`MemoryConnectionManager`] refers to the
//! same value, so a pool of them behaves like a pool of connections to one
//! database. Access is serialised through a single mutex.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use err_derive::Error;
use log::*;
use r2d2::Pool;

#[derive(Debug, Error, PartialEq, Eq)]
#[error(display = "memory store lock poisoned")]
pub struct Poisoned;

pub struct MemoryConnectionManager<S> {
    state: Arc<Mutex<S>>,
}

pub struct MemoryConnection<S> {
    state: Arc<Mutex<S>>,
}

impl<S: Default> MemoryConnectionManager<S> {
    pub fn new() -> Self {
        Self::with_state(S::default())
    }
}

impl<S> MemoryConnectionManager<S> {
    pub fn with_state(state: S) -> Self {
        let state = Arc::new(Mutex::new(state));
        MemoryConnectionManager { state }
    }
}

impl<S: Send + 'static> MemoryConnectionManager<S> {
    pub fn build(self) -> Result<Pool<Self>, r2d2::Error> {
        debug!("Build in-memory pool");
        Pool::builder().max_size(4).build(self)
    }
}

impl<S: Default> Default for MemoryConnectionManager<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Clone for MemoryConnectionManager<S> {
    fn clone(&self) -> Self {
        let state = self.state.clone();
        MemoryConnectionManager { state }
    }
}

impl<S> fmt::Debug for MemoryConnectionManager<S> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("MemoryConnectionManager")
            .field("connections", &Arc::strong_count(&self.state))
            .finish()
    }
}

impl<S> MemoryConnection<S> {
    pub fn lock(&self) -> Result<MutexGuard<'_, S>, Poisoned> {
        self.state.lock().map_err(|_| Poisoned)
    }
}

impl<S> fmt::Debug for MemoryConnection<S> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("MemoryConnection").finish()
    }
}

impl<S: Send + 'static> r2d2::ManageConnection for MemoryConnectionManager<S> {
    type Connection = MemoryConnection<S>;
    type Error = Poisoned;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        trace!("Connect to in-memory state");
        let state = self.state.clone();
        Ok(MemoryConnection { state })
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.lock().map(|_| ())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.state.is_poisoned()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pooled_connections_share_state() {
        env_logger::try_init().unwrap_or_default();
        let pool = MemoryConnectionManager::<Vec<u32>>::new()
            .build()
            .expect("pool");

        let first = pool.get().expect("first connection");
        let second = pool.get().expect("second connection");

        first.lock().expect("lock").push(42);

        assert_eq!(*second.lock().expect("lock"), vec![42]);
    }

    #[test]
    fn seeded_state_is_visible() {
        env_logger::try_init().unwrap_or_default();
        let pool = MemoryConnectionManager::with_state(vec!["latte"])
            .build()
            .expect("pool");

        let conn = pool.get().expect("connection");
        assert_eq!(*conn.lock().expect("lock"), vec!["latte"]);
    }

    #[test]
    fn cloned_managers_refer_to_the_same_state() {
        let manager = MemoryConnectionManager::<Vec<u32>>::new();
        let other = manager.clone();

        use r2d2::ManageConnection;
        manager
            .connect()
            .expect("connect")
            .lock()
            .expect("lock")
            .push(7);
        let conn = other.connect().expect("connect");
        assert_eq!(*conn.lock().expect("lock"), vec![7]);
    }
}
