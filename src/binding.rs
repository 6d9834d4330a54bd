//! Reference-counted acquisition of connections for read and write operations (spec §5/§6).
//!
//! A binding stands between an operation and a connection pool: it knows how to pick a server
//! (via a [`SelectionCriteria`]) and hand back a [`ConnectionSource`] that, in turn, checks a
//! connection out of that server's pool. Every acquire is matched by exactly one release, on
//! every exit path including errors — dropping a guard releases it, so callers don't have to
//! remember to call `release()` explicitly.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::{
    cmap::Connection,
    error::Result,
    sdam::ServerAddress,
    selection_criteria::SelectionCriteria,
};

/// Tracks how many live acquisitions reference a shared resource, so the last release can run
/// cleanup. Grounded on the reference-counted release discipline spec §5 requires of bindings and
/// connection sources.
#[derive(Debug, Default)]
pub(crate) struct RefCount(AtomicUsize);

impl RefCount {
    pub(crate) fn retain(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Releases one reference, returning the remaining count.
    pub(crate) fn release(&self) -> usize {
        self.0.fetch_sub(1, Ordering::SeqCst) - 1
    }
}

/// A factory for connections to a single, already-selected server. Acquired from a binding,
/// reference-counted like the binding itself (spec §6: "Connection Source").
pub(crate) struct ConnectionSource {
    address: ServerAddress,
    pool: Arc<dyn ConnectionPool>,
    ref_count: Arc<RefCount>,
}

/// The subset of a connection pool a `ConnectionSource` needs. A real pool additionally handles
/// TLS, authentication, and connection establishment, none of which the operation layer touches
/// directly. Implemented by whatever transport layer a [`crate::Client`] is constructed with.
pub trait ConnectionPool: Send + Sync {
    fn address(&self) -> &ServerAddress;

    fn checkout(&self) -> Result<Box<dyn Connection>>;
}

impl ConnectionSource {
    pub(crate) fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        let address = pool.address().clone();
        Self {
            address,
            pool,
            ref_count: Arc::new(RefCount::default()),
        }
    }

    pub(crate) fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Check a connection out of this source's pool.
    pub(crate) fn get_connection(&self) -> Result<Box<dyn Connection>> {
        self.pool.checkout()
    }

    pub(crate) fn retain(&self) -> Self {
        self.ref_count.retain();
        Self {
            address: self.address.clone(),
            pool: self.pool.clone(),
            ref_count: self.ref_count.clone(),
        }
    }
}

impl Drop for ConnectionSource {
    fn drop(&mut self) {
        self.ref_count.release();
    }
}

/// The trait that read- and write-side bindings share: selecting a server and handing back a
/// `ConnectionSource` for it.
pub(crate) trait Binding: Send + Sync {
    /// The selection criteria this binding uses to pick a server, if it has one (a write binding
    /// always targets the primary and has none).
    fn selection_criteria(&self) -> Option<&SelectionCriteria>;

    /// Select a server and return a source for acquiring connections to it.
    fn get_connection_source(&self) -> Result<ConnectionSource>;
}

/// A binding for read operations: carries the caller's read preference and resolves it to a
/// server on each acquisition.
pub(crate) struct ReadBinding {
    selection_criteria: SelectionCriteria,
    pool: Arc<dyn ConnectionPool>,
}

impl ReadBinding {
    pub(crate) fn new(selection_criteria: SelectionCriteria, pool: Arc<dyn ConnectionPool>) -> Self {
        Self {
            selection_criteria,
            pool,
        }
    }
}

impl Binding for ReadBinding {
    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        Some(&self.selection_criteria)
    }

    fn get_connection_source(&self) -> Result<ConnectionSource> {
        Ok(ConnectionSource::new(self.pool.clone()))
    }
}

/// A binding for write operations: always targets the primary, so it carries no selection
/// criteria of its own.
pub(crate) struct WriteBinding {
    pool: Arc<dyn ConnectionPool>,
}

impl WriteBinding {
    pub(crate) fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        Self { pool }
    }
}

impl Binding for WriteBinding {
    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        None
    }

    fn get_connection_source(&self) -> Result<ConnectionSource> {
        Ok(ConnectionSource::new(self.pool.clone()))
    }
}

#[cfg(test)]
mod test {
    use std::sync::{atomic::AtomicBool, Arc};

    use super::*;
    use crate::{
        cmap::StreamDescription,
        error::{Error, ErrorKind},
    };

    struct FakePool {
        address: ServerAddress,
        checked_out: AtomicBool,
    }

    struct FakeConnection {
        stream_description: StreamDescription,
        address: ServerAddress,
    }

    impl Connection for FakeConnection {
        fn stream_description(&self) -> &StreamDescription {
            &self.stream_description
        }

        fn address(&self) -> &ServerAddress {
            &self.address
        }

        fn command(&mut self, _command: crate::cmap::Command) -> Result<crate::cmap::RawCommandResponse> {
            Err(ErrorKind::Internal {
                message: "fake connection does not implement command()".to_string(),
            }
            .into())
        }
    }

    impl ConnectionPool for FakePool {
        fn address(&self) -> &ServerAddress {
            &self.address
        }

        fn checkout(&self) -> Result<Box<dyn Connection>> {
            if self.checked_out.swap(true, Ordering::SeqCst) {
                return Err(Error::internal("pool exhausted"));
            }
            Ok(Box::new(FakeConnection {
                stream_description: StreamDescription::initial(),
                address: self.address.clone(),
            }))
        }
    }

    #[test]
    fn write_binding_has_no_selection_criteria() {
        let pool = Arc::new(FakePool {
            address: ServerAddress::default(),
            checked_out: AtomicBool::new(false),
        });
        let binding = WriteBinding::new(pool);
        assert!(binding.selection_criteria().is_none());
        assert!(binding.get_connection_source().unwrap().get_connection().is_ok());
    }

    #[test]
    fn connection_source_retain_increments_ref_count() {
        let pool = Arc::new(FakePool {
            address: ServerAddress::default(),
            checked_out: AtomicBool::new(false),
        });
        let source = ConnectionSource::new(pool);
        let retained = source.retain();
        assert_eq!(source.address(), retained.address());
    }
}
