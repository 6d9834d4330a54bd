//! The entry point into the operation layer: a cheap handle to a single server's connection
//! pool, through which every operation, cursor, and change stream is dispatched (spec §4.2).

mod executor;

use std::sync::Arc;

use bson::Document;
use serde::de::DeserializeOwned;

use crate::{
    binding::ConnectionPool,
    change_stream::{options::ChangeStreamOptions, ChangeStream},
    cursor::{Cursor, Limit},
    error::Result,
    operation::{
        watch::{ChangeStreamTarget, Watch},
        Operation,
    },
};

/// A handle to a server's connection pool. Cheaply [`Clone`]able: cloning only bumps the
/// underlying `Arc`, matching the teacher's own `Client` (an `Arc`-backed handle shared across
/// threads without re-dialing the server).
#[derive(Clone)]
pub struct Client {
    pool: Arc<dyn ConnectionPool>,
}

impl Client {
    /// Builds a client dispatching against the given connection pool. Establishing and
    /// monitoring the pool itself (TLS, auth, topology discovery) is out of scope for this
    /// layer; callers hand in an already-connected pool.
    pub fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        Self { pool }
    }

    /// Runs a single operation to completion, applying the dispatcher's single-retry policy
    /// (spec §4.2 steps 6-7) on a retryable failure.
    pub(crate) fn execute_operation<T: Operation>(&self, mut op: T) -> Result<T::O> {
        self.executor().execute(&mut op)
    }

    /// Runs a cursor-producing operation and wraps the resulting [`crate::operation::CursorInfo`]
    /// in a live [`Cursor`] bound to the connection source it was created against.
    pub(crate) fn execute_cursor_operation<T>(&self, mut op: T, limit: Limit) -> Result<Cursor>
    where
        T: Operation<O = crate::cursor::CursorSpecification>,
    {
        self.executor().execute_cursor(&mut op, limit)
    }

    /// Opens a change stream, issuing the wrapping `aggregate` command and handing back a
    /// resumable cursor over typed events (spec §4.6).
    pub(crate) fn execute_watch<T>(
        &self,
        target: ChangeStreamTarget,
        pipeline: Vec<Document>,
        options: Option<ChangeStreamOptions>,
    ) -> Result<ChangeStream<T>>
    where
        T: DeserializeOwned,
    {
        let watch = Watch::new(target.clone(), pipeline.clone(), options.clone())?;
        let cursor = self.execute_cursor_operation(watch, Limit::default())?;
        Ok(ChangeStream::new(self.clone(), cursor, target, pipeline, options))
    }

    fn executor(&self) -> executor::Executor<'_> {
        executor::Executor::new(&self.pool)
    }
}

#[cfg(test)]
mod test {
    use std::sync::{atomic::AtomicUsize, Arc};

    use super::*;
    use crate::{
        binding::ConnectionPool,
        cmap::{Command, Connection, RawCommandResponse, StreamDescription},
        error::{Error, ErrorKind},
        operation::RunCommand,
        sdam::ServerAddress,
    };

    struct CountingConnection {
        stream_description: StreamDescription,
        address: ServerAddress,
        calls: Arc<AtomicUsize>,
        fail_first: bool,
    }

    impl Connection for CountingConnection {
        fn stream_description(&self) -> &StreamDescription {
            &self.stream_description
        }

        fn address(&self) -> &ServerAddress {
            &self.address
        }

        fn command(&mut self, _command: Command) -> Result<RawCommandResponse> {
            let attempt = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if attempt == 0 && self.fail_first {
                return Err(Error::new(ErrorKind::Io(Arc::new(std::io::ErrorKind::TimedOut.into())), None));
            }
            Ok(RawCommandResponse::new(bson::rawdoc! { "ok": 1.0 }))
        }
    }

    struct CountingPool {
        address: ServerAddress,
        calls: Arc<AtomicUsize>,
        fail_first: bool,
    }

    impl ConnectionPool for CountingPool {
        fn address(&self) -> &ServerAddress {
            &self.address
        }

        fn checkout(&self) -> Result<Box<dyn Connection>> {
            Ok(Box::new(CountingConnection {
                stream_description: StreamDescription::initial(),
                address: self.address.clone(),
                calls: self.calls.clone(),
                fail_first: self.fail_first,
            }))
        }
    }

    #[test]
    fn run_command_succeeds_against_a_healthy_pool() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(CountingPool {
            address: ServerAddress::default(),
            calls: calls.clone(),
            fail_first: false,
        });
        let client = Client::new(pool);
        let op = RunCommand::new("admin".to_string(), bson::doc! { "ping": 1 }, None).unwrap();
        client.execute_operation(op).unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn a_network_error_on_a_retryable_read_is_retried_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(CountingPool {
            address: ServerAddress::default(),
            calls: calls.clone(),
            fail_first: true,
        });
        let client = Client::new(pool);
        let op = crate::operation::ListDatabases::new(None, false, None);
        client.execute_operation(op).unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    struct CursorReplyConnection {
        stream_description: StreamDescription,
        address: ServerAddress,
    }

    impl Connection for CursorReplyConnection {
        fn stream_description(&self) -> &StreamDescription {
            &self.stream_description
        }

        fn address(&self) -> &ServerAddress {
            &self.address
        }

        fn command(&mut self, _command: Command) -> Result<RawCommandResponse> {
            Ok(RawCommandResponse::new(bson::rawdoc! {
                "ok": 1.0,
                "cursor": { "id": 0_i64, "ns": "db.coll", "firstBatch": [] },
            }))
        }
    }

    struct CursorReplyPool {
        address: ServerAddress,
    }

    impl ConnectionPool for CursorReplyPool {
        fn address(&self) -> &ServerAddress {
            &self.address
        }

        fn checkout(&self) -> Result<Box<dyn Connection>> {
            Ok(Box::new(CursorReplyConnection {
                stream_description: StreamDescription::initial(),
                address: self.address.clone(),
            }))
        }
    }

    #[test]
    fn execute_watch_opens_a_change_stream_over_a_collection() {
        let client = Client::new(Arc::new(CursorReplyPool {
            address: ServerAddress::default(),
        }));
        let ns = crate::Namespace::new("db", "coll");
        let stream = client.execute_watch::<bson::Document>(ns.into(), vec![], None);
        assert!(stream.is_ok());
    }
}
