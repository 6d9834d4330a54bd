//! The command dispatcher (C2): acquires a binding, sends a command through a connection, and
//! retries a transient failure exactly once (spec §4.2).

use std::sync::Arc;

use crate::{
    binding::{Binding, ConnectionPool, ConnectionSource, ReadBinding, WriteBinding},
    cursor::{Cursor, CursorSpecification, Limit},
    error::{Error, Result},
    operation::{Operation, Retryability},
};

/// Runs the dispatch algorithm against a single pool. Built fresh per call rather than stored on
/// [`crate::Client`] since it borrows nothing but the pool handle.
pub(crate) struct Executor<'a> {
    pool: &'a Arc<dyn ConnectionPool>,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(pool: &'a Arc<dyn ConnectionPool>) -> Self {
        Self { pool }
    }

    fn binding_for<T: Operation>(&self, op: &T) -> Box<dyn Binding> {
        match op.selection_criteria() {
            Some(criteria) => Box::new(ReadBinding::new(criteria.clone(), self.pool.clone())),
            None => Box::new(WriteBinding::new(self.pool.clone())),
        }
    }

    /// Steps 1-5 of spec §4.2's algorithm: acquire a binding and connection, send the command,
    /// transform the reply. The connection source is returned alongside the output so a
    /// cursor-producing call can keep it alive; a plain `execute` call just drops it, which
    /// releases the connection.
    fn dispatch<T: Operation>(&self, op: &mut T) -> Result<(T::O, ConnectionSource)> {
        let binding = self.binding_for(op);
        let source = binding.get_connection_source()?;
        let mut connection = source.get_connection()?;

        let command = op.build(connection.stream_description())?;
        let output = match connection.command(command) {
            Ok(response) => {
                let description = connection.stream_description().clone();
                op.handle_response(response, &description)
            }
            Err(err) => op.handle_error(err),
        }?;
        Ok((output, source))
    }

    fn should_retry<T: Operation>(&self, op: &T, err: &Error) -> bool {
        match op.retryability() {
            Retryability::Read => err.is_retryable_read(),
            Retryability::Write => err.is_write_retryable(),
            Retryability::None => false,
        }
    }

    /// Step 6/7: a retryable failure closes the connection (dropped along with the source inside
    /// `dispatch`) and retries exactly once against a freshly acquired one.
    pub(crate) fn execute<T: Operation>(&self, op: &mut T) -> Result<T::O> {
        match self.dispatch(op) {
            Ok((output, _source)) => Ok(output),
            Err(err) if self.should_retry(op, &err) => {
                op.update_for_retry();
                self.dispatch(op).map(|(output, _source)| output)
            }
            Err(err) => Err(err),
        }
    }

    /// Same algorithm, but the server's reply is a cursor's first batch rather than a terminal
    /// result: the connection source the reply came from is kept alive and handed to the new
    /// [`Cursor`] so its `getMore`/`killCursors` round trips reuse it.
    pub(crate) fn execute_cursor<T>(&self, op: &mut T, limit: Limit) -> Result<Cursor>
    where
        T: Operation<O = CursorSpecification>,
    {
        match self.dispatch(op) {
            Ok((spec, source)) => Ok(Cursor::new(spec, source, limit)),
            Err(err) if self.should_retry(op, &err) => {
                op.update_for_retry();
                let (spec, source) = self.dispatch(op)?;
                Ok(Cursor::new(spec, source, limit))
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        cmap::{Command, Connection, RawCommandResponse, StreamDescription},
        operation::RunCommand,
        sdam::ServerAddress,
    };

    struct FlakyConnection {
        stream_description: StreamDescription,
        address: ServerAddress,
        remaining_failures: usize,
    }

    impl Connection for FlakyConnection {
        fn stream_description(&self) -> &StreamDescription {
            &self.stream_description
        }

        fn address(&self) -> &ServerAddress {
            &self.address
        }

        fn command(&mut self, _command: Command) -> Result<RawCommandResponse> {
            if self.remaining_failures > 0 {
                self.remaining_failures -= 1;
                return Err(Error::network_timeout());
            }
            Ok(RawCommandResponse::new(bson::rawdoc! { "ok": 1.0 }))
        }
    }

    struct FlakyPool {
        address: ServerAddress,
        failures_per_checkout: usize,
        checkouts: AtomicUsize,
    }

    impl ConnectionPool for FlakyPool {
        fn address(&self) -> &ServerAddress {
            &self.address
        }

        fn checkout(&self) -> Result<Box<dyn Connection>> {
            self.checkouts.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FlakyConnection {
                stream_description: StreamDescription::initial(),
                address: self.address.clone(),
                remaining_failures: self.failures_per_checkout,
            }))
        }
    }

    #[test]
    fn a_non_retryable_operation_never_retries_a_network_error() {
        let pool: Arc<dyn ConnectionPool> = Arc::new(FlakyPool {
            address: ServerAddress::default(),
            failures_per_checkout: 1,
            checkouts: AtomicUsize::new(0),
        });
        let executor = Executor::new(&pool);
        let mut op = RunCommand::new("admin".to_string(), bson::doc! { "ping": 1 }, None).unwrap();
        assert!(executor.execute(&mut op).is_err());
    }

    #[test]
    fn a_retryable_read_survives_one_network_error() {
        let pool: Arc<dyn ConnectionPool> = Arc::new(FlakyPool {
            address: ServerAddress::default(),
            failures_per_checkout: 1,
            checkouts: AtomicUsize::new(0),
        });
        let executor = Executor::new(&pool);
        let mut op = crate::operation::ListDatabases::new(None, false, None);
        assert!(executor.execute(&mut op).is_ok());
    }
}
