//! The resumable change-stream cursor (C6): wraps a batch cursor and, on a resumable error,
//! reopens it with `resumeAfter` pointing at the last resume token seen (spec §4.6).

pub mod event;
pub(crate) mod options;

use std::marker::PhantomData;

use bson::RawDocumentBuf;
use serde::de::DeserializeOwned;

use crate::{
    change_stream::{
        event::{ChangeStreamEvent, ResumeToken},
        options::ChangeStreamOptions,
    },
    cursor::{Cursor, Limit},
    error::{ChangeStreamErrorKind, Error, ErrorKind, Result},
    operation::watch::{ChangeStreamTarget, Watch},
    Client,
};

/// A resumable cursor over typed change-stream events.
///
/// Each delivered document's `_id` field becomes the stream's resume token (spec §4.6); a
/// document with no `_id` is a fatal change-stream error, never a reason to resume. On a
/// resumable error the underlying batch cursor is closed and a fresh `aggregate` is issued with
/// `resumeAfter` set to that token, bounded to one such resume attempt per `try_next` call.
pub struct ChangeStream<T> {
    client: Client,
    cursor: Cursor,
    target: ChangeStreamTarget,
    pipeline: Vec<bson::Document>,
    options: Option<ChangeStreamOptions>,
    resume_token: Option<ResumeToken>,
    _marker: PhantomData<T>,
}

impl<T> ChangeStream<T>
where
    T: DeserializeOwned,
{
    pub(crate) fn new(
        client: Client,
        cursor: Cursor,
        target: ChangeStreamTarget,
        pipeline: Vec<bson::Document>,
        options: Option<ChangeStreamOptions>,
    ) -> Self {
        let resume_token = options
            .as_ref()
            .and_then(|o| o.resume_after.clone().or_else(|| o.start_after.clone()));
        Self {
            client,
            cursor,
            target,
            pipeline,
            options,
            resume_token,
            _marker: PhantomData,
        }
    }

    /// The most recently observed resume token, usable to manually resume this stream later via
    /// `resume_after` on a fresh `watch` call.
    pub fn resume_token(&self) -> Option<&ResumeToken> {
        self.resume_token.as_ref()
    }

    /// Whether the underlying server cursor may still yield more events without a round trip.
    pub fn is_alive(&self) -> bool {
        self.cursor.has_next()
    }

    /// Returns the next event, decoding it and recording its `_id` as the new resume token. If
    /// the attempt fails with a resumable error the stream reopens once and retries before
    /// giving up (spec §4.6's resumable algorithm).
    pub fn try_next(&mut self) -> Result<Option<ChangeStreamEvent<T>>> {
        match self.cursor.try_next() {
            Ok(doc) => doc.map(|doc| self.decode(doc)).transpose(),
            Err(err) if err.is_resumable() => {
                self.resume()?;
                self.cursor.try_next()?.map(|doc| self.decode(doc)).transpose()
            }
            Err(err) => Err(err),
        }
    }

    fn decode(&mut self, doc: RawDocumentBuf) -> Result<ChangeStreamEvent<T>> {
        let id = doc
            .get("_id")?
            .and_then(bson::RawBsonRef::as_document)
            .map(|d| RawDocumentBuf::from_bytes(d.as_bytes().to_vec()))
            .transpose()?
            .ok_or_else(|| Error::from(ErrorKind::ChangeStream(ChangeStreamErrorKind::MissingResumeToken)))?;
        self.resume_token = Some(ResumeToken::from_raw_document(id));

        Ok(bson::from_slice(doc.as_bytes())?)
    }

    fn resume(&mut self) -> Result<()> {
        self.cursor.close();

        let mut options = self.options.clone().unwrap_or_default();
        options.resume_after = self.resume_token.clone();
        options.start_after = None;
        options.start_at_operation_time = None;

        let watch = Watch::new(self.target.clone(), self.pipeline.clone(), Some(options.clone()))?;
        self.cursor = self.client.execute_cursor_operation(watch, Limit::default())?;
        self.options = Some(options);
        Ok(())
    }
}

impl<T> Iterator for ChangeStream<T>
where
    T: DeserializeOwned,
{
    type Item = Result<ChangeStreamEvent<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.try_next().transpose()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::{
        binding::{ConnectionPool, ConnectionSource},
        cmap::{Command, Connection, RawCommandResponse, StreamDescription},
        sdam::ServerAddress,
        Namespace,
    };

    struct StubConnection {
        stream_description: StreamDescription,
        address: ServerAddress,
    }

    impl Connection for StubConnection {
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

    struct StubPool {
        address: ServerAddress,
    }

    impl ConnectionPool for StubPool {
        fn address(&self) -> &ServerAddress {
            &self.address
        }

        fn checkout(&self) -> Result<Box<dyn Connection>> {
            Ok(Box::new(StubConnection {
                stream_description: StreamDescription::initial(),
                address: self.address.clone(),
            }))
        }
    }

    fn empty_cursor() -> Cursor {
        let pool: Arc<dyn ConnectionPool> = Arc::new(StubPool {
            address: ServerAddress::default(),
        });
        let source = ConnectionSource::new(pool);
        let spec = crate::cursor::CursorSpecification::new(
            crate::operation::CursorInfo {
                id: 0,
                ns: Namespace::new("db", "coll"),
                first_batch: Default::default(),
                post_batch_resume_token: None,
            },
            None,
            None,
        );
        Cursor::new(spec, source, Limit::default())
    }

    #[test]
    fn decode_without_an_id_field_is_a_fatal_error() {
        let client = Client::new(Arc::new(StubPool {
            address: ServerAddress::default(),
        }));
        let mut stream: ChangeStream<bson::Document> = ChangeStream::new(
            client,
            empty_cursor(),
            Namespace::new("db", "coll").into(),
            vec![],
            None,
        );

        let doc = bson::rawdoc! { "operationType": "insert" };
        let err = stream.decode(doc).unwrap_err();
        assert!(matches!(
            err.kind.as_ref(),
            ErrorKind::ChangeStream(ChangeStreamErrorKind::MissingResumeToken)
        ));
    }

    #[test]
    fn decode_records_the_id_field_as_the_resume_token() {
        let client = Client::new(Arc::new(StubPool {
            address: ServerAddress::default(),
        }));
        let mut stream: ChangeStream<bson::Document> = ChangeStream::new(
            client,
            empty_cursor(),
            Namespace::new("db", "coll").into(),
            vec![],
            None,
        );

        let doc = bson::rawdoc! {
            "_id": { "token": "abc" },
            "operationType": "insert",
        };
        stream.decode(doc).unwrap();
        assert!(stream.resume_token().is_some());
    }
}
