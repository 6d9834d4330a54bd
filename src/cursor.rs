//! The batch cursor (C5): pages through a server-side result set via `getMore`, tracks the
//! server cursor's id and lifetime, and kills it on close or limit-reached (spec §4.5).

use std::{collections::VecDeque, time::Duration};

use bson::{rawdoc, RawArrayBuf, RawDocumentBuf};

use crate::{
    binding::ConnectionSource,
    change_stream::event::ResumeToken,
    cmap::Command,
    error::Result,
    operation::CursorInfo,
    sdam::ServerAddress,
    Namespace,
};

/// Everything needed to start driving a cursor, assembled from an operation's initial reply
/// (spec §3's "Batch Cursor State", pre-fetch fields).
#[derive(Debug, Clone)]
pub(crate) struct CursorSpecification {
    pub(crate) ns: Namespace,
    pub(crate) id: i64,
    pub(crate) initial_buffer: VecDeque<RawDocumentBuf>,
    pub(crate) batch_size: Option<u32>,
    pub(crate) max_time: Option<Duration>,
    pub(crate) post_batch_resume_token: Option<ResumeToken>,
}

impl CursorSpecification {
    pub(crate) fn new(
        info: CursorInfo,
        batch_size: Option<u32>,
        max_time: Option<Duration>,
    ) -> Self {
        Self {
            ns: info.ns,
            id: info.id,
            initial_buffer: info.first_batch,
            batch_size,
            max_time,
            post_batch_resume_token: info
                .post_batch_resume_token
                .map(ResumeToken::from_raw_document),
        }
    }
}

/// The sign-preserving user limit described in spec §4.5: positive caps the delivered count and
/// kills the cursor when reached, negative does the same but also forces a single batch, zero is
/// unlimited.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Limit(i64);

impl Limit {
    pub(crate) fn new(limit: i64) -> Self {
        Self(limit)
    }

    fn is_unlimited(self) -> bool {
        self.0 == 0
    }

    fn is_single_batch(self) -> bool {
        self.0 < 0
    }

    fn magnitude(self) -> i64 {
        self.0.abs()
    }
}

/// A server-paged cursor over raw result documents. Not safe for concurrent use by multiple
/// callers, matching spec §4.5's contract.
pub(crate) struct Cursor {
    ns: Namespace,
    id: i64,
    buffer: VecDeque<RawDocumentBuf>,
    source: ConnectionSource,
    batch_size: Option<u32>,
    max_time: Option<Duration>,
    limit: Limit,
    delivered: i64,
    post_batch_resume_token: Option<ResumeToken>,
    closed: bool,
}

impl Cursor {
    pub(crate) fn new(spec: CursorSpecification, source: ConnectionSource, limit: Limit) -> Self {
        Self {
            ns: spec.ns,
            id: spec.id,
            buffer: spec.initial_buffer,
            source,
            batch_size: spec.batch_size,
            max_time: spec.max_time,
            limit,
            delivered: 0,
            post_batch_resume_token: spec.post_batch_resume_token,
            closed: false,
        }
    }

    pub(crate) fn address(&self) -> &ServerAddress {
        self.source.address()
    }

    pub(crate) fn post_batch_resume_token(&self) -> Option<&ResumeToken> {
        self.post_batch_resume_token.as_ref()
    }

    /// True if a document is immediately available or the server cursor may still yield more,
    /// without making a network call.
    pub(crate) fn has_next(&self) -> bool {
        !self.buffer.is_empty() || (!self.closed && self.id != 0)
    }

    /// Returns the next document, fetching a new batch from the server if the current one is
    /// exhausted and the server cursor is still open.
    pub(crate) fn try_next(&mut self) -> Result<Option<RawDocumentBuf>> {
        if self.buffer.is_empty() && !self.closed && self.id != 0 {
            self.fetch_next_batch()?;
        }
        Ok(self.buffer.pop_front())
    }

    fn fetch_next_batch(&mut self) -> Result<()> {
        let mut body = rawdoc! {
            "getMore": self.id,
            "collection": self.ns.coll.clone(),
        };

        let n = self.number_to_request();
        if n != 0 {
            body.append("batchSize", n as i32);
        }
        if let Some(max_time) = self.max_time {
            body.append("maxTimeMS", max_time.as_millis() as i64);
        }

        let command = Command::new(self.ns.db.clone(), body);
        let mut connection = self.source.get_connection()?;
        let response = connection.get_more(command)?;
        let reply: GetMoreReply = response.body()?;

        self.id = reply.cursor.id;
        self.post_batch_resume_token = reply
            .cursor
            .post_batch_resume_token
            .map(ResumeToken::from_raw_document);
        self.delivered += reply.cursor.next_batch.len() as i64;
        self.buffer.extend(reply.cursor.next_batch);

        if self.limit.is_single_batch() || self.limit_reached() {
            self.close();
        }

        Ok(())
    }

    fn number_to_request(&self) -> i64 {
        if !self.limit.is_unlimited() {
            let remaining = self.limit.magnitude() - self.delivered;
            match self.batch_size {
                Some(batch_size) if (batch_size as i64) < remaining && batch_size != 0 => {
                    batch_size as i64
                }
                _ => remaining,
            }
        } else {
            self.batch_size.unwrap_or(0) as i64
        }
    }

    fn limit_reached(&self) -> bool {
        !self.limit.is_unlimited() && self.delivered >= self.limit.magnitude()
    }

    /// Kills the server cursor if one is still open. Idempotent: a second call on an already-zero
    /// id is a no-op (spec §4.5).
    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.id != 0 {
            let mut cursors = RawArrayBuf::new();
            cursors.push(self.id);

            let mut body = rawdoc! {
                "killCursors": self.ns.coll.clone(),
            };
            body.append("cursors", cursors);
            let command = Command::new(self.ns.db.clone(), body);
            if let Ok(mut connection) = self.source.get_connection() {
                let _ = connection.kill_cursors(command);
            }
            self.id = 0;
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.close();
    }
}

impl Iterator for Cursor {
    type Item = Result<RawDocumentBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        self.try_next().transpose()
    }
}

#[derive(Debug, serde::Deserialize)]
struct GetMoreReply {
    cursor: GetMoreCursorBody,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetMoreCursorBody {
    id: i64,
    next_batch: VecDeque<RawDocumentBuf>,
    post_batch_resume_token: Option<RawDocumentBuf>,
}

#[cfg(test)]
mod test {
    use super::Limit;

    #[test]
    fn zero_limit_is_unlimited() {
        assert!(Limit::new(0).is_unlimited());
    }

    #[test]
    fn negative_limit_forces_single_batch() {
        let limit = Limit::new(-5);
        assert!(limit.is_single_batch());
        assert_eq!(limit.magnitude(), 5);
    }

    #[test]
    fn positive_limit_is_not_single_batch() {
        assert!(!Limit::new(5).is_single_batch());
    }
}
