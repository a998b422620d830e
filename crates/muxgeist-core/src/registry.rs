//! Registry of tracked multiplexer sessions.

use chrono::{DateTime, Utc};

use crate::buffer::{ContextBuffer, DEFAULT_CONTEXT_CAPACITY};

/// Default maximum number of tracked sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 32;

/// One tracked multiplexer session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// Session name as reported by the multiplexer. Never changes.
    id: String,
    /// Last known working directory of the active pane.
    pub working_directory: String,
    /// Identifier of the focused pane.
    pub active_pane_id: String,
    /// When this record was last refreshed successfully.
    pub last_activity: DateTime<Utc>,
    /// Most recent aggregated snapshot.
    context: ContextBuffer,
}

impl SessionRecord {
    fn new(id: String, buffer_capacity: usize) -> Self {
        Self {
            id,
            working_directory: String::new(),
            active_pane_id: String::new(),
            last_activity: Utc::now(),
            context: ContextBuffer::new(buffer_capacity),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context(&self) -> &ContextBuffer {
        &self.context
    }

    pub fn context_len(&self) -> usize {
        self.context.len()
    }

    /// Swap in a freshly built context buffer.
    ///
    /// The previous buffer is dropped whole; content larger than this
    /// record's capacity is truncated first.
    pub fn replace_context(&mut self, buffer: ContextBuffer) {
        let capacity = self.context.capacity();
        self.context = if buffer.capacity() > capacity {
            buffer.fit_to(capacity)
        } else {
            buffer
        };
    }

    /// Mark the record as refreshed at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }
}

/// Outcome of [`SessionRegistry::find_or_create`].
#[derive(Debug)]
pub enum Registration<'a> {
    /// The id was already registered.
    Existing(&'a mut SessionRecord),
    /// A new record was created for the id.
    Created(&'a mut SessionRecord),
    /// The registry is full; the id is not tracked.
    Rejected,
}

impl<'a> Registration<'a> {
    #[cfg(test)]
    pub(crate) fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    #[cfg(test)]
    pub(crate) fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected)
    }

    #[cfg(test)]
    pub(crate) fn into_record(self) -> Option<&'a mut SessionRecord> {
        match self {
            Self::Existing(record) | Self::Created(record) => Some(record),
            Self::Rejected => None,
        }
    }
}

/// Fixed-capacity collection of session records in registration order.
///
/// Storage is reserved up front and records are never removed, so a record
/// never moves once created. Lookups are linear; capacity is expected to be
/// in the tens.
#[derive(Debug)]
pub struct SessionRegistry {
    records: Vec<SessionRecord>,
    capacity: usize,
    buffer_capacity: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS, DEFAULT_CONTEXT_CAPACITY)
    }
}

impl SessionRegistry {
    /// Create a registry holding at most `capacity` sessions, each with a
    /// context buffer of `buffer_capacity` bytes.
    pub fn new(capacity: usize, buffer_capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
            buffer_capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    pub fn find(&self, id: &str) -> Option<&SessionRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    #[cfg(test)]
    pub(crate) fn find_mut(&mut self, id: &str) -> Option<&mut SessionRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    /// Look up `id`, registering it if there is room.
    pub fn find_or_create(&mut self, id: &str) -> Registration<'_> {
        if let Some(pos) = self.records.iter().position(|r| r.id == id) {
            return Registration::Existing(&mut self.records[pos]);
        }

        if self.is_full() {
            return Registration::Rejected;
        }

        self.records
            .push(SessionRecord::new(id.to_string(), self.buffer_capacity));
        let last = self.records.len() - 1;
        Registration::Created(&mut self.records[last])
    }

    /// All records in registration order.
    pub fn list(&self) -> &[SessionRecord] {
        &self.records
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SessionRecord> {
        self.records.iter_mut()
    }
}
