//! Watermark tracking plus the dedup/order pass applied to every batch.
//!
//! The watermark is split in two. The cursor follows the chronologically last
//! raw entry of each batch, empty ones included, and bounds the next query.
//! The displayed reference follows the last message actually accepted for
//! emission. The cursor never moves backwards in time.

use super::parser::{self, LinkStyle};
use super::source::{BatchOrder, Cursor, CursorKind};
use super::{Message, RawEntry};
use lru::LruCache;
use std::num::NonZeroUsize;

pub struct Merger {
    order: BatchOrder,
    cursor_kind: CursorKind,
    link_style: LinkStyle,
    seen: LruCache<String, ()>,
    cursor: Option<Cursor>,
    displayed: Option<Message>,
}

impl Merger {
    pub fn new(
        order: BatchOrder,
        cursor_kind: CursorKind,
        link_style: LinkStyle,
        seen_capacity: NonZeroUsize,
    ) -> Self {
        Self {
            order,
            cursor_kind,
            link_style,
            seen: LruCache::new(seen_capacity),
            cursor: None,
            displayed: None,
        }
    }

    /// Seeds the cursor and the seen set from the initial batch. Nothing in
    /// it is ever emitted.
    pub fn prime(&mut self, batch: Vec<RawEntry>) {
        let batch = self.oldest_first(batch);
        for raw in &batch {
            self.seen.put(raw.id.clone(), ());
        }
        if let Some(last) = batch.last() {
            self.advance_cursor(candidate_cursor(last));
        }
    }

    /// Runs one batch through the pipeline and returns the messages to emit,
    /// oldest first.
    pub fn merge(&mut self, batch: Vec<RawEntry>) -> Vec<Message> {
        let batch = self.oldest_first(batch);
        let candidate = batch.last().map(candidate_cursor);

        let bound = match self.cursor_kind {
            CursorKind::Timestamp => self.cursor.as_ref().and_then(|c| c.timestamp),
            CursorKind::RemoteId => None,
        };

        let mut survivors: Vec<Message> = Vec::with_capacity(batch.len());
        for raw in &batch {
            let message = parser::parse_entry(raw, self.link_style);
            if !message.is_displayable() {
                continue;
            }
            if let (Some(bound), Some(ts)) = (bound, message.timestamp) {
                if ts <= bound {
                    continue;
                }
            }
            if self.seen.contains(&message.id) {
                continue;
            }
            self.seen.put(message.id.clone(), ());
            survivors.push(message);
        }

        if survivors.iter().all(|m| m.timestamp.is_some()) {
            survivors.sort_by_key(|m| m.timestamp);
        }

        if let Some(candidate) = candidate {
            self.advance_cursor(candidate);
        }
        if let Some(last) = survivors.last() {
            self.displayed = Some(last.clone());
        }

        survivors
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn displayed(&self) -> Option<&Message> {
        self.displayed.as_ref()
    }

    fn oldest_first(&self, mut batch: Vec<RawEntry>) -> Vec<RawEntry> {
        if self.order == BatchOrder::NewestFirst {
            batch.reverse();
        }
        batch
    }

    /// Time never moves backwards. A remote-id backend still takes the newer
    /// id, since its next query is keyed by id alone.
    fn advance_cursor(&mut self, candidate: Cursor) {
        let previous = self.cursor.as_ref().and_then(|c| c.timestamp);
        match (previous, candidate.timestamp) {
            (Some(prev), Some(next)) if next < prev => match self.cursor_kind {
                CursorKind::RemoteId => {
                    self.cursor = Some(Cursor {
                        id: candidate.id,
                        timestamp: Some(prev),
                    });
                }
                CursorKind::Timestamp => {
                    tracing::debug!(
                        candidate = %candidate.id,
                        "Ignoring cursor candidate older than current cursor"
                    );
                }
            },
            (prev, None) => {
                self.cursor = Some(Cursor {
                    id: candidate.id,
                    timestamp: prev,
                });
            }
            _ => self.cursor = Some(candidate),
        }
    }
}

fn candidate_cursor(raw: &RawEntry) -> Cursor {
    Cursor {
        id: raw.id.clone(),
        timestamp: raw.created_at.as_deref().and_then(parser::parse_timestamp),
    }
}
