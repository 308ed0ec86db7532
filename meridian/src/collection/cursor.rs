use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;

use crate::document::{Document, DocumentStore, FeatureId, Filter, FindOptions};
use crate::error::StoreError;

enum Source {
    /// One store query, run on the first call to `next`.
    Direct {
        filter: Filter,
        options: FindOptions,
        started: bool,
    },
    /// One store query per chunk of candidate identifiers.
    Batched {
        filter: Filter,
        options: FindOptions,
        ids: std::vec::IntoIter<FeatureId>,
        batch_size: usize,
        skip: usize,
        remaining: Option<usize>,
    },
}

/// Lazy, single-pass sequence of documents returned by
/// [`FeatureCollection::find_features`](super::FeatureCollection::find_features).
///
/// Documents are fetched from the store in batches as the cursor advances. Each batch reflects the store
/// state at the moment it is fetched; the sequence as a whole is not a snapshot. After an error the cursor
/// is exhausted.
pub struct FeatureCursor {
    store: Arc<dyn DocumentStore>,
    collection: String,
    source: Source,
    buffer: VecDeque<Document>,
    done: bool,
}

impl FeatureCursor {
    pub(crate) fn direct(
        store: Arc<dyn DocumentStore>,
        collection: &str,
        filter: Filter,
        options: FindOptions,
    ) -> Self {
        Self {
            store,
            collection: collection.to_owned(),
            source: Source::Direct {
                filter,
                options,
                started: false,
            },
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// Cursor over the documents matching `filter` among `ids`. Skip and limit of `options` apply to the
    /// whole sequence; the other options are passed to every batch query.
    pub(crate) fn batched(
        store: Arc<dyn DocumentStore>,
        collection: &str,
        filter: Filter,
        options: FindOptions,
        ids: Vec<FeatureId>,
        batch_size: usize,
    ) -> Self {
        let skip = options.skip;
        let remaining = options.limit;
        let options = FindOptions {
            skip: 0,
            limit: None,
            ..options
        };

        Self {
            store,
            collection: collection.to_owned(),
            source: Source::Batched {
                filter,
                options,
                ids: ids.into_iter(),
                batch_size: batch_size.max(1),
                skip,
                remaining,
            },
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// Cursor producing nothing.
    pub(crate) fn empty(store: Arc<dyn DocumentStore>, collection: &str) -> Self {
        Self::batched(
            store,
            collection,
            Filter::All,
            FindOptions::default(),
            vec![],
            1,
        )
    }

    /// Fills the buffer. Returns false when the source is exhausted.
    fn fetch(&mut self) -> Result<bool, StoreError> {
        match &mut self.source {
            Source::Direct {
                filter,
                options,
                started,
            } => {
                if *started {
                    return Ok(false);
                }
                *started = true;
                self.buffer
                    .extend(self.store.find(&self.collection, filter, options)?);
                Ok(true)
            }
            Source::Batched {
                filter,
                options,
                ids,
                batch_size,
                skip,
                remaining,
            } => loop {
                if *remaining == Some(0) {
                    return Ok(false);
                }

                let batch: Vec<FeatureId> = ids.by_ref().take(*batch_size).collect();
                if batch.is_empty() {
                    return Ok(false);
                }

                let batch_filter = filter.clone().and(Filter::id_in(&batch));
                let found = self.store.find(&self.collection, &batch_filter, options)?;
                debug!(
                    "Fetched {} of {} candidates from {}",
                    found.len(),
                    batch.len(),
                    self.collection
                );

                let skipped = found.len().min(*skip);
                *skip -= skipped;
                let mut documents = found.into_iter().skip(skipped);
                match remaining {
                    Some(left) => {
                        let taken: Vec<Document> = documents.by_ref().take(*left).collect();
                        *left -= taken.len();
                        self.buffer.extend(taken);
                    }
                    None => self.buffer.extend(documents),
                }

                if !self.buffer.is_empty() {
                    return Ok(true);
                }
            },
        }
    }
}

impl Iterator for FeatureCursor {
    type Item = Result<Document, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(document) = self.buffer.pop_front() {
                return Some(Ok(document));
            }
            if self.done {
                return None;
            }

            match self.fetch() {
                Ok(true) => continue,
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

impl std::iter::FusedIterator for FeatureCursor {}
