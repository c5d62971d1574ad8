//! Batch stream with look-ahead, so that classification can sample rows
//! before reconciliation consumes them.

use std::collections::VecDeque;
use tokio::sync::mpsc;

use crate::core::{Batch, Row};
use crate::error::Result;

pub struct BatchStream {
    rx: mpsc::Receiver<Result<Batch>>,
    buffered: VecDeque<Batch>,
    finished: bool,
}

impl BatchStream {
    pub fn new(rx: mpsc::Receiver<Result<Batch>>) -> Self {
        Self {
            rx,
            buffered: VecDeque::new(),
            finished: false,
        }
    }

    /// Next batch, or `None` once the stream is exhausted.
    ///
    /// A batch marked `is_last` ends the stream even if the sender is still
    /// alive.
    pub async fn next_batch(&mut self) -> Option<Result<Batch>> {
        if let Some(batch) = self.buffered.pop_front() {
            return Some(Ok(batch));
        }
        if self.finished {
            return None;
        }
        match self.rx.recv().await {
            Some(Ok(batch)) => {
                if batch.is_last {
                    self.finished = true;
                }
                Some(Ok(batch))
            }
            Some(Err(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            None => {
                self.finished = true;
                None
            }
        }
    }

    /// Copy up to `n` leading rows without consuming them.
    ///
    /// Pulls whole batches into the look-ahead buffer until `n` rows are
    /// available or the stream ends.
    pub async fn peek_rows(&mut self, n: usize) -> Result<Vec<Row>> {
        let mut available: usize = self.buffered.iter().map(Batch::len).sum();
        while available < n && !self.finished {
            match self.rx.recv().await {
                Some(Ok(batch)) => {
                    if batch.is_last {
                        self.finished = true;
                    }
                    available += batch.len();
                    self.buffered.push_back(batch);
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(e);
                }
                None => self.finished = true,
            }
        }

        Ok(self
            .buffered
            .iter()
            .flat_map(|b| b.rows.iter())
            .take(n)
            .cloned()
            .collect())
    }
}
