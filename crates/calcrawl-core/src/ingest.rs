use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::Event;
use crate::traits::EventStore;

/// Counters from one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Create the ingestion channel.
///
/// Every strategy gets a clone of the sender; exactly one [`Ingestor`] owns
/// the receiving end and is the only writer of new events.
pub fn channel<S: EventStore>(store: S, capacity: usize) -> (mpsc::Sender<Event>, Ingestor<S>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, Ingestor { store, rx })
}

/// Single consumer that persists events with insert-if-absent semantics.
pub struct Ingestor<S: EventStore> {
    store: S,
    rx: mpsc::Receiver<Event>,
}

impl<S: EventStore> Ingestor<S> {
    /// Drain the channel until every sender is gone or `cancel` fires.
    ///
    /// On cancellation the channel is closed, so further sends fail, and the
    /// events already buffered are still stored.
    pub async fn run(mut self, cancel: CancellationToken) -> IngestReport {
        let mut report = IngestReport::default();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                received = self.rx.recv() => match received {
                    Some(event) => self.persist(event, &mut report).await,
                    None => {
                        tracing::info!(?report, "Ingestion channel drained");
                        return report;
                    }
                },
            }
        }

        self.rx.close();
        while let Some(event) = self.rx.recv().await {
            self.persist(event, &mut report).await;
        }
        tracing::info!(?report, "Ingestion stopped");
        report
    }

    async fn persist(&self, event: Event, report: &mut IngestReport) {
        match self.store.upsert_if_absent(&event).await {
            Ok(true) => {
                report.inserted += 1;
                tracing::info!(event_id = %event.id, name = %event.name, "Event stored");
            }
            Ok(false) => {
                report.duplicates += 1;
                tracing::debug!(event_id = %event.id, "Event already stored");
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(event_id = %event.id, error = %e, "Failed to store event");
            }
        }
    }
}
