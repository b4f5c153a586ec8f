use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;

/// A unit of periodic work.
pub trait Job: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Perform one tick at startup instead of waiting a full interval.
    fn run_immediately(&self) -> bool {
        false
    }

    fn perform(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Events emitted by the scheduler for monitoring/logging.
#[derive(Debug, Clone)]
pub enum SchedulerEvent<'a> {
    Started {
        job: &'a str,
        interval: Duration,
    },
    Tick {
        job: &'a str,
    },
    TickCompleted {
        job: &'a str,
        elapsed: Duration,
    },
    TickFailed {
        job: &'a str,
        error: &'a str,
    },
    Restarting {
        job: &'a str,
        reason: &'a str,
    },
    Stopped {
        job: &'a str,
    },
}

/// Trait for receiving scheduler events (decoupled logging).
pub trait SchedulerReporter: Send + Sync {
    fn report(&self, event: SchedulerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSchedulerReporter;

impl SchedulerReporter for TracingSchedulerReporter {
    fn report(&self, event: SchedulerEvent<'_>) {
        match event {
            SchedulerEvent::Started { job, interval } => {
                tracing::info!(%job, interval_secs = interval.as_secs(), "Job scheduled");
            }
            SchedulerEvent::Tick { job } => {
                tracing::info!(%job, "Job tick");
            }
            SchedulerEvent::TickCompleted { job, elapsed } => {
                tracing::info!(%job, elapsed_ms = elapsed.as_millis() as u64, "Job tick completed");
            }
            SchedulerEvent::TickFailed { job, error } => {
                tracing::error!(%job, %error, "Job tick failed");
            }
            SchedulerEvent::Restarting { job, reason } => {
                tracing::error!(%job, %reason, "Job panicked, restarting");
            }
            SchedulerEvent::Stopped { job } => {
                tracing::info!(%job, "Job stopped");
            }
        }
    }
}

/// Runs each job in its own supervised task until cancelled.
pub struct Scheduler<R: SchedulerReporter = TracingSchedulerReporter> {
    tasks: JoinSet<()>,
    cancel: CancellationToken,
    reporter: Arc<R>,
}

impl Scheduler<TracingSchedulerReporter> {
    pub fn new(cancel: CancellationToken) -> Self {
        Self::with_reporter(cancel, TracingSchedulerReporter)
    }
}

impl<R: SchedulerReporter + 'static> Scheduler<R> {
    pub fn with_reporter(cancel: CancellationToken, reporter: R) -> Self {
        Self {
            tasks: JoinSet::new(),
            cancel,
            reporter: Arc::new(reporter),
        }
    }

    /// Start supervising `job`, ticking every `interval`.
    pub fn spawn<J: Job>(&mut self, job: Arc<J>, interval: Duration) {
        let interval = interval.max(Duration::from_millis(1));
        self.tasks.spawn(supervise(
            job,
            interval,
            self.cancel.clone(),
            Arc::clone(&self.reporter),
        ));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait until every supervisor has exited (after cancellation).
    pub async fn join(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Supervisor task failed");
            }
        }
    }
}

/// Keep a job's tick loop alive: a panic restarts it, cancellation ends it.
async fn supervise<J, R>(
    job: Arc<J>,
    interval: Duration,
    cancel: CancellationToken,
    reporter: Arc<R>,
) where
    J: Job,
    R: SchedulerReporter + 'static,
{
    reporter.report(SchedulerEvent::Started {
        job: job.name(),
        interval,
    });

    loop {
        let handle = tokio::spawn(tick_loop(
            Arc::clone(&job),
            interval,
            cancel.clone(),
            Arc::clone(&reporter),
        ));

        match handle.await {
            Ok(()) => break,
            Err(e) if e.is_panic() && !cancel.is_cancelled() => {
                let reason = panic_message(e);
                reporter.report(SchedulerEvent::Restarting {
                    job: job.name(),
                    reason: &reason,
                });
            }
            Err(e) => {
                tracing::debug!(job = %job.name(), error = %e, "Tick loop ended");
                break;
            }
        }
    }

    reporter.report(SchedulerEvent::Stopped { job: job.name() });
}

async fn tick_loop<J, R>(
    job: Arc<J>,
    interval: Duration,
    cancel: CancellationToken,
    reporter: Arc<R>,
) where
    J: Job,
    R: SchedulerReporter,
{
    let first = if job.run_immediately() {
        Instant::now()
    } else {
        Instant::now() + interval
    };
    let mut ticker = tokio::time::interval_at(first, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        reporter.report(SchedulerEvent::Tick { job: job.name() });
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = job.perform(&cancel) => result,
        };

        match result {
            Ok(()) => reporter.report(SchedulerEvent::TickCompleted {
                job: job.name(),
                elapsed: started.elapsed(),
            }),
            Err(AppError::Cancelled) => return,
            Err(e) => {
                let error = e.to_string();
                reporter.report(SchedulerEvent::TickFailed {
                    job: job.name(),
                    error: &error,
                });
            }
        }
    }
}

fn panic_message(error: JoinError) -> String {
    let payload: Box<dyn Any + Send> = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
