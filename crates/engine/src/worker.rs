//! Background jobs for the slow operations. Each job streams ordered
//! `(percent, message)` events and ends with one result.

use crate::{ApplyOutcome, FingerprintService};
use janus_backup::{BackupInfo, BackupScope};
use janus_core::{CancelToken, ChangeSet, Error, FingerprintSnapshot, Result};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub type Progress = (u8, String);

pub struct Job<T> {
    events: Receiver<Progress>,
    handle: JoinHandle<Result<T>>,
    cancel: CancelToken,
}

/// Clamps percentages so the stream never goes backwards.
struct Reporter {
    tx: Sender<Progress>,
    last: u8,
}

impl Reporter {
    fn report(&mut self, percent: u8, message: &str) {
        let percent = percent.min(100).max(self.last);
        self.last = percent;
        // a dropped receiver only means nobody is watching
        let _ = self.tx.send((percent, message.to_string()));
    }
}

impl<T: Send + 'static> Job<T> {
    pub fn spawn<F>(name: &str, work: F) -> Result<Self>
    where
        F: FnOnce(&CancelToken, &mut dyn FnMut(u8, &str)) -> Result<T> + Send + 'static,
    {
        let (tx, events) = mpsc::channel();
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let handle = thread::Builder::new()
            .name(format!("janus-{name}"))
            .spawn(move || {
                let mut reporter = Reporter { tx, last: 0 };
                let result = work(&token, &mut |percent: u8, message: &str| reporter.report(percent, message));
                if result.is_ok() && reporter.last < 100 {
                    reporter.report(100, "done");
                }
                result
            })?;
        Ok(Self {
            events,
            handle,
            cancel,
        })
    }

    /// Best effort; see `FingerprintEngine::modify_mac`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Events produced so far, without blocking.
    pub fn poll(&self) -> Vec<Progress> {
        self.events.try_iter().collect()
    }

    /// Blocks until the job ends, handing every remaining event to `on_progress`.
    pub fn wait_with(self, mut on_progress: impl FnMut(u8, &str)) -> Result<T> {
        for (percent, message) in self.events.iter() {
            on_progress(percent, &message);
        }
        self.handle
            .join()
            .map_err(|_| Error::Operation("worker thread panicked".to_string()))?
    }

    pub fn wait(self) -> Result<T> {
        self.wait_with(|_, _| {})
    }
}

pub fn spawn_snapshot(service: Arc<FingerprintService>) -> Result<Job<FingerprintSnapshot>> {
    Job::spawn("snapshot", move |cancel, progress| {
        progress(10, "reading fingerprint");
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        service.snapshot()
    })
}

pub fn spawn_backup(
    service: Arc<FingerprintService>,
    scope: BackupScope,
    description: String,
) -> Result<Job<BackupInfo>> {
    Job::spawn("backup", move |cancel, progress| {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        service
            .backups()
            .create_backup_with(&scope, &description, progress)
    })
}

pub fn spawn_apply(service: Arc<FingerprintService>, changes: ChangeSet) -> Result<Job<ApplyOutcome>> {
    Job::spawn("apply", move |cancel, progress| {
        service.apply_changes(&changes, cancel, progress)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_monotonic_and_finish_at_100() {
        let job = Job::spawn("test", |_, progress| {
            progress(40, "half");
            progress(20, "late report");
            progress(90, "almost");
            Ok(7)
        })
        .unwrap();
        let mut seen = Vec::new();
        let value = job.wait_with(|p, _| seen.push(p)).unwrap();
        assert_eq!(value, 7);
        assert_eq!(seen, vec![40, 40, 90, 100]);
    }

    #[test]
    fn failure_does_not_claim_completion() {
        let job: Job<()> = Job::spawn("test", |_, progress| {
            progress(10, "start");
            Err(Error::Operation("boom".to_string()))
        })
        .unwrap();
        let mut last = 0;
        assert!(job.wait_with(|p, _| last = p).is_err());
        assert_eq!(last, 10);
    }

    #[test]
    fn cancel_reaches_the_worker() {
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let job: Job<()> = Job::spawn("test", move |cancel, _| {
            let _ = go_rx.recv();
            if cancel.is_cancelled() {
                Err(Error::Cancelled)
            } else {
                Ok(())
            }
        })
        .unwrap();
        job.cancel();
        go_tx.send(()).unwrap();
        assert!(matches!(job.wait(), Err(Error::Cancelled)));
    }
}
