use std::time::Duration;

use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle};

use crate::validation::ValidationTicket;

/// Delays whole-form validation until input has been quiet for `delay`.
///
/// Each `schedule` aborts the previous timer, so at most one ticket is ever
/// waiting. A ticket that still slips through after a newer `set_value` is
/// rejected by [`crate::validation::FieldValidationEngine::apply_full_validation`].
pub struct Debouncer {
    delay: Duration,
    tx: mpsc::UnboundedSender<ValidationTicket>,
    rx: mpsc::UnboundedReceiver<ValidationTicket>,
    task: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            delay,
            tx,
            rx,
            task: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Restarts the quiet period for `ticket`. Outside a tokio runtime nothing
    /// is spawned and the ticket stays pending until flushed by the caller.
    pub fn schedule(&mut self, ticket: ValidationTicket) {
        self.cancel();
        let Ok(handle) = Handle::try_current() else {
            return;
        };
        let tx = self.tx.clone();
        let delay = self.delay;
        self.task = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ticket);
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Waits for the next ticket whose quiet period has elapsed.
    pub async fn next_due(&mut self) -> Option<ValidationTicket> {
        self.rx.recv().await
    }

    /// Latest due ticket, if any, without waiting.
    pub fn try_due(&mut self) -> Option<ValidationTicket> {
        let mut latest = None;
        while let Ok(ticket) = self.rx.try_recv() {
            latest = Some(ticket);
        }
        latest
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
