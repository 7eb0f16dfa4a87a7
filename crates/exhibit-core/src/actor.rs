//! Single owner task for an [`ExhibitTag`].
//!
//! The radio stack and the NFC hardware raise events independently. Both
//! become [`TagCommand`]s on one queue, and [`TagActor`] applies them in
//! arrival order, so no two handlers ever touch the tag at once and no lock
//! is needed around the URL/payload pair or the visit counter.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::advertising::Advertiser;
use crate::attributes::{AttributeError, AttributeId, ReadWindow, WriteOutcome};
use crate::debounce::MonotonicClock;
use crate::ndef::parse_uri_message;
use crate::nfc::{NfcDriver, NfcError, NfcEvent};
use crate::tag::ExhibitTag;

/// Depth of the command queue.
const COMMAND_QUEUE_DEPTH: usize = 64;

enum TagCommand {
    Read {
        attribute: AttributeId,
        window: ReadWindow,
        reply: oneshot::Sender<Result<Vec<u8>, AttributeError>>,
    },
    Write {
        attribute: AttributeId,
        offset: usize,
        value: Vec<u8>,
        reply: oneshot::Sender<Result<WriteOutcome, AttributeError>>,
    },
    Scan {
        at_ms: u64,
    },
    Snapshot {
        reply: oneshot::Sender<TagSnapshot>,
    },
}

/// Point-in-time view of the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSnapshot {
    /// Stored URL bytes.
    pub url: Vec<u8>,
    /// Visits since the last URL write.
    pub visits: u32,
    /// Advertised device name.
    pub device_name: String,
    /// Whether NFC emulation is running.
    pub emulating: bool,
    /// Message installed in the NFC driver.
    pub served: Vec<u8>,
}

impl TagSnapshot {
    /// The URL readers get when they tap, if any message is installed.
    #[must_use]
    pub fn served_url(&self) -> Option<String> {
        if self.served.is_empty() {
            return None;
        }
        parse_uri_message(&self.served).ok()
    }
}

/// Cloneable handle for sending requests to the tag.
#[derive(Clone)]
pub struct TagHandle {
    tx: mpsc::Sender<TagCommand>,
}

impl TagHandle {
    /// Reads an attribute.
    ///
    /// # Errors
    ///
    /// Returns the attribute's rejection, or [`AttributeError::Unavailable`]
    /// if the actor has stopped.
    pub async fn read(
        &self,
        attribute: AttributeId,
        window: ReadWindow,
    ) -> Result<Vec<u8>, AttributeError> {
        let (reply, rx) = oneshot::channel();
        self.send(TagCommand::Read {
            attribute,
            window,
            reply,
        })
        .await?;
        rx.await.map_err(|_| AttributeError::Unavailable)?
    }

    /// Writes an attribute.
    ///
    /// # Errors
    ///
    /// Returns the attribute's rejection, or [`AttributeError::Unavailable`]
    /// if the actor has stopped.
    pub async fn write(
        &self,
        attribute: AttributeId,
        offset: usize,
        value: Vec<u8>,
    ) -> Result<WriteOutcome, AttributeError> {
        let (reply, rx) = oneshot::channel();
        self.send(TagCommand::Write {
            attribute,
            offset,
            value,
            reply,
        })
        .await?;
        rx.await.map_err(|_| AttributeError::Unavailable)?
    }

    /// Reports a scan event that happened at `at_ms`.
    ///
    /// Never waits, so it is safe from a driver callback. Returns `false`
    /// when the event was dropped because the queue is full or the actor
    /// has stopped.
    pub fn report_scan_at(&self, at_ms: u64) -> bool {
        match self.tx.try_send(TagCommand::Scan { at_ms }) {
            Ok(()) => true,
            Err(err) => {
                warn!(at_ms, %err, "Scan event dropped");
                false
            }
        }
    }

    /// Captures the current state.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::Unavailable`] if the actor has stopped.
    pub async fn snapshot(&self) -> Result<TagSnapshot, AttributeError> {
        let (reply, rx) = oneshot::channel();
        self.send(TagCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| AttributeError::Unavailable)
    }

    async fn send(&self, command: TagCommand) -> Result<(), AttributeError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| AttributeError::Unavailable)
    }
}

/// Runs an [`ExhibitTag`] on its own task.
pub struct TagActor<D, A> {
    tag: ExhibitTag<D, A>,
    rx: mpsc::Receiver<TagCommand>,
}

impl<D, A> TagActor<D, A>
where
    D: NfcDriver + 'static,
    A: Advertiser + 'static,
{
    /// Wires the NFC callback into the queue and spawns the actor.
    ///
    /// The callback only holds a weak sender, so the task ends once every
    /// [`TagHandle`] is dropped.
    ///
    /// # Errors
    ///
    /// Returns the driver error if NFC setup fails.
    pub fn spawn(
        mut tag: ExhibitTag<D, A>,
        clock: MonotonicClock,
    ) -> Result<(TagHandle, JoinHandle<()>), NfcError> {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);

        let weak = tx.downgrade();
        tag.setup_nfc(Box::new(move |event: NfcEvent| {
            if !event.is_scan() {
                return;
            }
            let Some(tx) = weak.upgrade() else {
                return;
            };
            let at_ms = clock.now_ms();
            if tx.try_send(TagCommand::Scan { at_ms }).is_err() {
                warn!(?event, at_ms, "Scan event dropped");
            }
        }))?;

        let actor = Self { tag, rx };
        let task = tokio::spawn(actor.run());
        Ok((TagHandle { tx }, task))
    }

    async fn run(mut self) {
        info!("Exhibit tag running");
        while let Some(command) = self.rx.recv().await {
            self.handle(command).await;
        }
        info!("Exhibit tag stopped");
    }

    async fn handle(&mut self, command: TagCommand) {
        match command {
            TagCommand::Read {
                attribute,
                window,
                reply,
            } => {
                let _ = reply.send(self.tag.read(attribute, window));
            }
            TagCommand::Write {
                attribute,
                offset,
                value,
                reply,
            } => {
                let result = self.tag.write(attribute, offset, &value).await;
                let _ = reply.send(result);
            }
            TagCommand::Scan { at_ms } => {
                let outcome = self.tag.on_scan_event(at_ms);
                debug!(at_ms, ?outcome, "Scan event handled");
            }
            TagCommand::Snapshot { reply } => {
                let _ = reply.send(TagSnapshot {
                    url: self.tag.store().url().as_bytes().to_vec(),
                    visits: self.tag.store().visits(),
                    device_name: self.tag.store().device_name().advertised().to_string(),
                    emulating: self.tag.is_emulating(),
                    served: self.tag.served_payload().as_bytes().to_vec(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advertising::MockAdvertiser;
    use crate::nfc::{SimulatedField, SimulatedTag};
    use crate::tag::TagSettings;

    fn spawn() -> (TagHandle, SimulatedField, JoinHandle<()>) {
        let driver = SimulatedTag::new();
        let field = driver.field();
        let tag = ExhibitTag::new(TagSettings::default(), driver, MockAdvertiser::new());
        let (handle, task) = TagActor::spawn(tag, MonotonicClock::start()).unwrap();
        (handle, field, task)
    }

    #[tokio::test]
    async fn test_snapshot_reflects_writes() {
        let (handle, _, _task) = spawn();
        handle
            .write(AttributeId::Url, 0, b"http://example.com".to_vec())
            .await
            .unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.url, b"http://example.com");
        assert!(snapshot.emulating);
        assert_eq!(snapshot.served_url().as_deref(), Some("http://example.com"));
        assert_eq!(snapshot.device_name, "MuseumGuide");
    }

    #[tokio::test]
    async fn test_tap_burst_counts_one_visit() {
        let (handle, field, _task) = spawn();
        handle
            .write(AttributeId::Url, 0, b"http://example.com".to_vec())
            .await
            .unwrap();
        assert!(field.tap().is_some());

        let count = handle
            .read(AttributeId::VisitCount, ReadWindow::FULL)
            .await
            .unwrap();
        assert_eq!(count, [0, 0, 0, 1]);
    }

    #[tokio::test]
    async fn test_rewrite_while_emulating_counts_no_visit() {
        let (handle, field, _task) = spawn();
        for url in ["http://old.example", "http://new.example"] {
            handle
                .write(AttributeId::Url, 0, url.as_bytes().to_vec())
                .await
                .unwrap();
        }
        assert!(field.is_emulating());

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.visits, 0);
    }

    #[tokio::test]
    async fn test_scans_beyond_queue_depth_are_dropped() {
        let (handle, _field, _task) = spawn();

        // The actor cannot drain until this task yields.
        let depth = u32::try_from(COMMAND_QUEUE_DEPTH).unwrap();
        let at_ms = |i: u32| u64::from(i) * 5_000;
        for i in 0..depth {
            assert!(handle.report_scan_at(at_ms(i)));
        }
        assert!(!handle.report_scan_at(at_ms(depth)));

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.visits, depth);
    }

    #[tokio::test]
    async fn test_actor_stops_when_handles_drop() {
        let (handle, _field, task) = spawn();
        let reader = handle.clone();
        drop(handle);
        drop(reader);
        // Only the driver callback's weak sender is left.
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_snapshot_has_no_served_url() {
        let (handle, _, _task) = spawn();
        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.served_url().is_none());
        assert!(!snapshot.emulating);
    }
}
