//! Live update channel: a subscription feed of incremental graph mutations
//! pushed by the backend, tagged with monotonically increasing sequence
//! numbers. The transport is newline-delimited JSON over a persistent HTTP
//! response, read on a background thread that reconnects with capped
//! backoff; the UI thread drains messages with `try_recv` each frame.

use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context as _, bail};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::model::{Edge, EdgeKey, Node};

/// One discrete mutation, as sent on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphChange {
    UpsertNode {
        node: Node,
        #[serde(default)]
        clear_pin: bool,
    },
    UpsertEdge {
        edge: Edge,
    },
    RemoveNode {
        id: String,
    },
    RemoveEdge {
        key: EdgeKey,
    },
    SnapshotInvalidated,
}

/// A change plus its sequence number. Delivery order across reconnects is
/// not guaranteed to match causal order; the merge engine uses `seq` to
/// discard stale updates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiveEvent {
    pub seq: u64,
    #[serde(flatten)]
    pub change: GraphChange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

#[derive(Clone, Debug)]
pub enum ChannelMessage {
    Event(LiveEvent),
    Status(ConnectionStatus),
}

/// Shared stop flag for a subscription. `unsubscribe` is idempotent and
/// halts delivery immediately; it does not undo already-applied events.
#[derive(Clone)]
pub struct LiveHandle {
    stop: Arc<AtomicBool>,
}

impl LiveHandle {
    fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn unsubscribe(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Receiving side of a subscription, owned by the UI thread.
pub struct LiveChannel {
    rx: Receiver<ChannelMessage>,
    handle: LiveHandle,
}

impl LiveChannel {
    /// Subscribe to the NDJSON event stream at `url`.
    pub fn connect_http(url: String) -> Self {
        let (tx, rx) = mpsc::channel();
        let handle = LiveHandle::new();
        let worker_handle = handle.clone();

        thread::spawn(move || run_http_reader(&url, &tx, &worker_handle));

        Self { rx, handle }
    }

    /// Channel over an externally produced feed; used by the sample mode
    /// and by tests.
    pub fn from_parts() -> (Sender<ChannelMessage>, Self) {
        let (tx, rx) = mpsc::channel();
        (
            tx,
            Self {
                rx,
                handle: LiveHandle::new(),
            },
        )
    }

    pub fn handle(&self) -> LiveHandle {
        self.handle.clone()
    }

    pub fn unsubscribe(&self) {
        self.handle.unsubscribe();
    }

    /// Drain everything queued since the last frame. Returns nothing once
    /// unsubscribed, so delivery stops immediately even if the worker is
    /// still winding down.
    pub fn poll(&self) -> Vec<ChannelMessage> {
        if self.handle.is_stopped() {
            // Drop whatever is queued; the subscription is over.
            while self.rx.try_recv().is_ok() {}
            return Vec::new();
        }

        let mut drained = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(message) => drained.push(message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        drained
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

fn run_http_reader(url: &str, tx: &Sender<ChannelMessage>, handle: &LiveHandle) {
    // No overall request timeout; the subscription response stays open for
    // as long as the backend keeps pushing events.
    let client = match reqwest::blocking::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(None)
        .build()
    {
        Ok(client) => client,
        Err(error) => {
            warn!("live channel: failed to build http client: {error}");
            let _ = tx.send(ChannelMessage::Status(ConnectionStatus::Disconnected));
            return;
        }
    };

    let mut backoff = INITIAL_BACKOFF;
    while !handle.is_stopped() {
        match connect_stream(&client, url) {
            Ok(reader) => {
                info!("live channel connected to {url}");
                backoff = INITIAL_BACKOFF;
                if tx
                    .send(ChannelMessage::Status(ConnectionStatus::Connected))
                    .is_err()
                {
                    return;
                }

                for line in reader.lines() {
                    if handle.is_stopped() {
                        return;
                    }
                    let line = match line {
                        Ok(line) => line,
                        Err(error) => {
                            warn!("live channel read error: {error}");
                            break;
                        }
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<LiveEvent>(&line) {
                        Ok(event) => {
                            if tx.send(ChannelMessage::Event(event)).is_err() {
                                return;
                            }
                        }
                        Err(error) => warn!("live channel: undecodable event skipped: {error}"),
                    }
                }
            }
            Err(error) => {
                warn!("live channel: {error:#}");
            }
        }

        if handle.is_stopped() {
            return;
        }
        if tx
            .send(ChannelMessage::Status(ConnectionStatus::Disconnected))
            .is_err()
        {
            return;
        }

        // Reconnect with capped exponential backoff, waking early on stop.
        let mut waited = Duration::ZERO;
        while waited < backoff && !handle.is_stopped() {
            let slice = Duration::from_millis(100).min(backoff - waited);
            thread::sleep(slice);
            waited += slice;
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

fn connect_stream(
    client: &reqwest::blocking::Client,
    url: &str,
) -> anyhow::Result<BufReader<reqwest::blocking::Response>> {
    let response = client
        .get(url)
        .send()
        .with_context(|| format!("connecting to {url}"))?;
    if !response.status().is_success() {
        bail!("subscription endpoint returned {}", response.status());
    }
    Ok(BufReader::new(response))
}

/// Spawn a scripted feed that emits `events` with a fixed delay between
/// them. Backs the offline sample mode so the merge path sees real
/// asynchronous traffic.
pub fn spawn_scripted_feed(events: Vec<LiveEvent>, delay: Duration) -> LiveChannel {
    let (tx, channel) = LiveChannel::from_parts();
    let handle = channel.handle();

    thread::spawn(move || {
        if tx
            .send(ChannelMessage::Status(ConnectionStatus::Connected))
            .is_err()
        {
            return;
        }
        for event in events {
            let mut waited = Duration::ZERO;
            while waited < delay && !handle.is_stopped() {
                let slice = Duration::from_millis(50).min(delay - waited);
                thread::sleep(slice);
                waited += slice;
            }
            if handle.is_stopped() {
                return;
            }
            if tx.send(ChannelMessage::Event(event)).is_err() {
                return;
            }
        }
    });

    channel
}
