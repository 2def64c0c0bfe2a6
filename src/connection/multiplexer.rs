//! Pipelined Reply Multiplexer
//!
//! Every connection runs two tasks:
//!
//! ```text
//!  callers ── submit ──> [ submit lock ]
//!                          │ InFlight { decoder, reply } ──> inflight ──┐
//!                          │ request line                ──> outbound ──┼──> writer task ──> socket
//!                                                                       │
//!  socket ──> reader task ──> lines ──> pending FIFO <──────────────────┘
//!                                         │ head decoder complete
//!                                         ▼
//!                                   oneshot ──> caller's Pending
//! ```
//!
//! Both channels are filled under one lock, so the Nth request line written
//! is always matched with the Nth decoder queued. The pending queue is owned
//! by the reader task alone.
//!
//! Each reply line goes to the decoder at the head of the queue. The head is
//! popped once its reply is complete (or has failed) and the caller's
//! oneshot is completed. Block replies keep the head in place until `END`.
//!
//! When the connection ends for any reason, every outstanding command is
//! failed with `ConnectionLost`, oldest first.

use crate::connection::stats::ConnectionStats;
use crate::error::{BloomdError, Result};
use crate::protocol::{Decoded, Decoder, LineReader, Response};
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, trace, warn};

/// Initial inbound buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Completion side of a command's pending result.
pub(crate) type ReplySender = oneshot::Sender<Result<Response>>;

/// A command that has been written (or is about to be) and awaits its reply.
#[derive(Debug)]
pub(crate) struct InFlight {
    pub(crate) command: &'static str,
    pub(crate) decoder: Decoder,
    pub(crate) reply: ReplySender,
}

/// State shared between a connection's client handle and its tasks.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) id: u64,
    pub(crate) peer: String,
    pub(crate) stats: ConnectionStats,
    connected: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Marks the connection unusable and stops both tasks.
    pub(crate) fn shutdown(&self) {
        self.connected.store(false, Ordering::Release);
        self.shutdown.send_replace(true);
    }
}

/// Submission ends of a freshly spawned connection.
pub(crate) struct Channels {
    pub(crate) shared: Arc<Shared>,
    pub(crate) inflight: mpsc::UnboundedSender<InFlight>,
    pub(crate) outbound: mpsc::UnboundedSender<Bytes>,
}

/// Splits `stream` and spawns its reader and writer tasks.
///
/// Must be called from within a Tokio runtime.
pub(crate) fn spawn<S>(stream: S, id: u64, peer: String) -> Channels
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (inflight_tx, inflight_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let shared = Arc::new(Shared {
        id,
        peer,
        stats: ConnectionStats::new(),
        connected: AtomicBool::new(true),
        shutdown: shutdown_tx,
    });

    let mux = Multiplexer::new(inflight_rx, Arc::clone(&shared));
    tokio::spawn(run_reader(read_half, mux, shutdown_rx.clone()));
    tokio::spawn(run_writer(
        write_half,
        outbound_rx,
        Arc::clone(&shared),
        shutdown_rx,
    ));

    debug!(conn = id, peer = %shared.peer, "Connection tasks started");

    Channels {
        shared,
        inflight: inflight_tx,
        outbound: outbound_tx,
    }
}

/// The decode queue of one connection.
pub(crate) struct Multiplexer {
    pending: VecDeque<InFlight>,
    incoming: mpsc::UnboundedReceiver<InFlight>,
    lines: LineReader,
    shared: Arc<Shared>,
}

impl Multiplexer {
    pub(crate) fn new(incoming: mpsc::UnboundedReceiver<InFlight>, shared: Arc<Shared>) -> Self {
        Self {
            pending: VecDeque::new(),
            incoming,
            lines: LineReader::new(),
            shared,
        }
    }

    /// Number of commands waiting for (the rest of) their reply.
    #[cfg(test)]
    fn outstanding(&mut self) -> usize {
        self.absorb();
        self.pending.len()
    }

    /// Feeds every complete line in `buffer` to the queue.
    ///
    /// An error means the connection can no longer be trusted.
    fn drain(&mut self, buffer: &mut BytesMut) -> Result<()> {
        while let Some(line) = self.lines.next_line(buffer)? {
            self.on_line(&line)?;
        }
        Ok(())
    }

    /// Hands one reply line to the decoder at the head of the queue.
    ///
    /// Returns an error only when the reply stream is out of sync with the
    /// queue; the caller must then drop the connection.
    pub(crate) fn on_line(&mut self, line: &str) -> Result<()> {
        self.absorb();

        let Some(head) = self.pending.front_mut() else {
            return Err(BloomdError::Desync(line.to_string()));
        };

        trace!(conn = self.shared.id, command = head.command, line, "Reply line");

        match head.decoder.decode(line) {
            Decoded::Partial => Ok(()),
            Decoded::Complete(response) => {
                self.finish(Ok(response));
                Ok(())
            }
            Decoded::Failed(err) => {
                debug!(conn = self.shared.id, error = %err, "Command failed");
                self.finish(Err(err));
                Ok(())
            }
            Decoded::Corrupt(err) => {
                let reason = format!("reply stream out of sync: {}", err);
                self.finish(Err(err));
                Err(BloomdError::protocol(reason))
            }
        }
    }

    /// Fails every outstanding command, oldest first, and refuses new ones.
    pub(crate) fn fail_all(&mut self, reason: &str) {
        self.incoming.close();
        self.absorb();

        let outstanding = self.pending.len();
        for inflight in self.pending.drain(..) {
            let _ = inflight
                .reply
                .send(Err(BloomdError::ConnectionLost(reason.to_string())));
        }

        if outstanding > 0 {
            warn!(
                conn = self.shared.id,
                peer = %self.shared.peer,
                outstanding,
                reason,
                "Failed outstanding commands"
            );
        }
    }

    fn finish(&mut self, outcome: Result<Response>) {
        if let Some(done) = self.pending.pop_front() {
            self.shared.stats.reply_received();
            if done.reply.send(outcome).is_err() {
                trace!(
                    conn = self.shared.id,
                    command = done.command,
                    "Reply discarded, caller stopped waiting"
                );
            }
        }
    }

    /// Moves newly submitted commands into the pending queue.
    fn absorb(&mut self) {
        while let Ok(inflight) = self.incoming.try_recv() {
            self.pending.push_back(inflight);
        }
    }
}

async fn run_reader<R>(mut reader: R, mut mux: Multiplexer, mut shutdown: watch::Receiver<bool>)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(INITIAL_BUFFER_SIZE);

    let reason = loop {
        if let Err(err) = mux.drain(&mut buffer) {
            error!(
                conn = mux.shared.id,
                peer = %mux.shared.peer,
                error = %err,
                "Dropping connection"
            );
            break err.to_string();
        }

        if buffer.capacity() - buffer.len() < 1024 {
            buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        tokio::select! {
            _ = shutdown.changed() => break "connection shut down".to_string(),
            read = reader.read_buf(&mut buffer) => match read {
                Ok(0) if buffer.is_empty() => break "connection closed by server".to_string(),
                Ok(0) => break "connection closed in the middle of a reply".to_string(),
                Ok(n) => {
                    mux.shared.stats.bytes_read(n);
                    trace!(conn = mux.shared.id, bytes = n, "Read data");
                }
                Err(e) => break format!("read failed: {}", e),
            }
        }
    };

    debug!(conn = mux.shared.id, peer = %mux.shared.peer, reason = %reason, "Reader stopped");
    mux.shared.shutdown();
    mux.fail_all(&reason);
}

async fn run_writer<W>(
    writer: W,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            next = outbound.recv() => match next {
                Some(line) => {
                    if let Err(e) = write_batch(&mut writer, line, &mut outbound, &shared.stats).await {
                        warn!(conn = shared.id, peer = %shared.peer, error = %e, "Write failed");
                        shared.shutdown();
                        break;
                    }
                }
                None => {
                    debug!(conn = shared.id, "All client handles dropped, closing write side");
                    break;
                }
            }
        }
    }

    let _ = writer.shutdown().await;
}

/// Writes `first` plus everything already queued behind it, then flushes once.
async fn write_batch<W>(
    writer: &mut BufWriter<W>,
    first: Bytes,
    outbound: &mut mpsc::UnboundedReceiver<Bytes>,
    stats: &ConnectionStats,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut written = first.len();
    writer.write_all(&first).await?;

    while let Ok(line) = outbound.try_recv() {
        written += line.len();
        writer.write_all(&line).await?;
    }

    writer.flush().await?;
    stats.bytes_written(written);
    trace!(bytes = written, "Flushed requests");
    Ok(())
}
