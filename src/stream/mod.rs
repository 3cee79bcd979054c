//! Realtime Stream Controller.
//!
//! A session pairs a [`Feed`] with one client connection. Two activities run
//! side by side for the lifetime of the connection:
//!
//! - an inbound watcher task that drains client frames and ignores their
//!   content; the first read error or end of stream closes a one-shot signal;
//! - a tick loop that, once per period, asks the feed for a frame and writes
//!   it to the [`FrameSink`].
//!
//! Ticks never overlap. The session ends on client disconnect (silently) or
//! on the first feed or transmit failure (with a best-effort close frame).

mod feed;
mod socket;

pub use feed::{Feed, HeartbeatFeed, PositionFeed};
pub use socket::serve_socket;

use chrono::Local;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SessionSettings;
use crate::error::StreamError;

/// Reason carried by the close frame sent after a failure.
pub const INTERNAL_ERROR_REASON: &str = "internal error";

/// Outbound half of a client connection.
#[async_trait::async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), axum::Error>;

    /// Sends a protocol close frame signalling a server-side error.
    async fn close_with_error(&mut self, reason: &str) -> Result<(), axum::Error>;
}

/// How a session terminated.
#[derive(Debug)]
pub enum SessionEnd {
    /// The client went away. Not an error.
    ClientDisconnected,
    Failed(StreamError),
}

/// Streams `feed` to one client until it disconnects or something fails.
///
/// Never panics or errors past this boundary; the outcome is returned and
/// logged. The inbound half is moved into its own task and aborted when the
/// tick loop stops.
#[tracing::instrument(skip_all, fields(feed = feed.name()))]
pub async fn run_session<F, S, R, M, E>(
    feed: &F,
    settings: SessionSettings,
    mut sink: S,
    inbound: R,
) -> SessionEnd
where
    F: Feed + ?Sized,
    S: FrameSink,
    R: Stream<Item = Result<M, E>> + Send + 'static,
    M: Send + 'static,
    E: Display + Send + 'static,
{
    let (done_tx, mut done_rx) = oneshot::channel::<()>();
    let watcher = tokio::spawn(watch_inbound(inbound, done_tx));

    info!(period_ms = settings.period.as_millis() as u64, "Session streaming");
    let end = tick_loop(feed, settings, &mut sink, &mut done_rx).await;
    watcher.abort();

    match &end {
        SessionEnd::ClientDisconnected => info!("Client disconnected"),
        SessionEnd::Failed(err) => {
            warn!(error = %err, "Session failed, closing connection");
            match time::timeout(settings.send_timeout, sink.close_with_error(INTERNAL_ERROR_REASON))
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "Close frame not delivered"),
                Err(_) => debug!("Close frame timed out"),
            }
        }
    }

    end
}

/// Reads until the client stops talking. Dropping `done` is the signal.
async fn watch_inbound<R, M, E>(inbound: R, done: oneshot::Sender<()>)
where
    R: Stream<Item = Result<M, E>>,
    E: Display,
{
    let mut inbound = std::pin::pin!(inbound);
    loop {
        match inbound.next().await {
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                debug!(error = %err, "Inbound read failed");
                break;
            }
            None => {
                debug!("Inbound stream ended");
                break;
            }
        }
    }
    drop(done);
}

async fn tick_loop<F, S>(
    feed: &F,
    settings: SessionSettings,
    sink: &mut S,
    done: &mut oneshot::Receiver<()>,
) -> SessionEnd
where
    F: Feed + ?Sized,
    S: FrameSink,
{
    let mut ticker = time::interval_at(Instant::now() + settings.period, settings.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = &mut *done => return SessionEnd::ClientDisconnected,
            _ = ticker.tick() => {}
        }
        tick += 1;

        let frame = match feed.frame(Local::now()).await {
            Ok(frame) => frame,
            Err(err) => return SessionEnd::Failed(err),
        };

        if let Err(err) = send_frame(sink, frame, settings.send_timeout).await {
            return SessionEnd::Failed(err);
        }
        debug!(tick, "Frame sent");
    }
}

async fn send_frame<S: FrameSink>(
    sink: &mut S,
    frame: String,
    limit: Duration,
) -> Result<(), StreamError> {
    match time::timeout(limit, sink.send_text(frame)).await {
        Ok(result) => result.map_err(StreamError::from),
        Err(_) => Err(StreamError::SendTimeout(limit)),
    }
}
