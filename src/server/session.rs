//! Duplex streaming session: raw frames in, annotated frames out

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument};

use crate::capture::{codec, TimestampedFrame};
use crate::pipeline::{FrameBuffer, OutputBuffer};
use crate::server::gate::ResumeGate;
use crate::{MonotonicClock, RelayError, Result, SessionConfig};

/// Lifecycle of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Closing,
    Closed,
}

/// Message read from the peer, transport-agnostic
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// One encoded image
    Frame(Bytes),
    /// Peer asked to close
    Close,
    /// Text, ping, pong
    Ignored,
}

/// Which path ended the session first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPath {
    Ingress,
    Egress,
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub staleness_secs: f64,
    pub egress_period: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            staleness_secs: config.staleness_secs,
            egress_period: config.egress_period(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

/// Shared handles a session needs
#[derive(Clone)]
pub struct SessionContext {
    pub frames: Arc<FrameBuffer>,
    pub output: Arc<OutputBuffer>,
    pub clock: MonotonicClock,
    pub settings: SessionSettings,
    /// Flips to true when the process is shutting down
    pub shutdown: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct SessionReport {
    pub state: SessionState,
    pub ended_by: SessionPath,
    pub error: Option<RelayError>,
}

/// What egress should do with the current newest annotated frame
#[derive(Debug, Clone, PartialEq)]
pub enum EgressDecision {
    Send(Bytes),
    /// Newest frame is stale: close the gate and wait for new input
    Pause,
    /// Nothing annotated yet
    Wait,
}

/// Send only frames strictly younger than the staleness threshold
pub fn egress_decision(latest: Option<&TimestampedFrame>, now: f64, staleness_secs: f64) -> EgressDecision {
    match latest {
        None => EgressDecision::Wait,
        Some(frame) if now - frame.timestamp < staleness_secs => {
            EgressDecision::Send(frame.payload.clone())
        }
        Some(_) => EgressDecision::Pause,
    }
}

struct Session {
    id: u64,
    state: SessionState,
}

impl Session {
    fn transition(&mut self, next: SessionState) {
        debug!(session = self.id, "Session {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Drive one connection until either path ends, then cancel the other.
///
/// Ingress decodes each binary message into the frame buffer and opens the
/// resume gate. Egress waits on the gate, then every `egress_period` sends
/// the newest annotated frame while it is fresh, closing the gate as soon
/// as it goes stale.
#[instrument(skip_all, fields(session = id))]
pub async fn run_session<I, O>(id: u64, inbound: I, outbound: O, ctx: SessionContext) -> SessionReport
where
    I: Stream<Item = Result<Inbound>> + Send + Unpin + 'static,
    O: Sink<Bytes, Error = RelayError> + Send + Unpin + 'static,
{
    let mut session = Session {
        id,
        state: SessionState::Idle,
    };
    let gate = Arc::new(ResumeGate::new());
    let mut shutdown = ctx.shutdown;

    session.transition(SessionState::Active);
    let mut ingress_task = tokio::spawn(ingress(
        inbound,
        ctx.frames.clone(),
        gate.clone(),
        ctx.clock,
    ));
    let mut egress_task = tokio::spawn(egress(
        outbound,
        ctx.output.clone(),
        gate.clone(),
        ctx.clock,
        ctx.settings,
    ));

    let shutdown_signal = async move {
        if shutdown.wait_for(|stop| *stop).await.is_err() {
            // Sender dropped without signalling
            std::future::pending::<()>().await;
        }
    };

    let (ended_by, outcome) = tokio::select! {
        res = &mut ingress_task => (SessionPath::Ingress, flatten(res)),
        res = &mut egress_task => (SessionPath::Egress, flatten(res)),
        _ = shutdown_signal => (SessionPath::Shutdown, Ok(())),
    };

    session.transition(SessionState::Closing);
    gate.shut();
    match ended_by {
        SessionPath::Ingress => cancel(egress_task).await,
        SessionPath::Egress => cancel(ingress_task).await,
        SessionPath::Shutdown => {
            cancel(ingress_task).await;
            cancel(egress_task).await;
        }
    }
    session.transition(SessionState::Closed);

    let error = match outcome {
        Ok(()) => {
            info!("Session closed by {:?}", ended_by);
            None
        }
        Err(e) => {
            error!("Session closed by {:?} failure: {e}", ended_by);
            Some(e)
        }
    };
    SessionReport {
        state: session.state,
        ended_by,
        error,
    }
}

fn flatten(res: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    res.map_err(|e| RelayError::Socket(format!("session task failed: {e}")))?
}

async fn cancel(task: JoinHandle<Result<()>>) {
    task.abort();
    let _ = task.await;
}

/// Receive frames until the peer closes or the transport fails.
/// The gate is opened on every frame and once more on the way out.
async fn ingress<I>(
    mut inbound: I,
    frames: Arc<FrameBuffer>,
    gate: Arc<ResumeGate>,
    clock: MonotonicClock,
) -> Result<()>
where
    I: Stream<Item = Result<Inbound>> + Unpin,
{
    let result = loop {
        match inbound.next().await {
            Some(Ok(Inbound::Frame(data))) => {
                gate.open();
                let timestamp = clock.now();
                let frames = frames.clone();
                let stored = tokio::task::spawn_blocking(move || {
                    match codec::decode_frame(&data) {
                        Ok(image) => frames.add(&image, timestamp),
                        Err(e) => {
                            debug!("Undecodable frame dropped: {e}");
                            false
                        }
                    }
                })
                .await
                .unwrap_or(false);
                if stored {
                    debug!("Frame buffered at {timestamp:.3}");
                }
            }
            Some(Ok(Inbound::Ignored)) => continue,
            Some(Ok(Inbound::Close)) | None => break Ok(()),
            Some(Err(e)) => break Err(e),
        }
    };
    gate.open();
    result
}

/// Forward fresh annotated frames while the gate is open
async fn egress<O>(
    mut outbound: O,
    output: Arc<OutputBuffer>,
    gate: Arc<ResumeGate>,
    clock: MonotonicClock,
    settings: SessionSettings,
) -> Result<()>
where
    O: Sink<Bytes, Error = RelayError> + Unpin,
{
    loop {
        gate.wait_open().await;
        if gate.is_shut() {
            return Ok(());
        }

        let mut ticker = tokio::time::interval(settings.egress_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if gate.is_shut() {
                return Ok(());
            }
            let latest = output.latest();
            match egress_decision(latest.as_ref(), clock.now(), settings.staleness_secs) {
                EgressDecision::Send(payload) => {
                    outbound.send(payload).await?;
                    metrics::counter!("frames_sent").increment(1);
                }
                EgressDecision::Pause => {
                    if let Some(frame) = latest {
                        debug!("Pausing egress, newest frame is {:?} old", clock.since(frame.timestamp));
                    }
                    metrics::counter!("egress_pauses").increment(1);
                    gate.close();
                    break;
                }
                EgressDecision::Wait => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(timestamp: f64) -> TimestampedFrame {
        TimestampedFrame::new(timestamp, vec![1, 2, 3])
    }

    #[test]
    fn fresh_frames_are_sent() {
        let latest = frame(10.0);
        assert_eq!(
            egress_decision(Some(&latest), 11.0, 1.5),
            EgressDecision::Send(Bytes::from_static(&[1, 2, 3]))
        );
    }

    #[test]
    fn frame_exactly_at_threshold_is_not_sent() {
        let latest = frame(1.0);
        assert_eq!(egress_decision(Some(&latest), 2.5, 1.5), EgressDecision::Pause);
        assert_eq!(egress_decision(Some(&latest), 9.0, 1.5), EgressDecision::Pause);
    }

    #[test]
    fn empty_output_waits() {
        assert_eq!(egress_decision(None, 3.0, 1.5), EgressDecision::Wait);
    }
}
