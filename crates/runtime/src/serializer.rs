//! First-come-first-served access to the single agent.
//!
//! The agent lives inside one worker task. Callers hold a cheap
//! [`RequestSerializer`] handle and talk to the worker over a bounded channel;
//! each request carries a oneshot slot for its reply. The worker runs exactly
//! one instruction at a time, in arrival order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::{Error, Result};

/// Requests that may wait in the queue before `submit` applies backpressure.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

enum Command {
    Run(PendingRequest),
    Shutdown(oneshot::Sender<()>),
}

/// One caller waiting for its turn with the agent.
struct PendingRequest {
    ticket: u64,
    instruction: String,
    reply: oneshot::Sender<Result<String>>,
}

/// Handle for submitting instructions to the agent worker.
#[derive(Clone)]
pub struct RequestSerializer {
    tx: mpsc::Sender<Command>,
    deadline: Option<Duration>,
    tickets: Arc<AtomicU64>,
}

impl RequestSerializer {
    /// Move `agent` into a new worker task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<A: Agent>(agent: A) -> Self {
        Self::with_queue_depth(agent, DEFAULT_QUEUE_DEPTH)
    }

    pub fn with_queue_depth<A: Agent>(agent: A, depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(depth.max(1));
        tokio::spawn(worker(agent, rx));
        Self {
            tx,
            deadline: None,
            tickets: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Bound how long `submit` waits, queueing included.
    ///
    /// An expired request still runs when its turn comes; only the caller
    /// stops waiting.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Whether the worker still accepts requests.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Requests waiting in the queue, not counting the one being served.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Wait for a turn with the agent and return its reply.
    pub async fn submit(&self, instruction: impl Into<String>) -> Result<String> {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        let (reply, response) = oneshot::channel();
        let request = PendingRequest {
            ticket,
            instruction: instruction.into(),
            reply,
        };

        let exchange = async {
            self.tx
                .send(Command::Run(request))
                .await
                .map_err(|_| Error::NotInitialized)?;
            debug!(request = ticket, "request queued");
            response.await.map_err(|_| Error::NotInitialized)?
        };

        match self.deadline {
            None => exchange.await,
            Some(deadline) => timeout(deadline, exchange).await.unwrap_or_else(|_| {
                warn!(request = ticket, ?deadline, "request deadline expired");
                Err(Error::Timeout(deadline))
            }),
        }
    }

    /// Stop accepting requests, let the worker finish what is ahead in the
    /// queue, then end the agent.
    ///
    /// Requests queued behind the shutdown fail with
    /// [`Error::NotInitialized`]. Returns once the agent has ended.
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Shutdown(ack)).await.is_err() {
            return;
        }
        let _ = done.await;
    }
}

async fn worker<A: Agent>(mut agent: A, mut rx: mpsc::Receiver<Command>) {
    info!("request serializer started");
    let mut acks = Vec::new();

    while let Some(command) = rx.recv().await {
        match command {
            Command::Run(request) => serve(&mut agent, request).await,
            Command::Shutdown(ack) => {
                acks.push(ack);
                break;
            }
        }
    }

    rx.close();
    while let Some(command) = rx.recv().await {
        match command {
            Command::Run(request) => {
                debug!(request = request.ticket, "rejecting request after shutdown");
                let _ = request.reply.send(Err(Error::NotInitialized));
            }
            Command::Shutdown(ack) => acks.push(ack),
        }
    }

    if let Err(e) = agent.end() {
        warn!(error = %e, "agent did not end cleanly");
    }
    info!("request serializer stopped");
    for ack in acks {
        let _ = ack.send(());
    }
}

async fn serve<A: Agent>(agent: &mut A, request: PendingRequest) {
    let PendingRequest {
        ticket,
        instruction,
        reply,
    } = request;

    if reply.is_closed() {
        debug!(request = ticket, "caller stopped waiting; running anyway");
    }

    let started = Instant::now();
    let result = agent.run(&instruction).await;
    info!(
        request = ticket,
        elapsed_ms = started.elapsed().as_millis() as u64,
        ok = result.is_ok(),
        "request finished"
    );

    if reply.send(result).is_err() {
        debug!(request = ticket, "reply dropped; caller is gone");
    }
}
