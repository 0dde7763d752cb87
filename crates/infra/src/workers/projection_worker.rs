use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{info, warn};

use ledgerdesk_core::TenantId;
use ledgerdesk_events::{EventBus, EventEnvelope, Subscription};

/// Handle to stop and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Feeds published envelopes to a projection handler on its own thread.
///
/// The subscription is taken before the thread starts, so nothing published
/// after `spawn` returns is missed.
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// `tenant_id`: when set, envelopes of other tenants are skipped.
    /// `handler` must tolerate redelivery.
    pub fn spawn<B, H, E>(
        name: &'static str,
        bus: B,
        tenant_id: Option<TenantId>,
        mut handler: H,
    ) -> std::io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<JsonValue>>,
        H: FnMut(EventEnvelope<JsonValue>) -> Result<(), E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, tenant_id, &mut handler))?;
        info!(worker = name, "projection worker started");

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<H, E>(
    name: &'static str,
    sub: Subscription<EventEnvelope<JsonValue>>,
    shutdown_rx: mpsc::Receiver<()>,
    tenant_id: Option<TenantId>,
    handler: &mut H,
) where
    H: FnMut(EventEnvelope<JsonValue>) -> Result<(), E>,
    E: core::fmt::Display,
{
    let tick = Duration::from_millis(100);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(envelope) => {
                if tenant_id.is_some_and(|t| envelope.tenant_id() != t) {
                    continue;
                }
                let event_id = envelope.event_id();
                if let Err(err) = handler(envelope) {
                    warn!(worker = name, %event_id, error = %err, "projection handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}
