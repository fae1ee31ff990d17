//! Caller-side bridge queue and dispatch loop
//!
//! Content code talks to a [`BridgeQueue`] handle. Every operation becomes a
//! command on one channel, consumed by a single [`DispatchLoop`] task that owns the
//! call queue, the callback registry, the event listeners and the dispatch slot.
//! Host re-entries ([`ContentHandle`]) travel the same channel, so the loop is the
//! only writer of that state and needs no locks.
//!
//! The loop emits at most one request at a time. With [`AckMode::Explicit`] the
//! slot stays occupied until the host acknowledges the emission token (or the
//! acknowledgment timeout passes); with [`AckMode::Immediate`] it is released as
//! soon as the transport accepted the address.

use crate::codec::{emission_token, AddressCodec};
use crate::config::{AckMode, BridgeConfig};
use crate::reentry::Reentry;
use crate::registry::CallbackRegistry;
use crate::transport::Transport;
use crate::types::{
    BridgeError, CallRequest, Callback, CallbackId, CallbackResult, EventListener, Params,
    Payload, Result,
};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

enum Command {
    Enqueue {
        request: CallRequest,
        callback: Option<Callback>,
    },
    Listen {
        name: String,
        listener: EventListener,
    },
    Flush(oneshot::Sender<()>),
    Ack {
        token: String,
    },
    Resolve {
        id: CallbackId,
        result: CallbackResult,
    },
    Event {
        name: String,
        payload: Payload,
    },
}

/// Content-side handle for calling the host
///
/// Cheap to clone. The bridge shuts down once every handle is dropped; requests
/// still queued at that point are discarded, so call [`BridgeQueue::flush`] first
/// when they matter.
#[derive(Clone)]
pub struct BridgeQueue {
    tx: mpsc::UnboundedSender<Command>,
    codec: AddressCodec,
}

/// Host-side handle that re-enters the content context
///
/// Holds only a weak reference to the loop's channel, so a host keeping this
/// around does not keep the bridge alive.
#[derive(Clone)]
pub struct ContentHandle {
    tx: mpsc::WeakUnboundedSender<Command>,
}

enum DispatchSlot {
    Free,
    InFlight { token: String, since: Instant },
}

struct Queued {
    request: CallRequest,
    callback: Option<CallbackId>,
}

/// The task draining the call queue onto a transport
pub struct DispatchLoop {
    rx: mpsc::UnboundedReceiver<Command>,
    codec: AddressCodec,
    ack_mode: AckMode,
    ack_timeout: Duration,
    queue: VecDeque<Queued>,
    registry: CallbackRegistry,
    listeners: HashMap<String, EventListener>,
    flush_waiters: Vec<oneshot::Sender<()>>,
    slot: DispatchSlot,
    seq: u64,
}

/// Create the three parts of one bridge instance
///
/// The host dispatcher needs the [`ContentHandle`] before the transport that wraps
/// it exists, hence the split: build the dispatcher with the handle, then run the
/// loop with the transport.
pub fn channel(config: &BridgeConfig) -> (BridgeQueue, ContentHandle, DispatchLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    let codec = AddressCodec::new(config);

    let content = ContentHandle {
        tx: tx.downgrade(),
    };
    let queue = BridgeQueue {
        tx,
        codec: codec.clone(),
    };
    let dispatch = DispatchLoop {
        rx,
        codec,
        ack_mode: config.ack_mode,
        ack_timeout: config.ack_timeout(),
        queue: VecDeque::new(),
        registry: CallbackRegistry::new(config.callback_timeout()),
        listeners: HashMap::new(),
        flush_waiters: Vec::new(),
        slot: DispatchSlot::Free,
        seq: 0,
    };

    (queue, content, dispatch)
}

impl BridgeQueue {
    fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| BridgeError::BridgeClosed)
    }

    /// Queue a call that expects no response
    pub fn enqueue_call(
        &self,
        component: impl Into<String>,
        operation: impl Into<String>,
        params: Params,
    ) -> Result<()> {
        let request = CallRequest::new(component, operation, params);
        self.codec.validate(&request)?;
        self.send(Command::Enqueue {
            request,
            callback: None,
        })
    }

    /// Queue a call whose response is delivered to `callback`
    ///
    /// The callback runs at most once on the dispatch loop: with the host's
    /// payload, with `HostFailure` if the host reports an error, or with
    /// `Timeout` if the host stays silent past the configured expiry.
    pub fn enqueue_call_with_callback<F>(
        &self,
        component: impl Into<String>,
        operation: impl Into<String>,
        params: Params,
        callback: F,
    ) -> Result<()>
    where
        F: FnOnce(CallbackResult) + Send + 'static,
    {
        let request = CallRequest::new(component, operation, params);
        self.codec.validate(&request)?;
        self.send(Command::Enqueue {
            request,
            callback: Some(Box::new(callback)),
        })
    }

    /// Call the host and wait for its response
    pub async fn call(
        &self,
        component: impl Into<String>,
        operation: impl Into<String>,
        params: Params,
    ) -> Result<Payload> {
        let (tx, rx) = oneshot::channel();
        self.enqueue_call_with_callback(component, operation, params, move |result| {
            let _ = tx.send(result);
        })?;
        rx.await.map_err(|_| BridgeError::BridgeClosed)?
    }

    /// Register a persistent listener for host events named `name`
    ///
    /// Replaces any listener previously registered under the same name.
    pub fn on_event<F>(&self, name: impl Into<String>, listener: F) -> Result<()>
    where
        F: FnMut(Payload) + Send + 'static,
    {
        self.send(Command::Listen {
            name: name.into(),
            listener: Box::new(listener),
        })
    }

    /// Wait until every request queued so far has been emitted and released
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Flush(tx))?;
        rx.await.map_err(|_| BridgeError::BridgeClosed)
    }
}

impl ContentHandle {
    fn send(&self, command: Command) {
        match self.tx.upgrade() {
            Some(tx) => {
                if tx.send(command).is_err() {
                    log::debug!("Dispatch loop stopped; re-entry dropped");
                }
            }
            None => log::debug!("Content context closed; re-entry dropped"),
        }
    }
}

impl Reentry for ContentHandle {
    fn acknowledge(&self, token: &str) {
        self.send(Command::Ack {
            token: token.to_string(),
        });
    }

    fn resolve(&self, id: CallbackId, result: CallbackResult) {
        self.send(Command::Resolve { id, result });
    }

    fn emit_event(&self, name: &str, payload: Payload) {
        self.send(Command::Event {
            name: name.to_string(),
            payload,
        });
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl DispatchLoop {
    /// Run the loop on the current runtime
    pub fn spawn<T>(self, transport: T) -> JoinHandle<()>
    where
        T: Transport + 'static,
    {
        tokio::spawn(self.run(transport))
    }

    /// Drain commands until every [`BridgeQueue`] handle is gone
    pub async fn run<T: Transport>(mut self, mut transport: T) {
        log::debug!("Dispatch loop started ({:?} acknowledgment)", self.ack_mode);

        loop {
            self.pump(&mut transport);

            let ack_deadline = match &self.slot {
                DispatchSlot::InFlight { since, .. } => Some(*since + self.ack_timeout),
                DispatchSlot::Free => None,
            };
            let expiry = self.registry.next_deadline();

            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = sleep_until_some(ack_deadline) => {
                    if let DispatchSlot::InFlight { token, .. } = &self.slot {
                        log::warn!(
                            "No acknowledgment for emission {token} within {:?}, releasing slot",
                            self.ack_timeout
                        );
                    }
                    self.slot = DispatchSlot::Free;
                }
                _ = sleep_until_some(expiry) => {
                    self.registry.expire(Instant::now());
                }
            }
        }

        if !self.queue.is_empty() {
            log::warn!("Bridge closed with {} queued calls discarded", self.queue.len());
        }
        self.registry.close();
        log::debug!("Dispatch loop stopped after {} emissions", self.seq);
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Enqueue { request, callback } => self.enqueue(request, callback),
            Command::Listen { name, listener } => {
                if self.listeners.insert(name.clone(), listener).is_some() {
                    log::debug!("Replaced listener for event '{name}'");
                }
            }
            Command::Flush(waiter) => self.flush_waiters.push(waiter),
            Command::Ack { token } => match &self.slot {
                DispatchSlot::InFlight { token: current, .. } if *current == token => {
                    log::trace!("Emission {token} acknowledged");
                    self.slot = DispatchSlot::Free;
                }
                _ => log::debug!("Stale acknowledgment {token} ignored"),
            },
            Command::Resolve { id, result } => {
                self.registry.resolve(id, result);
            }
            Command::Event { name, payload } => match self.listeners.get_mut(&name) {
                Some(listener) => listener(payload),
                None => log::debug!("No listener for event '{name}', payload dropped"),
            },
        }
    }

    fn enqueue(&mut self, request: CallRequest, callback: Option<Callback>) {
        let callback = callback.map(|callback| {
            let label = format!("{}/{}", request.component, request.operation);
            self.registry.register(label, callback, Instant::now())
        });
        log::trace!(
            "Queued {}/{} ({} pending)",
            request.component,
            request.operation,
            self.queue.len() + 1
        );
        self.queue.push_back(Queued { request, callback });
    }

    /// Emit queued requests while the slot is free
    fn pump<T: Transport>(&mut self, transport: &mut T) {
        while matches!(self.slot, DispatchSlot::Free) {
            let Some(queued) = self.queue.pop_front() else {
                break;
            };

            self.seq += 1;
            let token = emission_token(self.seq);
            let address = match self.codec.encode(&queued.request, queued.callback, &token) {
                Ok(address) => address,
                Err(e) => {
                    log::warn!(
                        "Dropping {}/{}: {e}",
                        queued.request.component,
                        queued.request.operation
                    );
                    if let Some(id) = queued.callback {
                        self.registry.resolve(id, Err(e));
                    }
                    continue;
                }
            };

            if let Some(id) = queued.callback {
                self.registry.mark_in_flight(id);
            }
            log::debug!("Dispatching #{}: {address}", self.seq);
            transport.navigate(&address);

            if self.ack_mode == AckMode::Explicit {
                self.slot = DispatchSlot::InFlight {
                    token,
                    since: Instant::now(),
                };
            }
        }

        if self.queue.is_empty() && matches!(self.slot, DispatchSlot::Free) {
            for waiter in self.flush_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }
}
