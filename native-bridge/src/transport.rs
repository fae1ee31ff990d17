//! Interception channel
//!
//! The transport is the hidden navigable surface of the content context: the
//! dispatch loop "navigates" it to a bridge address and the host intercepts that
//! navigation. Nothing comes back through this channel.

use crate::dispatcher::HostDispatcher;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One-directional channel from the content context to the host
pub trait Transport: Send {
    /// Attempt a navigation to `address`
    fn navigate(&mut self, address: &str);
}

impl<F> Transport for F
where
    F: FnMut(&str) + Send,
{
    fn navigate(&mut self, address: &str) {
        self(address)
    }
}

/// In-process transport: every navigation is offered to a host dispatcher
///
/// A navigation the dispatcher declines would load as a normal page on a real
/// surface; here it is only logged.
pub struct InterceptTransport {
    dispatcher: Arc<HostDispatcher>,
}

impl InterceptTransport {
    pub fn new(dispatcher: Arc<HostDispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl Transport for InterceptTransport {
    fn navigate(&mut self, address: &str) {
        if !self.dispatcher.intercept(address) {
            log::warn!("Navigation not intercepted, surface would load: {address}");
        }
    }
}

/// Transport that forwards addresses to another task or thread
///
/// Used when the surface's navigation callback fires somewhere other than the
/// content context's loop.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn navigate(&mut self, address: &str) {
        if self.tx.send(address.to_string()).is_err() {
            log::warn!("Surface receiver closed, navigation dropped: {address}");
        }
    }
}
