//! Native Call Bridge Library
//!
//! Lets script running inside an embedded content surface call functionality
//! hosted by the surrounding native application, when the only channel between
//! the two is the host intercepting navigations to a reserved address scheme.
//!
//! # Architecture
//!
//! - **Content side**: a [`BridgeQueue`] handle feeds a single [`DispatchLoop`]
//!   task that emits calls one at a time onto a [`Transport`] and owns the
//!   pending callback registry.
//! - **Host side**: a [`HostDispatcher`] decodes intercepted addresses, runs the
//!   registered [`Handler`], and answers through a [`Reentry`] implementation.
//!
//! Dispatch order is FIFO. Completion order of calls with callbacks is not:
//! a host handler may finish long after later calls were dispatched.
//!
//! The library does NOT:
//! - Persist calls or retry them after a crash
//! - Route between several hosts or several content surfaces
//!
//! # Example Usage
//!
//! ```no_run
//! use native_bridge::{
//!     channel, BridgeConfig, HostCapabilities, HostDispatcher, InterceptTransport, LogFacade,
//!     MobileBridge,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> native_bridge::Result<()> {
//! let config = BridgeConfig::new();
//! let (queue, content, dispatch) = channel(&config);
//!
//! let mut dispatcher = HostDispatcher::new(&config, Arc::new(content));
//! HostCapabilities::new()
//!     .system_log(Arc::new(LogFacade))
//!     .install(&mut dispatcher);
//!
//! dispatch.spawn(InterceptTransport::new(Arc::new(dispatcher)));
//!
//! let bridge = MobileBridge::new(queue);
//! bridge.log_text("exhibit guide ready")?;
//! bridge.queue().flush().await?;
//! # Ok(())
//! # }
//! ```

// Public modules
pub mod capabilities;
pub mod client;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod queue;
pub mod reentry;
pub mod registry;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use capabilities::{
    Haptics, HostCapabilities, LogFacade, MapCenter, MapPosition, PropertyStore, SpeechInput,
    SpeechOutput, SystemLog,
};
pub use client::MobileBridge;
pub use codec::{AddressCodec, DecodedCall};
pub use config::{AckMode, BridgeConfig};
pub use dispatcher::{Handler, HostDispatcher, HostExecutor, HostLoop, Responder};
pub use queue::{channel, BridgeQueue, ContentHandle, DispatchLoop};
pub use reentry::{Reentry, ScriptEvaluator, ScriptReentry};
pub use transport::{ChannelTransport, InterceptTransport, Transport};
pub use types::{
    BridgeError, CallRequest, CallState, CallbackId, CallbackResult, Params, Payload, Result,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
