//! `simbridge-middleware` – the messaging fabric
//!
//! Routes commands and encoded frames between the bridge node and the
//! outside world without caring about the data's meaning.
//!
//! # Modules
//!
//! - [`bus`] – topic-named publish/subscribe event bus built on Tokio
//!   broadcast channels, plus the [`Publisher`] seam used by the frame sink.
//! - [`names`] – resolution of private (`~name`), relative and absolute topic
//!   names.
//! - [`ws_bridge`] – WebSocket bridge that lets external clients publish
//!   commands and receive the encoded image stream.

pub mod bus;
pub mod names;
pub mod ws_bridge;

pub use bus::{EventBus, Publisher, TopicPublisher, TopicReceiver};
pub use names::resolve_name;
pub use ws_bridge::WsBridge;
