//! Collaborator adapters for dualsign.
//!
//! HTTP implementations of the renderer, countersigner and notifier traits,
//! plus log-only and static variants for local runs.

#![deny(unsafe_code)]

mod countersign;
mod error;
mod local;
mod mail;
mod render;

#[cfg(test)]
mod testing;

pub use countersign::{decode_signed_response, CountersignerConfig, MtlsCountersigner};
pub use error::{AdapterError, AdapterResult};
pub use local::{LogNotifier, StaticRenderer};
pub use mail::HttpMailRelay;
pub use render::HttpRenderer;
