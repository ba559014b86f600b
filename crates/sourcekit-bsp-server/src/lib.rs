//! The BSP stdio server: framing, configuration, and method dispatch over
//! the extraction engine in `sourcekit-bsp-bazel`.

pub mod codec;
pub mod config;
pub mod handlers;
pub mod outgoing;

pub use crate::{
    config::BuildServerConfig,
    handlers::{handle_notification, handle_request, ServerState, BSP_VERSION},
    outgoing::{Outgoing, WriterOutgoing},
};
