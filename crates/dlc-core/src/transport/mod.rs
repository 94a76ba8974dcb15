//! Extension-facing transport: a WebSocket listener where every text frame
//! is one JSON message and gets exactly one JSON reply.

mod protocol;
mod reply;
mod server;

pub use protocol::{
    decode, request_id, DownloadRequest, InboundMessage, ProtocolError, YoutubeRequest,
};
pub use reply::Reply;
pub use server::{bind, spawn_listener, MessageHandler};
