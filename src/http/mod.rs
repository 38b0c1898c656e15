//! Symmetric HTTP/1.1 client/server framing engine over [`crate::net`]
//! (spec §2 "H"). Grounded on `original_source/pcomn_http` for the
//! message/connection split and on `yaleman-goatns` for ambient error and
//! logging idiom.

pub mod client;
pub mod connection;
mod error;
mod message;
mod server;
mod status;

pub use client::ClientConnection;
pub use connection::Connection;
pub use error::HttpError;
pub use message::{
    ContentFraming, Headers, HttpRequest, HttpResponse, HttpVersion, MessageCore, MessageFlags,
    Method,
};
pub use server::ServerConnection;
pub use status::reason_phrase;
