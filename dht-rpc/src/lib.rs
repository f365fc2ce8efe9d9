//! Framed binary RPC over TCP: the concrete transport `dht-routing`'s
//! protocols call out through, and the server dispatcher that answers
//! inbound calls against an [`handler::RpcHandler`].

pub mod client;
pub mod codec;
pub mod handler;
pub mod server;
pub mod wire;

pub use client::TcpPeerTransport;
pub use handler::RpcHandler;
pub use server::RpcServer;
