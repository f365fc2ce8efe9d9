//! Accepts framed TCP connections and dispatches each request to an
//! [`RpcHandler`], one connection task per peer (mirrors the teacher's
//! per-connection tokio::spawn in `https_gateway/server.rs`, adapted from
//! HTTP keep-alive connections to a long-lived bidirectional RPC socket).

use crate::codec::{read_frame, write_frame, CodecError};
use crate::handler::RpcHandler;
use crate::wire::{duration_from_millis, shrink_deadline, Request, RequestEnvelope, Response, ResponseEnvelope, WireError, WireId, WirePeer};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

pub struct RpcServer<H: RpcHandler + 'static> {
    handler: Arc<H>,
}

impl<H: RpcHandler + 'static> RpcServer<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (socket, peer_addr) = listener.accept().await?;
            let handler = self.handler.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, handler).await {
                    debug!(peer = %peer_addr, error = %e, "rpc connection closed");
                }
            });
        }
    }
}

async fn handle_connection<H: RpcHandler + 'static>(mut socket: TcpStream, handler: Arc<H>) -> Result<(), CodecError> {
    loop {
        let request: RequestEnvelope = read_frame(&mut socket).await?;
        let body = dispatch(handler.as_ref(), request.body, request.deadline_ms).await;
        let response = ResponseEnvelope {
            correlation_id: request.correlation_id,
            deadline_ms: 0,
            body,
        };
        write_frame(&mut socket, &response).await?;
    }
}

async fn dispatch<H: RpcHandler + ?Sized>(handler: &H, request: Request, deadline_ms: u64) -> Result<Response, WireError> {
    let deadline = shrink_deadline(deadline_ms);
    match request {
        Request::Ping => Ok(Response::Ping(WireId::from_id(handler.ping().await))),
        Request::GetPredecessor => Ok(Response::GetPredecessor(handler.get_predecessor().await.map(|p| WirePeer::from_peer(&p)))),
        Request::Notify { caller } => {
            let peer = caller.to_peer().map_err(|e| invalid_argument(e.to_string()))?;
            handler.notify(peer).await;
            Ok(Response::Notify)
        }
        Request::GetSuccessorList => Ok(Response::GetSuccessorList(
            handler.get_successor_list().await.iter().map(WirePeer::from_peer).collect(),
        )),
        Request::FindSuccessor { target } => {
            let target = target.to_id().map_err(|e| invalid_argument(e.to_string()))?;
            handler
                .find_successor(target, deadline)
                .await
                .map(|p| Response::FindSuccessor(WirePeer::from_peer(&p)))
                .map_err(|e| WireError::from(&e))
        }
        Request::FindSuccessorStep { target, current_i, kshift, hop_count } => {
            let target = target.to_id().map_err(|e| invalid_argument(e.to_string()))?;
            let current_i = current_i.to_id().map_err(|e| invalid_argument(e.to_string()))?;
            let kshift = kshift.to_id().map_err(|e| invalid_argument(e.to_string()))?;
            handler
                .find_successor_step(target, current_i, kshift, hop_count, deadline)
                .await
                .map(|(peer, hop_count)| Response::FindSuccessorStep {
                    peer: WirePeer::from_peer(&peer),
                    hop_count,
                })
                .map_err(|e| WireError::from(&e))
        }
        Request::ClosestPrecedingFinger { target } => {
            let target = target.to_id().map_err(|e| invalid_argument(e.to_string()))?;
            Ok(Response::ClosestPrecedingFinger(
                handler.closest_preceding_finger(target).await.map(|p| WirePeer::from_peer(&p)),
            ))
        }
        Request::Put { key, value, ttl_ms } => {
            let key = key.to_id().map_err(|e| invalid_argument(e.to_string()))?;
            handler
                .put(key, value, duration_from_millis(ttl_ms))
                .await
                .map(|_| Response::Put)
                .map_err(|e| WireError::from(&e))
        }
        Request::Get { key } => {
            let key = key.to_id().map_err(|e| invalid_argument(e.to_string()))?;
            handler.get(key).await.map(Response::Get).map_err(|e| WireError::from(&e))
        }
        Request::Delete { key } => {
            let key = key.to_id().map_err(|e| invalid_argument(e.to_string()))?;
            handler.delete(key).await.map(|_| Response::Delete).map_err(|e| WireError::from(&e))
        }
    }
}

fn invalid_argument(message: String) -> WireError {
    WireError {
        code: crate::wire::WireErrorCode::InvalidArgument,
        message,
    }
}
