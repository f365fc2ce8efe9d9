use async_trait::async_trait;
use dht_id::{DhtError, Id};
use dht_rpc::{RpcHandler, RpcServer, TcpPeerTransport};
use dht_routing::{PeerRecord, PeerTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

struct FakeHandler {
    self_id: Id,
    successor: PeerRecord,
}

#[async_trait]
impl RpcHandler for FakeHandler {
    async fn ping(&self) -> Id {
        self.self_id
    }

    async fn get_predecessor(&self) -> Option<PeerRecord> {
        None
    }

    async fn notify(&self, _caller: PeerRecord) {}

    async fn get_successor_list(&self) -> Vec<PeerRecord> {
        vec![self.successor.clone()]
    }

    async fn find_successor(&self, _target: Id, _deadline: Duration) -> Result<PeerRecord, DhtError> {
        Ok(self.successor.clone())
    }

    async fn find_successor_step(
        &self,
        _target: Id,
        current_i: Id,
        _kshift: Id,
        hop_count: u32,
        _deadline: Duration,
    ) -> Result<(PeerRecord, u32), DhtError> {
        let _ = current_i;
        Ok((self.successor.clone(), hop_count + 1))
    }

    async fn closest_preceding_finger(&self, _target: Id) -> Option<PeerRecord> {
        Some(self.successor.clone())
    }

    async fn put(&self, _key: Id, _value: Vec<u8>, _ttl: Duration) -> Result<(), DhtError> {
        Ok(())
    }

    async fn get(&self, _key: Id) -> Result<Option<Vec<u8>>, DhtError> {
        Ok(Some(b"hello".to_vec()))
    }

    async fn delete(&self, _key: Id) -> Result<(), DhtError> {
        Ok(())
    }
}

fn id16(v: u128) -> Id {
    Id::new(16, v).unwrap()
}

#[tokio::test]
async fn ping_and_find_successor_round_trip_over_real_tcp() {
    let self_id = id16(0x1234);
    let successor = PeerRecord::new(id16(0x8000), "irrelevant:0");
    let handler = Arc::new(FakeHandler {
        self_id,
        successor: successor.clone(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(RpcServer::new(handler).serve(listener));

    let transport = TcpPeerTransport::new();
    let server_peer = PeerRecord::new(id16(0), addr.to_string());
    let deadline = Duration::from_secs(2);

    let pong = transport.ping(&server_peer, deadline).await.unwrap();
    assert_eq!(pong, self_id);

    let found = transport.find_successor(&server_peer, id16(0x5000), deadline).await.unwrap();
    assert_eq!(found.id, successor.id);

    let list = transport.get_successor_list(&server_peer, deadline).await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, successor.id);
}

#[tokio::test]
async fn connecting_to_a_closed_port_reports_a_transport_error() {
    let transport = TcpPeerTransport::new();
    let dead_peer = PeerRecord::new(id16(0), "127.0.0.1:1");
    let result = transport.ping(&dead_peer, Duration::from_millis(200)).await;
    assert!(matches!(result, Err(DhtError::Transport { .. }) | Err(DhtError::DeadlineExceeded)));
}
