//! Concurrency tests for the connection registry.
//!
//! Inserts, handler removals, transport disconnects and broadcaster sweeps
//! all race against each other here. After the dust settles a sweep must
//! leave exactly the still-connected entries behind.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cmdchan_core::{ClientIdRules, StaticIntervals};
use cmdchand::broadcast::Broadcaster;
use cmdchand::registry::{Connection, ConnectionId, ConnectionRegistry, RegistryError};
use cmdchand::server::ConnectionHandler;
use cmdchand::transport::Transport;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn connection(id: u64) -> (Arc<Connection>, DuplexStream) {
    let (client, server) = tokio::io::duplex(1024);
    let conn = Arc::new(Connection::new(
        ConnectionId::new(id),
        SocketAddr::from(([10, 0, 0, 1], 1024 + (id % 60000) as u16)),
        Transport::new(server),
    ));
    (conn, client)
}

async fn live_ids(registry: &ConnectionRegistry) -> HashSet<u64> {
    registry
        .prune_and_snapshot()
        .await
        .live
        .iter()
        .map(|c| c.id().as_u64())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sweep_leaves_exactly_connected_entries() {
    let registry = ConnectionRegistry::new();
    let mut conns = Vec::new();
    let mut clients = Vec::new();

    for id in 0..200 {
        let (conn, client) = connection(id);
        registry.insert(Arc::clone(&conn)).await;
        conns.push(conn);
        clients.push(client);
    }

    // Disconnect every third entry from several tasks while sweeps run.
    let mut tasks = Vec::new();
    for chunk in conns.chunks(50) {
        let chunk: Vec<_> = chunk.to_vec();
        tasks.push(tokio::spawn(async move {
            for conn in chunk {
                if conn.id().as_u64() % 3 == 0 {
                    conn.transport().disconnect();
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    for _ in 0..4 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..25 {
                registry.prune_disconnected().await;
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let expected: HashSet<u64> = (0..200).filter(|id| id % 3 != 0).collect();
    assert_eq!(live_ids(&registry).await, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_remove_is_idempotent() {
    let registry = ConnectionRegistry::new();
    let mut clients = Vec::new();
    for id in 0..100 {
        let (conn, client) = connection(id);
        registry.insert(conn).await;
        clients.push(client);
    }

    // Two handlers racing to remove the same ids: each id is removed once.
    let mut tasks = Vec::new();
    for _ in 0..2 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let mut removed = 0;
            for id in 0..100 {
                if registry.remove(ConnectionId::new(id)).await {
                    removed += 1;
                }
            }
            removed
        }));
    }

    let mut total = 0;
    for task in tasks {
        total += task.await.unwrap();
    }

    assert_eq!(total, 100);
    assert!(registry.is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_prune_then_handler_remove_is_harmless() {
    let registry = ConnectionRegistry::new();
    let (conn, _client) = connection(7);
    registry.insert(Arc::clone(&conn)).await;

    conn.transport().disconnect();
    assert_eq!(registry.prune_disconnected().await, 1);
    assert!(!registry.remove(conn.id()).await);
    assert!(registry.is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_try_insert_never_exceeds_capacity_under_contention() {
    let registry = ConnectionRegistry::new();
    let mut tasks = Vec::new();

    for id in 0..64 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let (conn, client) = connection(id);
            let result = registry.try_insert(conn, 16).await;
            (result, client)
        }));
    }

    let mut accepted = 0;
    let mut refused = 0;
    let mut _clients = Vec::new();
    for task in tasks {
        let (result, client) = task.await.unwrap();
        match result {
            Ok(count) => {
                assert!(count <= 16);
                accepted += 1;
            }
            Err(RegistryError::Full { max }) => {
                assert_eq!(max, 16);
                refused += 1;
            }
        }
        _clients.push(client);
    }

    assert_eq!(accepted, 16);
    assert_eq!(refused, 48);
    assert_eq!(registry.len().await, 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_handlers_and_sweeps_converge() {
    let registry = ConnectionRegistry::new();
    let broadcaster = Broadcaster::new(
        registry.clone(),
        Arc::new(StaticIntervals::new(9)),
        Duration::from_secs(3600),
        CancellationToken::new(),
    );

    let mut handlers = Vec::new();
    let mut keep = Vec::new();

    for id in 0..40u64 {
        let (reader, mut peer_writer) = tokio::io::duplex(256);
        let (conn, peer_reader) = connection(id);
        registry.insert(Arc::clone(&conn)).await;

        handlers.push(tokio::spawn(
            ConnectionHandler::new(
                reader,
                conn,
                registry.clone(),
                Arc::new(ClientIdRules),
                1024,
            )
            .run(),
        ));

        peer_writer
            .write_all(format!("Client-ID: node-{id}\n").as_bytes())
            .await
            .unwrap();

        if id % 2 == 0 {
            // Client goes away: the handler sees EOF and removes itself.
            drop(peer_writer);
            drop(peer_reader);
        } else {
            keep.push((id, peer_writer, peer_reader));
        }
    }

    // Sweep while handlers are still winding down.
    for _ in 0..5 {
        broadcaster.sweep().await;
        tokio::task::yield_now().await;
    }

    // Every dropped client's handler ends on its own, whether it saw EOF
    // first or a failed send closed its transport.
    for (id, handler) in handlers.into_iter().enumerate() {
        if id % 2 == 0 {
            timeout(Duration::from_secs(5), handler)
                .await
                .expect("handler finishes")
                .unwrap();
        }
    }

    let expected: HashSet<u64> = keep.iter().map(|(id, _, _)| *id).collect();
    assert_eq!(live_ids(&registry).await, expected);

    // Survivors received one interval per sweep.
    for (_, _writer, reader) in keep.iter_mut() {
        let mut buf = [0u8; 12];
        timeout(Duration::from_secs(5), reader.read_exact(&mut buf))
            .await
            .expect("interval arrives")
            .unwrap();
        assert_eq!(&buf, b"Interval=9\r\n");
    }
}
