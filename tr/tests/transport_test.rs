//! Integration tests for the TCP transport
//!
//! A real listener on an ephemeral port with real line-protocol clients.

use std::net::SocketAddr;
use std::time::Duration;

use taskrelay::catalog::{Catalog, TaskKindConfig};
use taskrelay::config::{GameConfig, ServerConfig};
use taskrelay::domain::RoomCode;
use taskrelay::net::{self, ClientMessage, Hello, RelayClient, ServerMessage};
use taskrelay::rooms::RoomRegistry;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

fn solo_catalog() -> Catalog {
    let kinds: Vec<TaskKindConfig> = ["FIREWALL_CONFIG", "PASSWORD_CRACK", "PACKET_SNIFF", "DECRYPT_FILE"]
        .iter()
        .map(|kind| TaskKindConfig {
            kind: kind.to_string(),
            control: None,
            filler: false,
            multiplayer: false,
        })
        .collect();
    Catalog::new(&kinds).expect("Failed to build catalog")
}

async fn start_server() -> (SocketAddr, RoomRegistry) {
    let listener = net::bind("127.0.0.1:0").await.expect("Failed to bind");
    let addr = listener.local_addr().unwrap();
    let config = GameConfig {
        seed: Some(11),
        ..GameConfig::default()
    };
    let registry = RoomRegistry::new(config, solo_catalog(), 64);

    tokio::spawn(net::serve(listener, registry.clone(), ServerConfig::default()));
    (addr, registry)
}

async fn player(addr: SocketAddr, hello: Hello) -> (RelayClient, RoomCode) {
    let mut client = RelayClient::connect(addr).await.expect("Failed to connect");
    let joined = client.hello(&hello).await.expect("Hello failed");
    (client, joined.room)
}

#[tokio::test]
async fn test_create_and_join_room() {
    let (addr, registry) = start_server().await;

    let (_host, room) = player(addr, Hello::CreateRoom { name: Some("Ada".into()) }).await;
    let (_guest, joined) = player(
        addr,
        Hello::JoinRoom {
            room: room.clone(),
            name: None,
        },
    )
    .await;

    assert_eq!(joined, room);
    assert_eq!(registry.room_count().await, 1);
    let state = registry.get(&room).await.unwrap().snapshot().await.unwrap();
    assert_eq!(state.players.len(), 2);
    assert!(state.players.values().any(|p| p.name == "Ada"));
    assert!(state.players.values().any(|p| p.name.starts_with("agent-")));
}

#[tokio::test]
async fn test_unknown_room_rejected() {
    let (addr, _registry) = start_server().await;
    let mut client = RelayClient::connect(addr).await.unwrap();

    let result = client
        .hello(&Hello::JoinRoom {
            room: RoomCode::parse("ZZZZZZ").unwrap(),
            name: None,
        })
        .await;

    let err = result.unwrap_err().to_string();
    assert!(err.contains("Unknown room"), "{}", err);
}

#[tokio::test]
async fn test_bad_hello_rejected() {
    let (addr, _registry) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(b"not json\n").await.unwrap();

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    let reply: ServerMessage = serde_json::from_str(line.trim()).unwrap();
    assert!(matches!(reply, ServerMessage::JoinRejected { .. }));
}

#[tokio::test]
async fn test_play_a_task_over_the_wire() {
    let (addr, _registry) = start_server().await;
    let (mut host, room) = player(addr, Hello::CreateRoom { name: None }).await;
    let (mut second, _) = player(
        addr,
        Hello::JoinRoom {
            room: room.clone(),
            name: None,
        },
    )
    .await;
    let (mut third, _) = player(addr, Hello::JoinRoom { room, name: None }).await;

    host.send(&ClientMessage::StartGame).await.unwrap();
    for client in [&mut host, &mut second, &mut third] {
        client
            .recv_until(|m| matches!(m, ServerMessage::StartGame))
            .await
            .unwrap();
    }

    let controls = host
        .recv_until(|m| matches!(m, ServerMessage::Controls { .. }))
        .await
        .unwrap();
    assert!(matches!(controls, ServerMessage::Controls { controls } if !controls.is_empty()));

    let task = match host
        .recv_until(|m| matches!(m, ServerMessage::NewTask { .. }))
        .await
        .unwrap()
    {
        ServerMessage::NewTask { task } => task,
        _ => unreachable!(),
    };

    // Distractions get no reply; the next message is the completion
    host.send(&ClientMessage::DistractionClicked).await.unwrap();
    host.send(&ClientMessage::TaskCompleted { task_id: task.id }).await.unwrap();

    let done = host
        .recv_until(|m| matches!(m, ServerMessage::TaskCompleted { .. }))
        .await
        .unwrap();
    assert_eq!(done, ServerMessage::TaskCompleted { task_id: task.id });

    // Everyone sees the removal from the active set, without an assignee
    let removal = second
        .recv_until(|m| match m {
            ServerMessage::StateChanged { changes } => serde_json::to_string(changes)
                .unwrap()
                .contains(&format!("\"taskRemoved\",\"id\":{}", task.id)),
            _ => false,
        })
        .await
        .unwrap();
    assert!(matches!(removal, ServerMessage::StateChanged { .. }));
}

#[tokio::test]
async fn test_disconnect_removes_player() {
    let (addr, registry) = start_server().await;
    let (host, room) = player(addr, Hello::CreateRoom { name: None }).await;
    let (_guest, _) = player(
        addr,
        Hello::JoinRoom {
            room: room.clone(),
            name: None,
        },
    )
    .await;

    drop(host);

    let handle = registry.get(&room).await.unwrap();
    let mut players = usize::MAX;
    for _ in 0..50 {
        players = handle.snapshot().await.unwrap().players.len();
        if players == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(players, 1);
}
