//! Integration tests for the session coordinator
//!
//! These tests drive a real coordinator task through its handle, the same
//! way the TCP listener does.

use std::sync::Arc;
use std::time::Duration;

use taskrelay::catalog::{Catalog, TaskKindConfig};
use taskrelay::config::GameConfig;
use taskrelay::coordinator::{SessionCoordinator, SessionHandle};
use taskrelay::domain::{Phase, RoomCode, TaskId};
use taskrelay::net::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;

// =============================================================================
// Helpers
// =============================================================================

/// A catalog without multiplayer kinds so every player gets exactly one task
fn solo_catalog() -> Catalog {
    let kinds: Vec<TaskKindConfig> = [
        "FIREWALL_CONFIG",
        "PASSWORD_CRACK",
        "PACKET_SNIFF",
        "DECRYPT_FILE",
        "PORT_SCAN",
        "PURGE_LOGS",
    ]
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

fn game_config() -> GameConfig {
    GameConfig {
        seed: Some(7),
        ..GameConfig::default()
    }
}

fn spawn_session(config: GameConfig) -> SessionHandle {
    let coordinator = SessionCoordinator::new(
        RoomCode::parse("TESTAA").expect("valid room code"),
        Arc::new(config),
        Arc::new(solo_catalog()),
        64,
    );
    let handle = coordinator.handle();
    tokio::spawn(coordinator.run());
    handle
}

async fn recv_until<F>(rx: &mut mpsc::Receiver<ServerMessage>, mut matches: F) -> ServerMessage
where
    F: FnMut(&ServerMessage) -> bool,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("Timed out waiting for message")
            .expect("Connection channel closed");
        if matches(&message) {
            return message;
        }
    }
}

async fn join(handle: &SessionHandle, player: &str) -> mpsc::Receiver<ServerMessage> {
    let (tx, mut rx) = mpsc::channel(256);
    handle.connect(player, player, tx).await.expect("Failed to connect");
    let welcome = recv_until(&mut rx, |_| true).await;
    assert!(
        matches!(welcome, ServerMessage::Welcome { .. }),
        "expected welcome, got {:?}",
        welcome
    );
    rx
}

async fn next_task(rx: &mut mpsc::Receiver<ServerMessage>) -> TaskId {
    match recv_until(rx, |m| matches!(m, ServerMessage::NewTask { .. })).await {
        ServerMessage::NewTask { task } => task.id,
        _ => unreachable!(),
    }
}

/// Three players in a started game, with each player's first task
async fn started_game(
    config: GameConfig,
) -> (SessionHandle, Vec<mpsc::Receiver<ServerMessage>>, Vec<TaskId>) {
    let handle = spawn_session(config);
    let mut seats = Vec::new();
    for player in ["p1", "p2", "p3"] {
        seats.push(join(&handle, player).await);
    }

    handle
        .send(&"p1".to_string(), ClientMessage::StartGame)
        .await
        .expect("Failed to send start");

    let mut tasks = Vec::new();
    for rx in seats.iter_mut() {
        recv_until(rx, |m| matches!(m, ServerMessage::StartGame)).await;
        tasks.push(next_task(rx).await);
    }
    (handle, seats, tasks)
}

// =============================================================================
// Lobby
// =============================================================================

#[tokio::test]
async fn test_welcome_carries_state() {
    let handle = spawn_session(game_config());
    let (tx, mut rx) = mpsc::channel(16);
    handle.connect("p1", "Ada", tx).await.unwrap();

    match recv_until(&mut rx, |_| true).await {
        ServerMessage::Welcome { room, player_id, state } => {
            assert_eq!(room.as_str(), "TESTAA");
            assert_eq!(player_id, "p1");
            assert_eq!(state.host.as_deref(), Some("p1"));
            assert_eq!(state.phase, Phase::AwaitingStart);
            assert_eq!(state.players["p1"].name, "Ada");
        }
        other => panic!("expected welcome, got {:?}", other),
    }
}

#[tokio::test]
async fn test_existing_players_see_joins() {
    let handle = spawn_session(game_config());
    let mut p1 = join(&handle, "p1").await;
    let _p2 = join(&handle, "p2").await;

    let changed = recv_until(&mut p1, |m| matches!(m, ServerMessage::StateChanged { .. })).await;
    let ServerMessage::StateChanged { changes } = changed else {
        unreachable!()
    };
    let json = serde_json::to_string(&changes).unwrap();
    assert!(json.contains("\"playerSet\""));
    assert!(json.contains("\"p2\""));
}

#[tokio::test]
async fn test_start_needs_three_players() {
    let handle = spawn_session(game_config());
    let _p1 = join(&handle, "p1").await;
    let _p2 = join(&handle, "p2").await;

    handle.send(&"p1".to_string(), ClientMessage::StartGame).await.unwrap();

    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.phase, Phase::AwaitingStart);
    let metrics = handle.metrics().await.unwrap();
    assert_eq!(metrics.commands_rejected, 1);
    assert_eq!(metrics.connections, 2);
}

#[tokio::test]
async fn test_host_disconnect_transfers_host() {
    let handle = spawn_session(game_config());
    let _p1 = join(&handle, "p1").await;
    let _p2 = join(&handle, "p2").await;
    let _p3 = join(&handle, "p3").await;

    handle.disconnect("p1").await.unwrap();

    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.host.as_deref(), Some("p2"));
    assert_eq!(state.players.len(), 2);

    let _p4 = join(&handle, "p4").await;
    handle.send(&"p2".to_string(), ClientMessage::StartGame).await.unwrap();
    assert_eq!(handle.snapshot().await.unwrap().phase, Phase::RoundActive);
}

#[tokio::test]
async fn test_room_full_rejects_join() {
    let config = GameConfig {
        max_players: 3,
        ..game_config()
    };
    let handle = spawn_session(config);
    for player in ["p1", "p2", "p3"] {
        join(&handle, player).await;
    }

    let (tx, mut rx) = mpsc::channel(16);
    handle.connect("p4", "Dee", tx).await.unwrap();

    match recv_until(&mut rx, |_| true).await {
        ServerMessage::JoinRejected { reason } => assert!(reason.contains("full")),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(handle.snapshot().await.unwrap().players.len(), 3);
}

// =============================================================================
// Gameplay
// =============================================================================

#[tokio::test]
async fn test_start_game_deals_controls_and_tasks() {
    let (handle, _seats, tasks) = started_game(game_config()).await;

    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.phase, Phase::RoundActive);
    assert_eq!(state.round, 1);
    assert_eq!(state.quota, 15);
    assert_eq!(state.tasks.len(), 3);
    for task in &tasks {
        assert!(state.tasks.contains_key(task));
    }
    for player in state.players.values() {
        assert!(!player.controls.is_empty());
    }
}

#[tokio::test]
async fn test_join_rejected_once_started() {
    let (handle, _seats, _tasks) = started_game(game_config()).await;

    let (tx, mut rx) = mpsc::channel(16);
    handle.connect("late", "Late", tx).await.unwrap();

    assert!(matches!(
        recv_until(&mut rx, |_| true).await,
        ServerMessage::JoinRejected { .. }
    ));
}

#[tokio::test]
async fn test_complete_and_fail_race() {
    let (handle, mut seats, tasks) = started_game(game_config()).await;
    let p1 = "p1".to_string();

    handle
        .send(&p1, ClientMessage::TaskCompleted { task_id: tasks[0] })
        .await
        .unwrap();
    handle
        .send(
            &p1,
            ClientMessage::TaskFailed {
                task_id: tasks[0],
                health_penalty: Some(21),
            },
        )
        .await
        .unwrap();

    let outcome = recv_until(&mut seats[0], |m| {
        matches!(m, ServerMessage::TaskCompleted { .. } | ServerMessage::TaskFailed { .. })
    })
    .await;
    assert_eq!(outcome, ServerMessage::TaskCompleted { task_id: tasks[0] });

    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.health, 100);
    assert_eq!(state.tasks_done, 1);
    assert!(!state.tasks.contains_key(&tasks[0]));
}

#[tokio::test]
async fn test_request_task_for_unheld_control() {
    let (handle, mut seats, _tasks) = started_game(game_config()).await;
    let state = handle.snapshot().await.unwrap();
    let foreign = state.players["p2"].controls[0].clone();

    handle
        .send(
            &"p1".to_string(),
            ClientMessage::RequestTask {
                control: foreign.clone(),
            },
        )
        .await
        .unwrap();

    let reply = recv_until(&mut seats[0], |m| {
        matches!(
            m,
            ServerMessage::NoTaskForControl { .. } | ServerMessage::HasTaskForControl { .. }
        )
    })
    .await;
    assert_eq!(reply, ServerMessage::NoTaskForControl { control: foreign });
}

#[tokio::test]
async fn test_five_failures_end_the_game() {
    let (handle, mut seats, mut tasks) = started_game(game_config()).await;
    let players = ["p1", "p2", "p3"];

    for round in 0..5 {
        let seat = round % 3;
        handle
            .send(
                &players[seat].to_string(),
                ClientMessage::TaskFailed {
                    task_id: tasks[seat],
                    health_penalty: Some(21),
                },
            )
            .await
            .unwrap();
        if round < 4 {
            tasks[seat] = next_task(&mut seats[seat]).await;
        }
    }

    for rx in seats.iter_mut() {
        match recv_until(rx, |m| matches!(m, ServerMessage::GameOver { .. })).await {
            ServerMessage::GameOver { stats, health, round } => {
                assert_eq!(health, 0);
                assert_eq!(round, 1);
                assert_eq!(stats.total_failed, 5);
            }
            _ => unreachable!(),
        }
    }

    // Late messages change nothing and never repeat the game over
    handle
        .send(
            &"p2".to_string(),
            ClientMessage::TaskFailed {
                task_id: tasks[1],
                health_penalty: Some(21),
            },
        )
        .await
        .unwrap();
    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.phase, Phase::GameOver);
    assert_eq!(state.health, 0);
    assert!(state.tasks.is_empty());
    for rx in seats.iter_mut() {
        while let Ok(message) = rx.try_recv() {
            assert!(!matches!(message, ServerMessage::GameOver { .. }));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_round_clock_advances_round() {
    let config = GameConfig {
        round_time_secs: 3,
        ..game_config()
    };
    let (handle, mut seats, _tasks) = started_game(config).await;

    tokio::time::sleep(Duration::from_millis(3500)).await;

    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.round, 2);
    assert_eq!(state.phase, Phase::RoundActive);
    assert_eq!(state.timer, 0);

    // Every player is dealt a fresh hand for the new round
    for rx in seats.iter_mut() {
        recv_until(rx, |m| matches!(m, ServerMessage::Controls { .. })).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_clock_ticks_replicate() {
    let (handle, mut seats, _tasks) = started_game(game_config()).await;

    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert_eq!(handle.snapshot().await.unwrap().timer, 2);
    let changed = recv_until(&mut seats[2], |m| match m {
        ServerMessage::StateChanged { changes } => serde_json::to_string(changes).unwrap().contains("\"timer\""),
        _ => false,
    })
    .await;
    assert!(matches!(changed, ServerMessage::StateChanged { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_last_round_ends_game() {
    let config = GameConfig {
        round_time_secs: 2,
        max_rounds: 2,
        ..game_config()
    };
    let (handle, mut seats, _tasks) = started_game(config).await;

    tokio::time::sleep(Duration::from_millis(4500)).await;

    match recv_until(&mut seats[0], |m| matches!(m, ServerMessage::GameOver { .. })).await {
        ServerMessage::GameOver { round, health, stats } => {
            assert_eq!(round, 2);
            assert_eq!(health, 100);
            assert_eq!(stats.rounds_played, 2);
            assert_eq!(stats.total_time_secs, 4);
        }
        _ => unreachable!(),
    }
    assert_eq!(handle.snapshot().await.unwrap().phase, Phase::GameOver);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_session_closes_when_everyone_leaves() {
    let (handle, _seats, _tasks) = started_game(game_config()).await;

    for player in ["p1", "p2", "p3"] {
        handle.disconnect(player).await.unwrap();
    }

    for _ in 0..50 {
        if handle.is_closed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(handle.is_closed());
    assert!(handle.snapshot().await.is_err());
}

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let handle = spawn_session(game_config());
    let mut p1 = join(&handle, "p1").await;

    handle.shutdown().await.unwrap();

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while p1.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok(), "connection channel should close");
}
