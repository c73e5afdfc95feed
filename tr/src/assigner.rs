//! Player task assignment
//!
//! Binds a claimed task to a player, keeping the one-active-task-per-player
//! rule. Multiplayer tasks also get a helper set: the assignee plus everyone
//! holding the task's control token.

use tracing::{debug, info, warn};

use crate::coordinator::{Outbox, Rejection};
use crate::domain::{PlayerId, Session, Task};
use crate::net::ServerMessage;

/// Bind `task` to `requester`, or to a substitute for multiplayer tasks
///
/// On failure the task goes back to the unassigned queue. Sequenced command
/// execution makes the busy check race-free: two claims for one player can
/// never interleave.
pub fn assign(session: &mut Session, task: Task, requester: &str, outbox: &mut Outbox) -> Result<PlayerId, Rejection> {
    debug!(task_id = task.id, %requester, "assign: called");

    let Some(player) = session.player(requester) else {
        debug!(task_id = task.id, %requester, "assign: requester gone, returning task");
        session.pool.return_task(task);
        return Err(Rejection::UnknownPlayer(requester.to_string()));
    };

    if let Some(active) = player.active_task {
        debug!(task_id = task.id, %requester, active, "assign: requester busy, returning task");
        session.pool.return_task(task);
        return Err(Rejection::PlayerBusy {
            player: requester.to_string(),
            task: active,
        });
    }

    let assignee = if task.multiplayer {
        let assignee = pick_multiplayer_assignee(session, &task, requester);
        let helpers = helper_set(session, &task, &assignee);
        if helpers.len() < 2 {
            warn!(
                task_id = task.id,
                control = %task.control,
                "No other player holds the control for a multiplayer task"
            );
        }
        debug!(task_id = task.id, ?helpers, "assign: recorded helpers");
        session.pool.record_helpers(task.id, helpers);
        assignee
    } else {
        requester.to_string()
    };

    if let Some(player) = session.player_mut(&assignee) {
        player.active_task = Some(task.id);
    }
    info!(task_id = task.id, kind = %task.kind, %assignee, "Task assigned");
    outbox.send(&assignee, ServerMessage::NewTask { task: task.clone() });
    session.pool.activate(task, assignee.clone());

    Ok(assignee)
}

/// A requester who holds the control could solve the task alone, so hand it
/// to an idle player who does not, preferring players helping with nothing
fn pick_multiplayer_assignee(session: &Session, task: &Task, requester: &str) -> PlayerId {
    let requester_holds = session.player(requester).is_some_and(|p| p.holds(&task.control));
    if !requester_holds {
        return requester.to_string();
    }

    let substitute = session
        .players
        .iter()
        .enumerate()
        .filter(|(_, p)| p.id != requester && p.is_idle() && !p.holds(&task.control))
        .min_by_key(|(index, p)| (session.pool.co_assigned_count(&p.id), *index))
        .map(|(_, p)| p.id.clone());

    match substitute {
        Some(id) => {
            debug!(task_id = task.id, %requester, substitute = %id, "pick_multiplayer_assignee: substituted");
            id
        }
        None => {
            warn!(
                task_id = task.id,
                %requester,
                "No eligible substitute for multiplayer task; requester keeps it"
            );
            requester.to_string()
        }
    }
}

/// The assignee first, then every other holder of the control in join order
fn helper_set(session: &Session, task: &Task, assignee: &str) -> Vec<PlayerId> {
    let mut helpers = vec![assignee.to_string()];
    helpers.extend(
        session
            .players
            .iter()
            .filter(|p| p.id != assignee && p.holds(&task.control))
            .map(|p| p.id.clone()),
    );
    helpers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::domain::{Player, RoomCode};

    fn session(players: &[(&str, &[&str])]) -> Session {
        let mut session = Session::new(RoomCode::parse("ABCDEF").unwrap(), 100);
        for (id, controls) in players {
            let mut player = Player::new(*id, *id);
            player.controls = controls.iter().map(|c| c.to_string()).collect();
            session.add_player(player);
        }
        session
    }

    fn task(id: u64, kind: &str) -> Task {
        Task::new(id, Catalog::builtin().get(kind).unwrap())
    }

    #[test]
    fn test_assign_single_player_task() {
        let mut s = session(&[("p1", &[]), ("p2", &["PORT_SCAN_CONTROL"])]);
        let mut outbox = Outbox::new();

        let assignee = assign(&mut s, task(1, "PORT_SCAN"), "p1", &mut outbox).unwrap();

        assert_eq!(assignee, "p1");
        assert_eq!(s.player("p1").unwrap().active_task, Some(1));
        assert_eq!(s.pool.active(1).unwrap().assignee, "p1");
        assert!(matches!(outbox.sent_to("p1")[0], ServerMessage::NewTask { task } if task.id == 1));
        assert!(outbox.sent_to("p2").is_empty());
    }

    #[test]
    fn test_busy_player_returns_task() {
        let mut s = session(&[("p1", &[])]);
        let mut outbox = Outbox::new();
        assign(&mut s, task(1, "PORT_SCAN"), "p1", &mut outbox).unwrap();

        let err = assign(&mut s, task(2, "DECRYPT_FILE"), "p1", &mut outbox).unwrap_err();

        assert_eq!(
            err,
            Rejection::PlayerBusy {
                player: "p1".to_string(),
                task: 1
            }
        );
        assert_eq!(s.pool.unassigned().map(|t| t.id).collect::<Vec<_>>(), vec![2]);
        assert_eq!(s.pool.active_len(), 1);
    }

    #[test]
    fn test_missing_player_returns_task() {
        let mut s = session(&[("p1", &[])]);
        let mut outbox = Outbox::new();

        let err = assign(&mut s, task(1, "PORT_SCAN"), "ghost", &mut outbox).unwrap_err();

        assert_eq!(err, Rejection::UnknownPlayer("ghost".to_string()));
        assert_eq!(s.pool.unassigned_len(), 1);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_multiplayer_helpers_include_control_holders() {
        let mut s = session(&[("p1", &[]), ("p2", &["PATCH_KERNEL_CONTROL"]), ("p3", &[])]);
        let mut outbox = Outbox::new();

        let assignee = assign(&mut s, task(1, "PATCH_KERNEL"), "p1", &mut outbox).unwrap();

        assert_eq!(assignee, "p1");
        assert_eq!(s.pool.helpers(1).unwrap(), &["p1".to_string(), "p2".to_string()]);
    }

    #[test]
    fn test_multiplayer_substitutes_when_requester_holds_control() {
        let mut s = session(&[("p1", &["PATCH_KERNEL_CONTROL"]), ("p2", &[]), ("p3", &[])]);
        let mut outbox = Outbox::new();

        let assignee = assign(&mut s, task(1, "PATCH_KERNEL"), "p1", &mut outbox).unwrap();

        assert_eq!(assignee, "p2");
        assert!(s.player("p1").unwrap().is_idle());
        assert_eq!(s.player("p2").unwrap().active_task, Some(1));
        assert_eq!(s.pool.helpers(1).unwrap(), &["p2".to_string(), "p1".to_string()]);
        assert!(outbox.sent_to("p1").is_empty());
    }

    #[test]
    fn test_substitute_prefers_players_without_co_assignments() {
        let mut s = session(&[("p1", &["PATCH_KERNEL_CONTROL"]), ("p2", &[]), ("p3", &[])]);
        s.pool
            .record_helpers(99, vec!["p4".to_string(), "p2".to_string()]);
        let mut outbox = Outbox::new();

        let assignee = assign(&mut s, task(1, "PATCH_KERNEL"), "p1", &mut outbox).unwrap();

        assert_eq!(assignee, "p3");
    }

    #[test]
    fn test_requester_keeps_task_without_substitute() {
        let mut s = session(&[("p1", &["PATCH_KERNEL_CONTROL"]), ("p2", &["PATCH_KERNEL_CONTROL"])]);
        let mut outbox = Outbox::new();

        let assignee = assign(&mut s, task(1, "PATCH_KERNEL"), "p1", &mut outbox).unwrap();

        assert_eq!(assignee, "p1");
        assert_eq!(s.pool.helpers(1).unwrap(), &["p1".to_string(), "p2".to_string()]);
    }
}
