//! Session commands
//!
//! Every mutation of a session is a [`Command`]. A handler validates first
//! and returns a [`Rejection`] without touching state when the command is
//! stale or malformed; otherwise it mutates the session, pushes side effects
//! to the outbox, and returns follow-up commands for the sequencer to queue.

use rand::rngs::StdRng;
use tracing::{debug, info};

use super::messages::Rejection;
use super::outbox::{Effect, Outbox};
use crate::allocator;
use crate::assigner;
use crate::catalog::Catalog;
use crate::config::GameConfig;
use crate::domain::{Phase, Player, PlayerId, Session, Task, TaskId};
use crate::net::{ClientMessage, ServerMessage};

/// Everything a handler may touch besides the session
pub struct Context<'a> {
    pub config: &'a GameConfig,
    pub catalog: &'a Catalog,
    pub rng: &'a mut StdRng,
    pub outbox: &'a mut Outbox,
}

pub type CommandResult = Result<Vec<Command>, Rejection>;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Join { player: PlayerId, name: String },
    Leave { player: PlayerId },
    StartGame { player: PlayerId },
    RequestTask { player: PlayerId, control: String },
    AssignTask { task: Task, player: PlayerId },
    RefillPlayer { player: PlayerId },
    CompleteTask { player: PlayerId, task: TaskId },
    FailTask {
        player: PlayerId,
        task: TaskId,
        penalty: Option<u32>,
    },
    SubtractHealth { amount: u32 },
    Distraction { player: PlayerId },
    Tick { generation: u64 },
    EndRound { generation: u64 },
    BeginRound,
    EndGame,
}

impl Command {
    /// Translate a client message into the command it requests
    pub fn from_client(player: PlayerId, message: ClientMessage) -> Self {
        match message {
            ClientMessage::StartGame => Command::StartGame { player },
            ClientMessage::TaskCompleted { task_id } => Command::CompleteTask { player, task: task_id },
            ClientMessage::TaskFailed {
                task_id,
                health_penalty,
            } => Command::FailTask {
                player,
                task: task_id,
                penalty: health_penalty,
            },
            ClientMessage::RequestTask { control } => Command::RequestTask { player, control },
            ClientMessage::DistractionClicked => Command::Distraction { player },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Join { .. } => "join",
            Command::Leave { .. } => "leave",
            Command::StartGame { .. } => "start-game",
            Command::RequestTask { .. } => "request-task",
            Command::AssignTask { .. } => "assign-task",
            Command::RefillPlayer { .. } => "refill-player",
            Command::CompleteTask { .. } => "complete-task",
            Command::FailTask { .. } => "fail-task",
            Command::SubtractHealth { .. } => "subtract-health",
            Command::Distraction { .. } => "distraction",
            Command::Tick { .. } => "tick",
            Command::EndRound { .. } => "end-round",
            Command::BeginRound => "begin-round",
            Command::EndGame => "end-game",
        }
    }

    /// Commands that still run once the game is over
    ///
    /// Connections keep coming and going after the end screen; everything
    /// else is a no-op.
    pub fn runs_after_game_over(&self) -> bool {
        matches!(self, Command::Join { .. } | Command::Leave { .. })
    }

    /// Validate and run against the session
    pub fn execute(self, session: &mut Session, ctx: &mut Context<'_>) -> CommandResult {
        match self {
            Command::Join { player, name } => join(session, ctx, player, name),
            Command::Leave { player } => leave(session, player),
            Command::StartGame { player } => start_game(session, ctx, player),
            Command::RequestTask { player, control } => request_task(session, ctx, player, control),
            Command::AssignTask { task, player } => assign_task(session, ctx, task, player),
            Command::RefillPlayer { player } => refill_player(session, ctx, player),
            Command::CompleteTask { player, task } => complete_task(session, ctx, player, task),
            Command::FailTask { player, task, penalty } => fail_task(session, ctx, player, task, penalty),
            Command::SubtractHealth { amount } => subtract_health(session, amount),
            Command::Distraction { player } => distraction(session, player),
            Command::Tick { generation } => tick(session, generation),
            Command::EndRound { generation } => end_round(session, ctx, generation),
            Command::BeginRound => begin_round(session, ctx),
            Command::EndGame => end_game(session, ctx),
        }
    }
}

fn require_phase(session: &Session, phase: Phase) -> Result<(), Rejection> {
    if session.phase == phase {
        Ok(())
    } else {
        Err(Rejection::WrongPhase(session.phase))
    }
}

fn require_player<'s>(session: &'s Session, player: &str) -> Result<&'s Player, Rejection> {
    session
        .player(player)
        .ok_or_else(|| Rejection::UnknownPlayer(player.to_string()))
}

fn join(session: &mut Session, ctx: &mut Context<'_>, player: PlayerId, name: String) -> CommandResult {
    require_phase(session, Phase::AwaitingStart)?;
    if session.player(&player).is_some() {
        return Err(Rejection::DuplicatePlayer(player));
    }
    if session.players.len() >= ctx.config.max_players {
        return Err(Rejection::RoomFull(session.players.len()));
    }

    info!(room = %session.room, player_id = %player, %name, "Player joined");
    session.add_player(Player::new(player, name));
    Ok(Vec::new())
}

fn leave(session: &mut Session, player: PlayerId) -> CommandResult {
    let removed = session
        .remove_player(&player)
        .ok_or_else(|| Rejection::UnknownPlayer(player.clone()))?;

    info!(
        room = %session.room,
        player_id = %player,
        orphaned_task = ?removed.active_task,
        released_controls = removed.controls.len(),
        "Player left"
    );
    Ok(Vec::new())
}

fn start_game(session: &mut Session, ctx: &mut Context<'_>, player: PlayerId) -> CommandResult {
    require_phase(session, Phase::AwaitingStart)?;
    if !session.is_host(&player) {
        return Err(Rejection::NotHost(player));
    }
    if session.players.len() < ctx.config.min_players {
        return Err(Rejection::NotEnoughPlayers {
            have: session.players.len(),
            need: ctx.config.min_players,
        });
    }

    info!(room = %session.room, players = session.players.len(), "Game started");
    ctx.outbox.broadcast(ServerMessage::StartGame);
    session.phase = Phase::RoundTransition;
    session.round = 0;
    Ok(vec![Command::BeginRound])
}

fn request_task(session: &mut Session, ctx: &mut Context<'_>, player: PlayerId, control: String) -> CommandResult {
    require_phase(session, Phase::RoundActive)?;
    let requester = require_player(session, &player)?;

    if !requester.holds(&control) {
        debug!(player_id = %player, %control, "request_task: control not held");
        ctx.outbox.send(&player, ServerMessage::NoTaskForControl { control });
        return Ok(Vec::new());
    }
    if let Some(active) = requester.active_task {
        debug!(player_id = %player, %control, active, "request_task: requester busy");
        ctx.outbox.send(&player, ServerMessage::NoTaskForControl { control });
        return Ok(Vec::new());
    }

    match session.pool.resolve_by_control(&control) {
        Some(task) => {
            debug!(player_id = %player, task_id = task.id, "request_task: resolved");
            ctx.outbox
                .send(&player, ServerMessage::HasTaskForControl { task: task.clone() });
            Ok(vec![Command::AssignTask { task, player }])
        }
        None => {
            debug!(player_id = %player, %control, "request_task: nothing queued");
            ctx.outbox.send(&player, ServerMessage::NoTaskForControl { control });
            Ok(Vec::new())
        }
    }
}

fn assign_task(session: &mut Session, ctx: &mut Context<'_>, task: Task, player: PlayerId) -> CommandResult {
    // A round that ended while this was queued already dropped its tasks
    require_phase(session, Phase::RoundActive)?;
    let assignee = assigner::assign(session, task, &player, ctx.outbox)?;
    if assignee != player {
        // The task went to a substitute; the requester is still idle
        debug!(requester = %player, %assignee, "assign_task: substituted, refilling requester");
        return Ok(vec![Command::RefillPlayer { player }]);
    }
    Ok(Vec::new())
}

fn refill_player(session: &mut Session, ctx: &mut Context<'_>, player: PlayerId) -> CommandResult {
    require_phase(session, Phase::RoundActive)?;
    let target = require_player(session, &player)?;
    if let Some(task) = target.active_task {
        // Already served, e.g. as a substitute for someone else's refill
        debug!(player_id = %player, task, "refill_player: player busy, nothing to do");
        return Ok(Vec::new());
    }

    let task = match session.pool.next_unassigned() {
        Some(task) => task,
        None => {
            // Pool ran dry before the quota; top it up on demand
            session.pool.generate_one(ctx.catalog, ctx.rng);
            match session.pool.next_unassigned() {
                Some(task) => task,
                None => return Ok(Vec::new()),
            }
        }
    };
    // Bind in the same step so no other assignment can reach this player
    // between the idle check and the claim
    assign_task(session, ctx, task, player)
}

/// Outcome of resolving an active task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Completed,
    Failed,
}

/// Shared path for completion and failure
///
/// Whichever resolution reaches the sequencer first removes the task from the
/// active set; the loser fails validation with `UnknownTask`.
fn resolve(
    session: &mut Session,
    ctx: &mut Context<'_>,
    player: &str,
    task_id: TaskId,
    resolution: Resolution,
) -> Result<PlayerId, Rejection> {
    require_phase(session, Phase::RoundActive)?;
    let active = session.pool.active(task_id).ok_or(Rejection::UnknownTask(task_id))?;
    if active.task.completed {
        return Err(Rejection::AlreadyResolved(task_id));
    }
    let is_helper = session
        .pool
        .helpers(task_id)
        .is_some_and(|helpers| helpers.iter().any(|p| p == player));
    if active.assignee != player && !is_helper {
        return Err(Rejection::NotAssignee {
            task: task_id,
            player: player.to_string(),
        });
    }

    let Some(mut resolved) = session.pool.take_active(task_id) else {
        return Err(Rejection::UnknownTask(task_id));
    };
    resolved.task.completed = resolution == Resolution::Completed;
    let assignee = resolved.assignee;

    if let Some(owner) = session.player_mut(&assignee) {
        if owner.active_task == Some(task_id) {
            owner.active_task = None;
        }
    }

    let message = match resolution {
        Resolution::Completed => {
            session.tasks_done += 1;
            session.stats.total_completed += 1;
            ServerMessage::TaskCompleted { task_id }
        }
        Resolution::Failed => {
            session.tasks_failed += 1;
            session.stats.total_failed += 1;
            ServerMessage::TaskFailed { task_id }
        }
    };
    ctx.outbox.send(&assignee, message);

    info!(
        task_id,
        kind = %resolved.task.kind,
        %assignee,
        ?resolution,
        tasks_done = session.tasks_done,
        "Task resolved"
    );
    Ok(assignee)
}

fn refill_after(ctx: &Context<'_>, assignee: PlayerId) -> Option<Command> {
    ctx.config.auto_refill.then_some(Command::RefillPlayer { player: assignee })
}

fn complete_task(session: &mut Session, ctx: &mut Context<'_>, player: PlayerId, task: TaskId) -> CommandResult {
    let assignee = resolve(session, ctx, &player, task, Resolution::Completed)?;
    Ok(refill_after(ctx, assignee).into_iter().collect())
}

fn fail_task(
    session: &mut Session,
    ctx: &mut Context<'_>,
    player: PlayerId,
    task: TaskId,
    penalty: Option<u32>,
) -> CommandResult {
    let assignee = resolve(session, ctx, &player, task, Resolution::Failed)?;
    let amount = penalty.unwrap_or(ctx.config.failure_penalty);

    let mut follow_ups = vec![Command::SubtractHealth { amount }];
    follow_ups.extend(refill_after(ctx, assignee));
    Ok(follow_ups)
}

fn subtract_health(session: &mut Session, amount: u32) -> CommandResult {
    let before = session.health;
    session.health = session.health.saturating_sub(amount);
    info!(room = %session.room, before, after = session.health, amount, "Health lost");

    if session.health == 0 {
        Ok(vec![Command::EndGame])
    } else {
        Ok(Vec::new())
    }
}

fn distraction(session: &mut Session, player: PlayerId) -> CommandResult {
    require_phase(session, Phase::RoundActive)?;
    require_player(session, &player)?;
    session.stats.total_distraction_clicks += 1;
    Ok(Vec::new())
}

fn require_generation(session: &Session, generation: u64) -> Result<(), Rejection> {
    if session.generation == generation {
        Ok(())
    } else {
        Err(Rejection::StaleGeneration {
            got: generation,
            current: session.generation,
        })
    }
}

fn tick(session: &mut Session, generation: u64) -> CommandResult {
    require_phase(session, Phase::RoundActive)?;
    require_generation(session, generation)?;
    session.timer += 1;
    session.stats.total_time_secs += 1;
    Ok(Vec::new())
}

fn end_round(session: &mut Session, ctx: &mut Context<'_>, generation: u64) -> CommandResult {
    require_phase(session, Phase::RoundActive)?;
    require_generation(session, generation)?;

    info!(
        room = %session.room,
        round = session.round,
        timer = session.timer,
        tasks_done = session.tasks_done,
        "Round ended"
    );
    session.phase = Phase::RoundTransition;
    session.reset_tasks();
    ctx.outbox.push(Effect::CancelRoundTimer);

    match ctx.config.round_break() {
        Some(delay) => {
            ctx.outbox.push(Effect::Schedule {
                delay,
                command: Command::BeginRound,
            });
            Ok(Vec::new())
        }
        None => Ok(vec![Command::BeginRound]),
    }
}

fn begin_round(session: &mut Session, ctx: &mut Context<'_>) -> CommandResult {
    require_phase(session, Phase::RoundTransition)?;

    let next = session.round + 1;
    if next > ctx.config.max_rounds {
        info!(room = %session.room, rounds = session.round, "Final round finished");
        return Ok(vec![Command::EndGame]);
    }

    session.round = next;
    session.generation += 1;
    session.timer = 0;
    session.tasks_done = 0;
    session.tasks_failed = 0;
    session.reset_tasks();

    let universe = ctx.catalog.controls();
    allocator::reallocate(session, &universe, ctx.config.controls_per_player_cap, ctx.rng);
    for player in &session.players {
        ctx.outbox.send(
            &player.id,
            ServerMessage::Controls {
                controls: player.controls.clone(),
            },
        );
    }

    let quota = ctx.config.quota_for_round(session.round);
    session.pool.generate_batch(ctx.catalog, quota as usize, ctx.rng);

    session.phase = Phase::RoundActive;
    session.stats.rounds_played += 1;
    ctx.outbox.push(Effect::StartRoundTimer {
        generation: session.generation,
    });
    info!(
        room = %session.room,
        round = session.round,
        generation = session.generation,
        quota,
        "Round started"
    );

    // Idleness is checked when each refill runs, since a multiplayer task
    // may land on a later player first
    Ok(session
        .players
        .iter()
        .filter(|p| p.is_idle())
        .map(|p| Command::RefillPlayer { player: p.id.clone() })
        .collect())
}

fn end_game(session: &mut Session, ctx: &mut Context<'_>) -> CommandResult {
    if session.is_game_over() {
        return Err(Rejection::GameOver);
    }

    info!(
        room = %session.room,
        round = session.round,
        health = session.health,
        completed = session.stats.total_completed,
        failed = session.stats.total_failed,
        "Game over"
    );
    session.phase = Phase::GameOver;
    session.reset_tasks();
    ctx.outbox.push(Effect::CancelRoundTimer);
    ctx.outbox.broadcast(ServerMessage::GameOver {
        stats: session.stats.clone(),
        round: session.round,
        health: session.health,
    });
    Ok(Vec::new())
}
