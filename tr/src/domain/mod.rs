//! Domain types for TaskRelay
//!
//! The shared session state every command reads and writes: the session
//! aggregate, its players, and the tasks in play.

mod id;
mod session;
mod task;

pub use id::{PlayerId, ROOM_CODE_ALPHABET, ROOM_CODE_LEN, RoomCode, TaskId, new_player_id};
pub use session::{Phase, Player, Session, SessionStats};
pub use task::Task;
