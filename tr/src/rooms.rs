//! Room registry
//!
//! Maps room codes to running sessions. Each room gets its own coordinator
//! task; the registry forgets the room once that task finishes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::config::GameConfig;
use crate::coordinator::{SessionCoordinator, SessionHandle};
use crate::domain::RoomCode;

/// Process-wide table of open rooms
#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<Mutex<HashMap<RoomCode, SessionHandle>>>,
    config: Arc<GameConfig>,
    catalog: Arc<Catalog>,
    channel_buffer: usize,
}

impl RoomRegistry {
    pub fn new(config: GameConfig, catalog: Catalog, channel_buffer: usize) -> Self {
        debug!(channel_buffer, kinds = catalog.len(), "RoomRegistry::new: called");
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            channel_buffer,
        }
    }

    /// Open a room under a fresh code and start its session
    pub async fn create_room(&self) -> SessionHandle {
        let mut rooms = self.rooms.lock().await;
        let code = generate_unique_room_code(&rooms);

        let coordinator = SessionCoordinator::new(
            code.clone(),
            self.config.clone(),
            self.catalog.clone(),
            self.channel_buffer,
        );
        let handle = coordinator.handle();
        rooms.insert(code.clone(), handle.clone());
        info!(room = %code, open_rooms = rooms.len(), "Room created");

        let registry = self.rooms.clone();
        tokio::spawn(async move {
            coordinator.run().await;
            let mut rooms = registry.lock().await;
            rooms.remove(&code);
            info!(room = %code, open_rooms = rooms.len(), "Room disposed");
        });

        handle
    }

    pub async fn get(&self, code: &RoomCode) -> Option<SessionHandle> {
        self.rooms.lock().await.get(code).cloned()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn codes(&self) -> Vec<RoomCode> {
        let mut codes: Vec<RoomCode> = self.rooms.lock().await.keys().cloned().collect();
        codes.sort();
        codes
    }

    /// Ask every session to stop
    pub async fn shutdown_all(&self) {
        let handles: Vec<SessionHandle> = self.rooms.lock().await.values().cloned().collect();
        info!(rooms = handles.len(), "Shutting down all rooms");
        for handle in handles {
            if let Err(e) = handle.shutdown().await {
                debug!(room = %handle.room(), error = %e, "shutdown_all: session already gone");
            }
        }
    }
}

/// Codes are only unique within this process
fn generate_unique_room_code(existing: &HashMap<RoomCode, SessionHandle>) -> RoomCode {
    let mut rng = rand::rng();
    loop {
        let code = RoomCode::generate(&mut rng);
        if !existing.contains_key(&code) {
            return code;
        }
        debug!(room = %code, "generate_unique_room_code: collision, retrying");
    }
}
