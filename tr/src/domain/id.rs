//! Room codes and identity generation
//!
//! Room codes are six characters drawn from an alphabet without look-alike
//! glyphs (no `0/O`, `1/I/L`), e.g. `K7QX4M`.

use rand::Rng;

/// Characters a room code may contain
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of every room code
pub const ROOM_CODE_LEN: usize = 6;

/// Session identity of a connected player
pub type PlayerId = String;

/// Task identifier, monotonic for the lifetime of a session
pub type TaskId = u64;

/// Generate a fresh player identity
pub fn new_player_id() -> PlayerId {
    uuid::Uuid::now_v7().to_string()
}

/// Six-character room code
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomCode(String);

impl RoomCode {
    /// Generate a random room code
    ///
    /// Not checked for collisions; the room registry retries on clashes.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..ROOM_CODE_LEN)
            .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Parse user input, accepting lowercase and surrounding whitespace
    pub fn parse(input: &str) -> Option<Self> {
        let code = input.trim().to_ascii_uppercase();
        Self::is_valid(&code).then_some(Self(code))
    }

    /// Check that a string is a well-formed room code
    pub fn is_valid(code: &str) -> bool {
        code.len() == ROOM_CODE_LEN && code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RoomCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for RoomCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for RoomCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid room code: {}", s)))
    }
}
