//! Input handling.
//!
//! Keyboard capture belongs to the host. This module only turns a key into a
//! game intent, honouring the fishing panel: while it is on screen every key
//! except the catch key is swallowed.

use isle_shared::protocol::Direction;

/// Key that attempts a catch.
pub const CATCH_KEY: char = ' ';

/// A game action requested by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Move(Direction),
    Fish,
    CatchAttempt,
}

/// Maps one key press to an intent.
pub fn map_key(key: char, panel_open: bool) -> Option<Intent> {
    if panel_open {
        return (key == CATCH_KEY).then_some(Intent::CatchAttempt);
    }
    match key.to_ascii_lowercase() {
        'w' => Some(Intent::Move(Direction::Up)),
        'a' => Some(Intent::Move(Direction::Left)),
        's' => Some(Intent::Move(Direction::Down)),
        'd' => Some(Intent::Move(Direction::Right)),
        'f' => Some(Intent::Fish),
        _ => None,
    }
}
