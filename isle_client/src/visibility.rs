//! Fog of war.
//!
//! Sight is a Chebyshev square, not a circle: with range 5 the player sees an
//! 11x11 block centred on itself. The whole grid is rescanned on every call;
//! maps are small enough that no spatial index is needed.

use isle_shared::map::{TileMap, Visibility};

pub const DEFAULT_SIGHT_RANGE: u32 = 5;

/// `max(|dx|, |dy|)`.
pub fn chebyshev(ax: i32, ay: i32, bx: i32, by: i32) -> u32 {
    ax.abs_diff(bx).max(ay.abs_diff(by))
}

/// Next state of one tile given its distance from the viewer.
///
/// In range is always visible. Out of range, visible decays to explored and
/// everything else stays put, so explored never falls back to unseen.
pub fn classify(previous: Visibility, distance: u32, sight_range: u32) -> Visibility {
    if distance <= sight_range {
        Visibility::Visible
    } else if previous == Visibility::Visible {
        Visibility::Explored
    } else {
        previous
    }
}

/// Reclassifies every tile of `map` around `(origin_x, origin_y)`.
pub fn recompute(map: &mut TileMap, origin_x: i32, origin_y: i32, sight_range: u32) {
    for (x, y, tile) in map.iter_mut() {
        let distance = chebyshev(x, y, origin_x, origin_y);
        tile.visibility = classify(tile.visibility, distance, sight_range);
    }
}
