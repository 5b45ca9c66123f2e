//! Interpolation.
//!
//! The server only ever sends discrete grid coordinates. Each frame the
//! client eases every player's render position toward its grid position with
//! exponential smoothing, `render += (target - render) * dt / 100`.
//!
//! The factor is clamped to `[0, 1]`: a frame of 100ms or more lands exactly
//! on the target instead of overshooting it.

use crate::world::{Player, World};

/// Frame time over which a player covers the full remaining distance.
pub const SMOOTHING_WINDOW_MS: f32 = 100.0;

/// Per-frame smoothing of render positions.
#[derive(Debug, Clone, Copy)]
pub struct RenderInterpolator {
    window_ms: f32,
}

impl Default for RenderInterpolator {
    fn default() -> Self {
        Self {
            window_ms: SMOOTHING_WINDOW_MS,
        }
    }
}

impl RenderInterpolator {
    pub fn new(window_ms: f32) -> Self {
        Self { window_ms }
    }

    /// Smoothing factor for a frame of `dt_ms`.
    pub fn factor(&self, dt_ms: f32) -> f32 {
        if self.window_ms <= 0.0 {
            return 1.0;
        }
        (dt_ms / self.window_ms).clamp(0.0, 1.0)
    }

    /// Advances one player's render position.
    pub fn step(&self, player: &mut Player, dt_ms: f32) {
        let t = self.factor(dt_ms);
        player.render_x += (player.x as f32 - player.render_x) * t;
        player.render_y += (player.y as f32 - player.render_y) * t;
    }

    /// Advances every player in the world.
    pub fn tick(&self, world: &mut World, dt_ms: f32) {
        for player in world.players_mut() {
            self.step(player, dt_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isle_shared::protocol::{PlayerData, PlayerId};

    fn player_at(x: i32, y: i32, render: (f32, f32)) -> Player {
        let mut p = Player::from_data(PlayerData::new(PlayerId::new("p"), x, y));
        p.render_x = render.0;
        p.render_y = render.1;
        p
    }

    #[test]
    fn half_window_moves_half_way() {
        let interp = RenderInterpolator::default();
        let mut p = player_at(10, 0, (0.0, 0.0));
        interp.step(&mut p, 50.0);
        assert!((p.render_x - 5.0).abs() < 1e-5);
        assert_eq!(p.render_y, 0.0);
    }

    #[test]
    fn long_frames_land_on_target() {
        let interp = RenderInterpolator::default();
        let mut p = player_at(3, -2, (0.0, 0.0));
        interp.step(&mut p, 250.0);
        assert_eq!((p.render_x, p.render_y), (3.0, -2.0));
    }

    #[test]
    fn converges_for_any_nonzero_frame_time() {
        let interp = RenderInterpolator::default();
        for dt in [0.5_f32, 1.0, 16.0, 33.3, 99.0, 100.0, 150.0, 1000.0] {
            let mut p = player_at(7, 4, (-3.0, 12.0));
            for _ in 0..20_000 {
                interp.step(&mut p, dt);
            }
            assert!((p.render_x - 7.0).abs() < 1e-3, "dt={dt} x={}", p.render_x);
            assert!((p.render_y - 4.0).abs() < 1e-3, "dt={dt} y={}", p.render_y);
        }
    }

    #[test]
    fn never_touches_grid_position() {
        let interp = RenderInterpolator::default();
        let mut p = player_at(2, 2, (9.0, 9.0));
        interp.step(&mut p, 16.0);
        assert_eq!((p.x, p.y), (2, 2));
    }

    #[test]
    fn tick_moves_every_player() {
        let mut world = World::new(PlayerId::new("me"), 5);
        world.upsert_player(&PlayerData::new(PlayerId::new("a"), 0, 0));
        world.upsert_player(&PlayerData::new(PlayerId::new("a"), 4, 0));
        world.upsert_player(&PlayerData::new(PlayerId::new("me"), 0, 8));

        RenderInterpolator::default().tick(&mut world, 100.0);
        for p in world.players() {
            assert_eq!((p.render_x, p.render_y), (p.x as f32, p.y as f32));
        }
    }
}
