use std::time::Duration;

/// Runtime knobs for the arena. Gameplay constants that clients also rely
/// on live in `shared`.
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    /// Grace period once two seats are filled, in seconds.
    pub lobby_secs: u32,
    pub countdown_secs: u32,
    pub main_tick: Duration,
    pub mini_tick: Duration,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    /// Sockets that have not finished the upgrade by then are dropped.
    pub handshake_timeout: Duration,
    /// Share of free cells that get a weak wall at level start.
    pub weak_wall_density: f64,
    /// Fixed seed for level generation and death drops.
    pub seed: Option<u64>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            lobby_secs: 20,
            countdown_secs: 10,
            main_tick: Duration::from_millis(17),
            mini_tick: Duration::from_millis(50),
            ping_interval: Duration::from_secs(15),
            pong_timeout: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(10),
            weak_wall_density: 0.55,
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let config = ArenaConfig::default();
        assert!(config.main_tick < config.mini_tick);
        assert!(config.pong_timeout > config.ping_interval);
        assert!(config.handshake_timeout < config.pong_timeout);
        assert!(config.lobby_secs > 0 && config.countdown_secs > 0);
        assert!((0.0..=1.0).contains(&config.weak_wall_density));
    }
}
