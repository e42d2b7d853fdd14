use tokio::time::{Duration, Instant};

/// Tracks how long a sensor stream has been quiet
#[derive(Clone, Debug)]
pub struct SensorHealth {
    pub name: String,
    last_update: Instant,
    silence_threshold: Duration,
    reported: bool,
}

impl SensorHealth {
    pub fn new(name: &str, silence_threshold_secs: u64) -> Self {
        SensorHealth {
            name: name.to_string(),
            last_update: Instant::now(),
            silence_threshold: Duration::from_secs(silence_threshold_secs),
            reported: false,
        }
    }

    pub fn update(&mut self) {
        self.last_update = Instant::now();
        if self.reported {
            log::info!("{} is back", self.name);
            self.reported = false;
        }
    }

    pub fn time_since_last_update(&self) -> Duration {
        self.last_update.elapsed()
    }

    pub fn is_silent(&self) -> bool {
        self.time_since_last_update() > self.silence_threshold
    }

    /// True exactly once per silence episode
    pub fn check(&mut self) -> bool {
        if self.is_silent() && !self.reported {
            self.reported = true;
            log::warn!(
                "{} silent for {:.1}s",
                self.name,
                self.time_since_last_update().as_secs_f64()
            );
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_reports_once_per_episode() {
        let mut health = SensorHealth::new("GPS", 30);
        assert!(!health.check());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(health.is_silent());
        assert!(health.check());
        assert!(!health.check());

        health.update();
        assert!(!health.is_silent());
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(health.check());
    }
}
