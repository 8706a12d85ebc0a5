use std::time::Duration;

/// Keeps consecutive calls at least `delay` apart. The first call goes out
/// straight away.
pub struct Pacer {
    delay: Duration,
    started: bool,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Pacer {
            delay,
            started: false,
        }
    }

    pub async fn wait(&mut self) {
        if self.started && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.started = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn first_call_is_not_delayed() {
        let mut pacer = Pacer::new(Duration::from_secs(1));
        let started = Instant::now();

        pacer.wait().await;
        assert_eq!(started.elapsed(), Duration::ZERO);

        pacer.wait().await;
        pacer.wait().await;
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_never_sleeps() {
        let mut pacer = Pacer::new(Duration::ZERO);
        let started = Instant::now();
        for _ in 0..5 {
            pacer.wait().await;
        }
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
