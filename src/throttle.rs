use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Geocode,
    PlaceSearch,
    PlaceDetails,
}

impl Lane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Geocode => "geocode",
            Lane::PlaceSearch => "place_search",
            Lane::PlaceDetails => "place_details",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval: Duration,
    last_dispatch: Option<Instant>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_dispatch: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn next_allowed_dispatch_delay(&self, now: Instant) -> Duration {
        match self.last_dispatch {
            Some(prev) => self
                .min_interval
                .saturating_sub(now.saturating_duration_since(prev)),
            None => Duration::ZERO,
        }
    }

    pub fn mark_dispatched(&mut self, now: Instant) {
        self.last_dispatch = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_dispatch_is_immediate() {
        let throttle = Throttle::new(Duration::from_millis(1_200));
        assert_eq!(
            throttle.next_allowed_dispatch_delay(Instant::now()),
            Duration::ZERO
        );
    }

    #[test]
    fn waits_out_the_remaining_interval() {
        let mut throttle = Throttle::new(Duration::from_millis(1_200));
        let start = Instant::now();
        throttle.mark_dispatched(start);

        let delay = throttle.next_allowed_dispatch_delay(start + Duration::from_millis(200));
        assert_eq!(delay, Duration::from_millis(1_000));

        let delay = throttle.next_allowed_dispatch_delay(start + Duration::from_secs(5));
        assert_eq!(delay, Duration::ZERO);
    }

    #[test]
    fn clock_skew_never_underflows() {
        let mut throttle = Throttle::new(Duration::from_millis(500));
        let later = Instant::now() + Duration::from_secs(1);
        throttle.mark_dispatched(later);
        let delay = throttle.next_allowed_dispatch_delay(later - Duration::from_millis(100));
        assert_eq!(delay, Duration::from_millis(500));
    }
}
