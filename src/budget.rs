use std::sync::atomic::{AtomicU32, Ordering};

use tracing::warn;

#[derive(Debug)]
pub struct BudgetGuard {
    cap: u32,
    used: AtomicU32,
}

impl BudgetGuard {
    pub fn new(cap: u32) -> Self {
        Self {
            cap,
            used: AtomicU32::new(0),
        }
    }

    pub fn try_consume(&self) -> bool {
        let consumed = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < self.cap).then_some(used + 1)
            })
            .is_ok();
        if !consumed {
            warn!(cap = self.cap, "provider call budget exhausted");
        }
        consumed
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> u32 {
        self.cap.saturating_sub(self.used())
    }

    pub fn is_exhausted(&self) -> bool {
        self.used() >= self.cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_cap_and_stays_exhausted() {
        let budget = BudgetGuard::new(3);
        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert_eq!(budget.remaining(), 1);
        assert!(budget.try_consume());
        assert!(budget.is_exhausted());
        assert!(!budget.try_consume());
        assert!(!budget.try_consume());
        assert_eq!(budget.used(), 3);
    }

    #[test]
    fn zero_cap_rejects_everything() {
        let budget = BudgetGuard::new(0);
        assert!(!budget.try_consume());
        assert_eq!(budget.remaining(), 0);
    }
}
