use serde::{Deserialize, Serialize};

/// Maximum number of messages tolerated in one alert window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertThreshold {
    max_messages_per_window: u64,
}

impl AlertThreshold {
    /// Returns `None` for zero; the threshold must be positive.
    pub fn new(max_messages_per_window: u64) -> Option<Self> {
        (max_messages_per_window > 0).then_some(Self {
            max_messages_per_window,
        })
    }

    pub fn get(&self) -> u64 {
        self.max_messages_per_window
    }
}

/// True iff `observed_count` strictly exceeds the threshold.
/// Exactly-at-threshold does not alert.
pub fn should_alert(observed_count: u64, threshold: AlertThreshold) -> bool {
    observed_count > threshold.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_greater_alerts() {
        let t = AlertThreshold::new(5).unwrap();
        assert!(!should_alert(0, t));
        assert!(!should_alert(4, t));
        assert!(!should_alert(5, t));
        assert!(should_alert(6, t));
        assert!(should_alert(u64::MAX, t));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        assert!(AlertThreshold::new(0).is_none());
        assert_eq!(AlertThreshold::new(1).map(|t| t.get()), Some(1));
    }
}
