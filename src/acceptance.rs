use crate::model::RatingResult;

/// Floor that every accepted alternative must reach.
pub const MIN_TARGET: u8 = 4;

/// `4` for products below 4, otherwise one bucket above the current score.
pub fn target_for(current_score: u8) -> u8 {
    if current_score < MIN_TARGET {
        MIN_TARGET
    } else {
        current_score.saturating_add(1)
    }
}

/// Decides whether a rated candidate counts as greener than the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptanceFilter {
    target: u8,
}

impl AcceptanceFilter {
    pub fn for_current_score(current_score: u8) -> Self {
        Self {
            target: target_for(current_score),
        }
    }

    pub fn target(&self) -> u8 {
        self.target
    }

    pub fn accepts(&self, rating: &RatingResult) -> bool {
        rating.score() >= self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EcoBucket;

    fn rated(score: usize) -> RatingResult {
        RatingResult {
            bucket: EcoBucket::from_index(score).unwrap(),
            ..RatingResult::fallback(false, None)
        }
    }

    #[test]
    fn low_scores_need_at_least_four() {
        let filter = AcceptanceFilter::for_current_score(2);
        assert_eq!(filter.target(), 4);
        assert!(filter.accepts(&rated(4)));
        assert!(!filter.accepts(&rated(3)));
    }

    #[test]
    fn good_scores_need_one_more() {
        assert_eq!(target_for(4), 5);
        assert_eq!(target_for(0), 4);
        let filter = AcceptanceFilter::for_current_score(5);
        assert!(!filter.accepts(&rated(5)));
        assert!(filter.accepts(&rated(6)));
        assert!(!AcceptanceFilter::for_current_score(6).accepts(&rated(6)));
    }
}
