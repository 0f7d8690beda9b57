use crate::models::Score;
use serde::{Deserialize, Serialize};

/// Precision reached by a MATCH prediction, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Miss,
    Winner,
    Diff,
    Exact,
}

impl MatchTier {
    /// Share weight in the zero-sum tiered pool
    pub fn share_weight(&self) -> u64 {
        match self {
            MatchTier::Exact => 5,
            MatchTier::Diff => 3,
            MatchTier::Winner => 1,
            MatchTier::Miss => 0,
        }
    }
}

/// Every tier a prediction satisfies; they nest (exact implies diff implies winner).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierHits {
    pub exact: bool,
    pub diff: bool,
    pub winner: bool,
    /// Prediction and result are both draws
    pub both_draws: bool,
}

impl TierHits {
    pub fn evaluate(predicted: Score, actual: Score) -> Self {
        Self {
            exact: predicted == actual,
            diff: predicted.differential() == actual.differential(),
            winner: predicted.tendency() == actual.tendency(),
            both_draws: predicted.is_draw() && actual.is_draw(),
        }
    }

    /// Highest tier reached
    pub fn best(&self) -> MatchTier {
        if self.exact {
            MatchTier::Exact
        } else if self.diff {
            MatchTier::Diff
        } else if self.winner {
            MatchTier::Winner
        } else {
            MatchTier::Miss
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_tier_examples() {
        let actual = Score::new(2, 1);
        assert_eq!(TierHits::evaluate(Score::new(2, 1), actual).best(), MatchTier::Exact);
        assert_eq!(TierHits::evaluate(Score::new(3, 2), actual).best(), MatchTier::Diff);
        assert_eq!(TierHits::evaluate(Score::new(1, 0), actual).best(), MatchTier::Diff);
        assert_eq!(TierHits::evaluate(Score::new(4, 0), actual).best(), MatchTier::Winner);
        assert_eq!(TierHits::evaluate(Score::new(1, 1), actual).best(), MatchTier::Miss);
    }

    #[test]
    fn test_draws() {
        let hits = TierHits::evaluate(Score::new(1, 1), Score::new(0, 0));
        assert!(hits.diff && hits.winner && hits.both_draws && !hits.exact);
    }
}
