/// Importance scoring.
///
/// Converts the four signal inputs of a conversational turn into a single
/// importance value that drives tier placement and retrieval ranking.
///
/// ## Model
///
/// A weighted sum over the bounded signals plus a diminishing-returns
/// recurrence bonus:
///
/// ```text
/// score = novelty * w_n + sentiment * w_s + feedback * w_f
///       + ln(1 + recurrence) * w_r
/// ```
///
/// Novelty and sentiment dominate. The recurrence bonus is logarithmic so
/// recurring topics earn a boost but cannot drive importance unbounded.
/// The result is clamped to `0..=SCORE_MAX`.
///
/// ## Determinism
///
/// Scoring is a pure function of its inputs: no clock, no randomness,
/// no hidden state. Identical inputs always produce identical output.
use crate::error::{MemoryError, MemoryResult};
use crate::types::TurnSignals;

/// Upper bound of signal inputs and of the final score.
pub const SCORE_MAX: f64 = 10.0;

/// Feature weights for importance scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    /// Semantic novelty weight
    pub novelty: f64,
    /// Sentiment intensity weight
    pub sentiment: f64,
    /// User feedback weight
    pub feedback: f64,
    /// Coefficient applied to the log-scaled recurrence bonus
    pub recurrence: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            novelty: 0.45,
            sentiment: 0.35,
            feedback: 0.15,
            recurrence: 0.4,
        }
    }
}

/// Score a turn's signals with the default weights.
///
/// Out-of-range signals are rejected with [`MemoryError::InvalidSignal`]
/// before any tier write happens.
pub fn score(signals: &TurnSignals) -> MemoryResult<f64> {
    score_with(&ScoringWeights::default(), signals)
}

/// Score a turn's signals with explicit weights.
pub fn score_with(weights: &ScoringWeights, signals: &TurnSignals) -> MemoryResult<f64> {
    validate(signals)?;

    let weighted = signals.semantic_novelty * weights.novelty
        + signals.sentiment_intensity * weights.sentiment
        + signals.user_feedback * weights.feedback;

    let recurrence_bonus = (1.0 + f64::from(signals.recurrence_count)).ln() * weights.recurrence;

    Ok((weighted + recurrence_bonus).clamp(0.0, SCORE_MAX))
}

/// Validate that every bounded signal sits in `0..=SCORE_MAX` and is finite.
pub fn validate(signals: &TurnSignals) -> MemoryResult<()> {
    check_range("semantic_novelty", signals.semantic_novelty)?;
    check_range("sentiment_intensity", signals.sentiment_intensity)?;
    check_range("user_feedback", signals.user_feedback)?;
    Ok(())
}

fn check_range(name: &'static str, value: f64) -> MemoryResult<()> {
    if !value.is_finite() || !(0.0..=SCORE_MAX).contains(&value) {
        return Err(MemoryError::InvalidSignal {
            name,
            value,
            max: SCORE_MAX,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn signals(novelty: f64, sentiment: f64, feedback: f64, recurrence: u32) -> TurnSignals {
        TurnSignals::new(novelty, sentiment, feedback, recurrence)
    }

    #[test]
    fn test_score_is_deterministic() {
        let s = signals(7.0, 4.0, 2.0, 3);
        let first = score(&s).unwrap();
        let second = score(&s).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_novelty_and_sentiment_dominate() {
        let weights = ScoringWeights::default();
        assert!(weights.novelty + weights.sentiment > weights.feedback + weights.recurrence);

        let novel = score(&signals(10.0, 0.0, 0.0, 0)).unwrap();
        let fed_back = score(&signals(0.0, 0.0, 10.0, 0)).unwrap();
        assert!(novel > fed_back);
    }

    #[test]
    fn test_recurrence_has_diminishing_returns() {
        let base = score(&signals(5.0, 5.0, 0.0, 0)).unwrap();
        let once = score(&signals(5.0, 5.0, 0.0, 1)).unwrap();
        let often = score(&signals(5.0, 5.0, 0.0, 100)).unwrap();

        let first_step = once - base;
        let avg_late_step = (often - once) / 99.0;

        assert!(first_step > 0.0, "recurrence must add a bonus");
        assert!(
            avg_late_step < first_step,
            "later recurrences must add less than the first"
        );
    }

    #[test]
    fn test_recurrence_cannot_drive_score_unbounded() {
        let maxed = score(&signals(10.0, 10.0, 10.0, u32::MAX)).unwrap();
        assert_eq!(maxed, SCORE_MAX);

        // Recurrence alone stays modest.
        let recurrence_only = score(&signals(0.0, 0.0, 0.0, 1_000_000)).unwrap();
        assert!(recurrence_only < SCORE_MAX / 2.0);
    }

    #[test]
    fn test_out_of_range_signals_rejected() {
        let too_high = score(&signals(11.0, 0.0, 0.0, 0));
        assert!(matches!(
            too_high,
            Err(MemoryError::InvalidSignal {
                name: "semantic_novelty",
                ..
            })
        ));

        let negative = score(&signals(5.0, -0.1, 0.0, 0));
        assert!(matches!(
            negative,
            Err(MemoryError::InvalidSignal {
                name: "sentiment_intensity",
                ..
            })
        ));

        let nan = score(&signals(5.0, 5.0, f64::NAN, 0));
        assert!(matches!(
            nan,
            Err(MemoryError::InvalidSignal {
                name: "user_feedback",
                ..
            })
        ));
    }

    proptest! {
        #[test]
        fn prop_score_is_bounded(
            novelty in 0.0..=SCORE_MAX,
            sentiment in 0.0..=SCORE_MAX,
            feedback in 0.0..=SCORE_MAX,
            recurrence in 0u32..10_000,
        ) {
            let s = signals(novelty, sentiment, feedback, recurrence);
            let value = score(&s).unwrap();
            prop_assert!((0.0..=SCORE_MAX).contains(&value));
        }

        #[test]
        fn prop_score_is_monotonic_in_novelty(
            low in 0.0..5.0f64,
            delta in 0.1..5.0f64,
            sentiment in 0.0..=SCORE_MAX,
        ) {
            let a = score(&signals(low, sentiment, 0.0, 0)).unwrap();
            let b = score(&signals(low + delta, sentiment, 0.0, 0)).unwrap();
            prop_assert!(b >= a);
        }
    }
}
