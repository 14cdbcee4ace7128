//! Step alert evaluator.
//!
//! Decides, for one alert and one observed price, whether the move since the
//! stored baseline is large enough to fire. Stateless and safe to call
//! concurrently for distinct alerts.

use pricestep_core::{AlertError, FixedPoint, Step};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do when an alert has no baseline yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirstObservationPolicy {
    /// Adopt the observed price as baseline without notifying.
    #[default]
    Adopt,
    /// Treat the first observation as a fire and notify.
    Fire,
}

impl FromStr for FirstObservationPolicy {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "adopt" | "silent" => Ok(FirstObservationPolicy::Adopt),
            "fire" | "notify" => Ok(FirstObservationPolicy::Fire),
            other => Err(AlertError::InvalidSetting(format!(
                "unknown first observation policy '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for FirstObservationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirstObservationPolicy::Adopt => write!(f, "adopt"),
            FirstObservationPolicy::Fire => write!(f, "fire"),
        }
    }
}

/// Kind of decision reached for an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Move smaller than the step; baseline unchanged.
    Hold,
    /// Move of at least one step; notify and advance the baseline.
    Fire,
    /// No prior baseline; record one without notifying.
    Initialize,
}

/// Evaluator output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub outcome: Outcome,
    /// Baseline the alert should carry after this evaluation.
    pub new_baseline: FixedPoint,
}

impl Decision {
    /// True only when the alert should notify its owner.
    #[inline]
    pub fn fire(&self) -> bool {
        self.outcome == Outcome::Fire
    }

    /// True when the baseline must be written back to the store.
    #[inline]
    pub fn changes_baseline(&self) -> bool {
        self.outcome != Outcome::Hold
    }
}

/// Evaluate one alert against the current price.
///
/// Fires when `|current - baseline| >= step`, in either direction. A move of
/// several steps still fires once and re-baselines at `current`.
pub fn evaluate(
    current: FixedPoint,
    baseline: Option<FixedPoint>,
    step: Step,
    policy: FirstObservationPolicy,
) -> Decision {
    let Some(baseline) = baseline else {
        let outcome = match policy {
            FirstObservationPolicy::Adopt => Outcome::Initialize,
            FirstObservationPolicy::Fire => Outcome::Fire,
        };
        return Decision {
            outcome,
            new_baseline: current,
        };
    };

    if current.abs_diff(baseline) >= step.value() {
        Decision {
            outcome: Outcome::Fire,
            new_baseline: current,
        }
    } else {
        Decision {
            outcome: Outcome::Hold,
            new_baseline: baseline,
        }
    }
}
