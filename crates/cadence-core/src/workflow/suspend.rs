use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::step::StepConfig;

/// Largest accepted delay, in days.
const MAX_DELAY_DAYS: i64 = 365;

/// Unit of a Delay step's duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayUnit {
    Minutes,
    Hours,
    Days,
}

impl DelayUnit {
    fn max_amount(&self) -> i64 {
        match self {
            Self::Minutes => MAX_DELAY_DAYS * 24 * 60,
            Self::Hours => MAX_DELAY_DAYS * 24,
            Self::Days => MAX_DELAY_DAYS,
        }
    }

    fn span(&self, amount: i64) -> Duration {
        match self {
            Self::Minutes => Duration::minutes(amount),
            Self::Hours => Duration::hours(amount),
            Self::Days => Duration::days(amount),
        }
    }
}

impl FromStr for DelayUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minute" | "minutes" => Ok(Self::Minutes),
            "hour" | "hours" => Ok(Self::Hours),
            "day" | "days" => Ok(Self::Days),
            other => Err(format!("unknown delay unit '{}'", other)),
        }
    }
}

/// A parsed Delay step configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelaySpec {
    pub amount: i64,
    pub unit: DelayUnit,
}

impl DelaySpec {
    /// Parse `duration` and `unit` from a step configuration.
    ///
    /// `duration` may be an integer or a numeric string; `unit` defaults to minutes.
    pub fn from_config(config: &StepConfig) -> Result<Self, String> {
        let amount = match config.get("duration") {
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| format!("delay duration must be a whole number, got {}", n))?,
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("delay duration must be a whole number, got '{}'", s))?,
            Some(other) => return Err(format!("invalid delay duration {}", other)),
            None => return Err("missing required config 'duration'".to_string()),
        };

        if amount < 0 {
            return Err(format!("delay duration must not be negative, got {}", amount));
        }

        let unit = match config.get("unit").and_then(Value::as_str) {
            Some(unit) => unit.parse::<DelayUnit>()?,
            None => DelayUnit::Minutes,
        };

        if amount > unit.max_amount() {
            return Err(format!("delay exceeds {} days", MAX_DELAY_DAYS));
        }

        Ok(Self { amount, unit })
    }

    /// Length of the delay.
    pub fn span(&self) -> Duration {
        self.unit.span(self.amount)
    }

    /// Wake time for a delay starting at `now`.
    pub fn wake_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.span()
    }
}
