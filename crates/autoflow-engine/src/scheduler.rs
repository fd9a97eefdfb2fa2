//! Schedule-trigger reconciliation.
//!
//! The scheduler core is a pure predicate over (workflow, now): given the
//! current wall-clock time, which enabled schedule-triggered workflows are
//! due?  The periodic tick loop that feeds it lives in the engine facade;
//! keeping the predicate clock-injected means scheduling logic is tested
//! without real waits.
//!
//! Cron expressions are parsed via the `cron` crate, which expects 6-field
//! (with seconds) or 7-field formats.  Typical 5-field user input is
//! normalized by prepending a `0` seconds field.  A cron schedule is due
//! when it includes the current time truncated to the minute, so a
//! minute-or-coarser tick matches the wall clock regardless of tick phase.

use std::str::FromStr;

use chrono::{DateTime, Duration, Timelike, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::model::{Trigger, Workflow};

/// Normalize a cron expression to the 6/7-field format expected by the
/// `cron` crate.
pub fn normalize_cron_expr(expr: &str) -> String {
    let field_count = expr.split_whitespace().count();
    if field_count == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

/// Parse a cron expression string into a [`cron::Schedule`].
pub fn parse_schedule(expr: &str) -> Result<cron::Schedule> {
    let normalized = normalize_cron_expr(expr);
    cron::Schedule::from_str(&normalized).map_err(|e| EngineError::InvalidCronExpression {
        expression: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Whether the schedule includes `now`, at minute resolution.
pub fn cron_matches(schedule: &cron::Schedule, now: DateTime<Utc>) -> bool {
    let minute = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    schedule.includes(minute)
}

/// Whether a single workflow's schedule trigger is due at `now`.
///
/// Disabled workflows and non-schedule triggers are never due.  An invalid
/// cron expression logs a warning and is treated as not due (creation-time
/// validation should have caught it).
pub fn is_due(workflow: &Workflow, now: DateTime<Utc>) -> bool {
    if !workflow.enabled {
        return false;
    }
    let Trigger::Schedule { cron, interval_ms } = &workflow.trigger else {
        return false;
    };

    if let Some(expr) = cron {
        return match parse_schedule(expr) {
            Ok(schedule) => cron_matches(&schedule, now),
            Err(e) => {
                warn!(workflow_id = %workflow.id, error = %e, "unschedulable cron expression");
                false
            }
        };
    }

    if let Some(interval_ms) = interval_ms {
        // An unset last_run_at means the workflow has never run: always
        // eligible on the first tick after creation.
        return match workflow.last_run_at {
            Some(last) => now - last >= Duration::milliseconds(*interval_ms as i64),
            None => true,
        };
    }

    false
}

/// The ids of every workflow due at `now`, in input order.
pub fn due_workflows(workflows: &[Workflow], now: DateTime<Utc>) -> Vec<Uuid> {
    workflows
        .iter()
        .filter(|w| is_due(w, now))
        .map(|w| w.id)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
