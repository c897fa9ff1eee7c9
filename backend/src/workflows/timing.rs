// Workflow Timing - Resolves when a prospect may leave a timing node

use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc, Weekday};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

use cadence_shared::NodeType;

use super::nodes::{DelayConfig, DelayUnit, NodeConfig, TimeSlotConfig};

/// Days searched forward for an allowed time slot
pub const TIME_SLOT_SEARCH_DAYS: i64 = 14;

#[derive(Error, Debug, PartialEq)]
pub enum TimingError {
    #[error("Node type '{0}' is not a timing node")]
    NotTimingNode(String),
    #[error("Delay of {amount} {unit:?} is out of range")]
    OutOfRange { amount: i64, unit: DelayUnit },
}

pub fn is_timing_node(node_type: &NodeType) -> bool {
    node_type.is_timing()
}

/// Next instant a prospect sitting on a timing node may proceed.
pub fn next_time(config: &NodeConfig, now: DateTime<Utc>) -> Result<DateTime<Utc>, TimingError> {
    match config {
        NodeConfig::Delay(delay) => delay_until(delay, now),
        NodeConfig::WaitUntil(wait) => Ok(wait.wait_until),
        NodeConfig::TimeSlot(slot) => Ok(next_time_slot(slot, now)),
        other => Err(TimingError::NotTimingNode(config_name(other).to_string())),
    }
}

fn delay_until(delay: &DelayConfig, now: DateTime<Utc>) -> Result<DateTime<Utc>, TimingError> {
    // Negative amounts would move the cursor into the past; treat them as no wait
    let amount = delay.amount.max(0);

    let duration = match delay.unit {
        DelayUnit::Minutes => Duration::try_minutes(amount),
        DelayUnit::Hours => Duration::try_hours(amount),
        DelayUnit::Days => Duration::try_days(amount),
        DelayUnit::Weeks => Duration::try_weeks(amount),
    }
    .ok_or(TimingError::OutOfRange {
        amount: delay.amount,
        unit: delay.unit,
    })?;

    now.checked_add_signed(duration).ok_or(TimingError::OutOfRange {
        amount: delay.amount,
        unit: delay.unit,
    })
}

/// Earliest allowed (weekday, hour) at the top of the hour.
///
/// On the current day only hours strictly after the current hour count. When
/// nothing matches within the search window the result is midnight UTC of the
/// last searched day.
pub fn next_time_slot(slot: &TimeSlotConfig, now: DateTime<Utc>) -> DateTime<Utc> {
    let hours: BTreeSet<u32> = slot.hours.iter().copied().filter(|h| *h < 24).collect();
    let days: HashSet<Weekday> = slot
        .days
        .iter()
        .filter_map(|day| day.trim().parse::<Weekday>().ok())
        .collect();

    let today = now.date_naive();

    for offset in 0..TIME_SLOT_SEARCH_DAYS {
        let date = today + Duration::days(offset);
        if !days.contains(&date.weekday()) {
            continue;
        }

        let hour = if offset == 0 {
            hours.range(now.hour() + 1..).next()
        } else {
            hours.iter().next()
        };

        if let Some(hour) = hour {
            if let Some(time) = NaiveTime::from_hms_opt(*hour, 0, 0) {
                return date.and_time(time).and_utc();
            }
        }
    }

    (today + Duration::days(TIME_SLOT_SEARCH_DAYS))
        .and_time(NaiveTime::MIN)
        .and_utc()
}

fn config_name(config: &NodeConfig) -> &'static str {
    match config {
        NodeConfig::Start => "start",
        NodeConfig::Email(_) => "email",
        NodeConfig::Call(_) => "call",
        NodeConfig::Task(_) => "task",
        NodeConfig::Transfer(_) => "transfer",
        NodeConfig::Delay(_) => "delay",
        NodeConfig::WaitUntil(_) => "waitUntil",
        NodeConfig::TimeSlot(_) => "timeSlot",
        NodeConfig::Condition(_) => "condition",
        NodeConfig::VisitLinkedIn => "visitLinkedIn",
        NodeConfig::AddConnection => "addConnection",
        NodeConfig::LinkedInMessage(_) => "linkedInMessage",
        NodeConfig::Unknown(_) => "unknown",
    }
}
