// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Helpers for condition maps kept in Cluster and Addon status.

use crate::types::cluster::{Condition, ConditionStatus};
use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;

/// Set a condition, keeping its transition time unless the status flips.
///
/// Returns true if anything changed.
pub fn set_condition(
    conditions: &mut BTreeMap<String, Condition>,
    condition_type: &str,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    observed_generation: Option<i64>,
) -> bool {
    let existing = conditions.get(condition_type);
    let last_transition_time = match existing {
        Some(c) if c.status == status => c.last_transition_time.clone(),
        _ => Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
    };

    let condition = Condition {
        status,
        observed_generation,
        last_transition_time,
        reason: reason.to_string(),
        message: message.to_string(),
    };

    if existing == Some(&condition) {
        return false;
    }
    conditions.insert(condition_type.to_string(), condition);
    true
}
