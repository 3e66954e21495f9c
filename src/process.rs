//! Reduction Pipeline
//!
//! Turns a window of buffered readings into the rows that get stored.
//!
//! | kind      | output                                                |
//! |-----------|-------------------------------------------------------|
//! | `sample`  | the most recent reading, timestamp kept               |
//! | `average` | one row at the scheduled time, mean of the window     |
//! | `min`     | one row at the scheduled time, minimum of the window  |
//! | `max`     | one row at the scheduled time, maximum of the window  |
//! | `dump`    | every reading unchanged                               |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::sensor::Reading;

/// Reduction strategy applied to a storage window.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProcessKind {
    /// Most recent reading in the window.
    Sample,
    /// Arithmetic mean.
    #[serde(alias = "avg")]
    #[strum(to_string = "average", serialize = "avg")]
    Average,
    /// Minimum value.
    Min,
    /// Maximum value.
    Max,
    /// Every reading.
    Dump,
}

/// Errors raised by [`calculate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReduceError {
    /// The aggregate is undefined over no readings.
    #[error("cannot compute {0} over an empty window")]
    EmptyWindow(ProcessKind),
}

/// Reduce `data` (time ordered) according to `process`.
///
/// `scheduled` is the nominal storage time stamped on aggregate rows.
///
/// # Errors
/// [`ReduceError::EmptyWindow`] for `average`, `min` or `max` over no data.
pub fn calculate(
    process: ProcessKind,
    data: &[Reading],
    scheduled: DateTime<Utc>,
) -> Result<Vec<Reading>, ReduceError> {
    let values = data.iter().map(|r| r.value);
    let aggregate = match process {
        ProcessKind::Sample => return Ok(data.last().copied().into_iter().collect()),
        ProcessKind::Dump => return Ok(data.to_vec()),
        ProcessKind::Average => {
            if data.is_empty() {
                None
            } else {
                Some(values.sum::<f64>() / data.len() as f64)
            }
        }
        ProcessKind::Min => values.reduce(f64::min),
        ProcessKind::Max => values.reduce(f64::max),
    };

    aggregate
        .map(|value| vec![Reading::new(scheduled, value)])
        .ok_or(ReduceError::EmptyWindow(process))
}
