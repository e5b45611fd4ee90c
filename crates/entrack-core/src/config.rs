//! Session tracking configuration.
//!
//! Options deserialize from any serde format; unknown keys are rejected so
//! a misspelled option never silently falls back to a default.

use serde::{Deserialize, Serialize};
use std::fmt;

///
/// Timing
///
/// When orphan deletion or cascade deletion is resolved.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    /// Resolved as soon as the change is detected.
    #[default]
    Immediate,
    /// Deferred until `cascade_changes` or submission, so the entity can be re-parented.
    OnSubmit,
    /// Never resolved automatically; unresolved cases fail submission.
    Never,
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Immediate => "immediate",
            Self::OnSubmit => "on_submit",
            Self::Never => "never",
        };
        f.write_str(label)
    }
}

///
/// IdentityResolution
///
/// Policy when a second instance arrives for an identity that is already tracked.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityResolution {
    /// Attach/add/update fail with an identity conflict.
    #[default]
    Reject,
    /// Keep the tracked instance; discard the incoming one.
    PreserveExisting,
    /// Copy incoming scalar values onto the tracked instance, then discard the incoming one.
    MergeIncoming,
}

///
/// TrackingOptions
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackingOptions {
    pub orphan_timing: Timing,
    pub cascade_timing: Timing,
    /// Run change detection before submission, enumeration, and entry access.
    pub auto_detect_changes: bool,
    pub identity_resolution: IdentityResolution,
    /// Include scalar values in the debug view (otherwise keys only).
    pub sensitive_debug_values: bool,
}

impl Default for TrackingOptions {
    fn default() -> Self {
        Self {
            orphan_timing: Timing::Immediate,
            cascade_timing: Timing::Immediate,
            auto_detect_changes: true,
            identity_resolution: IdentityResolution::Reject,
            sensitive_debug_values: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let options: TrackingOptions =
            serde_json::from_str(r#"{ "orphan_timing": "on_submit" }"#).unwrap();

        assert_eq!(options.orphan_timing, Timing::OnSubmit);
        assert_eq!(options.cascade_timing, Timing::Immediate);
        assert!(options.auto_detect_changes);
        assert_eq!(options.identity_resolution, IdentityResolution::Reject);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = serde_json::from_str::<TrackingOptions>(r#"{ "orphan_timeing": "never" }"#)
            .unwrap_err();
        assert!(err.to_string().contains("orphan_timeing"));
    }

    #[test]
    fn options_round_trip_through_json() {
        let options = TrackingOptions {
            orphan_timing: Timing::Never,
            cascade_timing: Timing::OnSubmit,
            auto_detect_changes: false,
            identity_resolution: IdentityResolution::MergeIncoming,
            sensitive_debug_values: false,
        };

        let text = serde_json::to_string(&options).unwrap();
        assert!(text.contains(r#""identity_resolution":"merge_incoming""#));
        assert_eq!(
            serde_json::from_str::<TrackingOptions>(&text).unwrap(),
            options
        );
    }
}
