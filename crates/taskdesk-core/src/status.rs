use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task lifecycle status as the backend knows it.
///
/// The backend is case-insensitive on input and has drifted between the
/// `complete` and `completed` spellings over time, so parsing accepts both;
/// submission always uses [`Status::wire_value`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Active,
    Complete,
    Delayed,
}

impl Status {
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "ACTIVE" => Some(Self::Active),
            "COMPLETE" | "COMPLETED" => Some(Self::Complete),
            "DELAYED" => Some(Self::Delayed),
            _ => None,
        }
    }

    pub fn wire_value(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Complete => "complete",
            Self::Delayed => "delayed",
        }
    }
}

/// Display-only classification used to style the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeVariant {
    Active,
    Pending,
    Completed,
    Delayed,
    Unknown,
}

impl BadgeVariant {
    /// ANSI SGR color for the badge text; `None` renders unpainted.
    pub fn ansi_code(self) -> Option<&'static str> {
        match self {
            Self::Active => Some("34"),
            Self::Pending => Some("33"),
            Self::Completed => Some("32"),
            Self::Delayed => Some("31"),
            Self::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayClass {
    pub badge: BadgeVariant,
    pub editable: bool,
}

/// Classify a raw status string for display.
///
/// Total over arbitrary input: unrecognized values map to
/// [`BadgeVariant::Unknown`] and are not editable. `editable` is true
/// exactly for `ACTIVE` and `PENDING` tasks; new log entries and the
/// completion action are gated on it.
pub fn classify_for_display(raw: &str) -> DisplayClass {
    let badge = match Status::from_wire(raw) {
        Some(Status::Active) => BadgeVariant::Active,
        Some(Status::Pending) => BadgeVariant::Pending,
        Some(Status::Complete) => BadgeVariant::Completed,
        Some(Status::Delayed) => BadgeVariant::Delayed,
        None => BadgeVariant::Unknown,
    };

    DisplayClass {
        badge,
        editable: matches!(badge, BadgeVariant::Active | BadgeVariant::Pending),
    }
}

/// Status to submit when the user marks a task done: `Complete` while the
/// deadline has strictly not passed, `Delayed` from the deadline onward.
pub fn resolve_completion_status(now: DateTime<Utc>, deadline: DateTime<Utc>) -> Status {
    if now < deadline {
        Status::Complete
    } else {
        Status::Delayed
    }
}

/// Whether a log entry landed on time; drives timestamp coloring only.
pub fn log_on_time(logged_at: DateTime<Utc>, deadline: DateTime<Utc>) -> bool {
    logged_at <= deadline
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{BadgeVariant, Status, classify_for_display, log_on_time,
                resolve_completion_status};

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify_for_display("active"), classify_for_display("ACTIVE"));
        assert_eq!(classify_for_display("Pending"), classify_for_display("PENDING"));
    }

    #[test]
    fn active_and_pending_are_editable() {
        assert!(classify_for_display("ACTIVE").editable);
        assert!(classify_for_display("PENDING").editable);
    }

    #[test]
    fn complete_and_delayed_are_read_only() {
        assert!(!classify_for_display("COMPLETED").editable);
        assert!(!classify_for_display("COMPLETE").editable);
        assert!(!classify_for_display("DELAYED").editable);
    }

    #[test]
    fn both_complete_spellings_share_a_badge() {
        assert_eq!(classify_for_display("complete").badge, BadgeVariant::Completed);
        assert_eq!(classify_for_display("completed").badge, BadgeVariant::Completed);
    }

    #[test]
    fn unrecognized_status_falls_back() {
        let class = classify_for_display("unknown-value");
        assert_eq!(class.badge, BadgeVariant::Unknown);
        assert!(!class.editable);
    }

    #[test]
    fn before_deadline_resolves_complete() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let deadline = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(resolve_completion_status(now, deadline), Status::Complete);
    }

    #[test]
    fn at_deadline_resolves_delayed() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(resolve_completion_status(at, at), Status::Delayed);
    }

    #[test]
    fn after_deadline_resolves_delayed() {
        let now = Utc.with_ymd_and_hms(2025, 1, 3, 0, 0, 0).unwrap();
        let deadline = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(resolve_completion_status(now, deadline), Status::Delayed);
    }

    #[test]
    fn log_at_deadline_counts_as_on_time() {
        let deadline = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        assert!(log_on_time(deadline, deadline));
        assert!(log_on_time(deadline - chrono::Duration::hours(1), deadline));
        assert!(!log_on_time(deadline + chrono::Duration::seconds(1), deadline));
    }

    #[test]
    fn wire_values_round_trip() {
        for status in [Status::Pending, Status::Active, Status::Complete, Status::Delayed] {
            assert_eq!(Status::from_wire(status.wire_value()), Some(status));
        }
    }
}
