use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    OneTime,
}

impl Frequency {
    /// Classifies the free-text frequency column by its first letter.
    ///
    /// `d…` is daily, `w…` weekly, `m…` monthly. Anything else, including a
    /// blank cell, falls back to `OneTime`.
    pub fn classify(label: &str) -> Self {
        match label
            .trim()
            .chars()
            .next()
            .map(|c| c.to_ascii_lowercase())
        {
            Some('d') => Self::Daily,
            Some('w') => Self::Weekly,
            Some('m') => Self::Monthly,
            _ => Self::OneTime,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::OneTime => "one-time",
        }
    }

    pub fn is_recurring(self) -> bool {
        self != Self::OneTime
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One task definition read from the checklist sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurringTask {
    pub id: String,

    pub description: String,

    pub assignee: Option<String>,

    /// Time of day as written in the sheet; never folded into the date.
    pub time_label: Option<String>,

    pub start_date: Option<NaiveDate>,

    pub frequency: Frequency,

    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RecurringTask {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        start_date: Option<NaiveDate>,
        frequency: Frequency,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            assignee: None,
            time_label: None,
            start_date,
            frequency,
            extra: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Frequency;

    #[test]
    fn classifies_by_first_letter() {
        assert_eq!(Frequency::classify("Daily"), Frequency::Daily);
        assert_eq!(Frequency::classify("  weekly"), Frequency::Weekly);
        assert_eq!(Frequency::classify("MONTHLY"), Frequency::Monthly);
        assert_eq!(Frequency::classify("d"), Frequency::Daily);
    }

    #[test]
    fn unknown_labels_fall_back_to_one_time() {
        for label in ["", "One Time", "yearly", "fortnightly", "  "] {
            assert_eq!(Frequency::classify(label), Frequency::OneTime, "{label}");
        }
        assert!(!Frequency::OneTime.is_recurring());
        assert!(Frequency::Monthly.is_recurring());
    }
}
