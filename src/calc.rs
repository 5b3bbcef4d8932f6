use serde::Serialize;

/// Round to the nearest integer with halves going up: `floor(x + 0.5)`.
///
/// Percentages are never negative, so this matches the half-up rounding the
/// dashboard and reports have always shown (`2/3 -> 67`, `1/2 -> 50`).
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// `present / total` as a whole percentage. An empty set is 0%, not NaN.
pub fn attendance_percentage(present: u64, total: u64) -> i64 {
    if total == 0 {
        return 0;
    }
    round_half_up((present as f64) * 100.0 / (total as f64))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub present: u64,
    pub total: u64,
}

impl Tally {
    pub fn record(&mut self, present: bool) {
        self.total += 1;
        if present {
            self.present += 1;
        }
    }

    pub fn absent(&self) -> u64 {
        self.total - self.present
    }

    pub fn percentage(&self) -> i64 {
        attendance_percentage(self.present, self.total)
    }
}

impl FromIterator<bool> for Tally {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut tally = Tally::default();
        for present in iter {
            tally.record(present);
        }
        tally
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Standing {
    Good,
    Warning,
    Critical,
}

impl Standing {
    pub fn from_percentage(percentage: i64) -> Self {
        if percentage >= 75 {
            Standing::Good
        } else if percentage >= 50 {
            Standing::Warning
        } else {
            Standing::Critical
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Standing::Good => "good",
            Standing::Warning => "warning",
            Standing::Critical => "critical",
        }
    }
}
