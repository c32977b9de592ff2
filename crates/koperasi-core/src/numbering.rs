//! # Document Numbers
//!
//! Human-readable business numbers for committed documents.
//!
//! ```text
//! INV-20261016-0001     sale invoice
//! PB-20261016-0001      purchase (pembelian)
//! ADJ-20261016-0001     stock adjustment
//! RTR-20261016-0001     return
//! └┬┘ └──┬───┘ └┬─┘
//!  │     │      └── daily sequence, 4 digits
//!  │     └── local business date
//!  └── document prefix
//! ```
//!
//! The sequence is allocated by the store inside the commit transaction; this
//! module only formats and parses.

use chrono::NaiveDate;

/// Kind of numbered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Sale,
    Purchase,
    Adjustment,
    Return,
}

impl DocumentKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::Sale => "INV",
            DocumentKind::Purchase => "PB",
            DocumentKind::Adjustment => "ADJ",
            DocumentKind::Return => "RTR",
        }
    }

    /// `LIKE` pattern matching every number of this kind on `date`.
    pub fn daily_pattern(&self, date: NaiveDate) -> String {
        format!("{}-{}-%", self.prefix(), date.format("%Y%m%d"))
    }

    /// Formats the `seq`-th document of the day.
    pub fn format(&self, date: NaiveDate, seq: u32) -> String {
        format!("{}-{}-{:04}", self.prefix(), date.format("%Y%m%d"), seq)
    }
}

/// Extracts the daily sequence from a document number.
pub fn sequence_of(number: &str) -> Option<u32> {
    number.rsplit('-').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_parse() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();

        assert_eq!(DocumentKind::Sale.format(date, 1), "INV-20261016-0001");
        assert_eq!(DocumentKind::Purchase.format(date, 42), "PB-20261016-0042");
        assert_eq!(DocumentKind::Return.daily_pattern(date), "RTR-20261016-%");
        assert_eq!(sequence_of("ADJ-20261016-0107"), Some(107));
        assert_eq!(sequence_of("garbage"), None);
    }
}
