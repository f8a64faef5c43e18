use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::foundation::error::{SkyloopError, SkyloopResult};

/// Filename convention used by one feed to encode its publication instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grammar {
    /// `..._YYYYMMDDThhmm.ext`
    CompactMinute,
    /// `name_YYYY-MM-DD_hhmm.ext`
    DashedDateMinute,
    /// `...sYYYYMMDDThhmmssZ...`
    ScanStart,
    /// `YYYYMMDD_hhmm_tag...`
    DateMinuteTag,
    /// `YYYYMMDD_hhmmss_512...`
    DateSecond512,
    /// `..._YYYYMMDDThhmmss.ext`
    CompactSecond,
    /// A bare run of exactly 14 digits, `YYYYMMDDhhmmss`.
    Digits14,
}

static COMPACT_MINUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"_(\d{4})(\d{2})(\d{2})T(\d{2})(\d{2})\.[A-Za-z0-9]+$").expect("static regex")
});
static DASHED_DATE_MINUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|_)(\d{4})-(\d{2})-(\d{2})_(\d{2})(\d{2})\.[A-Za-z0-9]+$")
        .expect("static regex")
});
static SCAN_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"s(\d{4})(\d{2})(\d{2})T(\d{2})(\d{2})(\d{2})Z").expect("static regex")
});
static DATE_MINUTE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})(\d{2})(\d{2})_(\d{2})(\d{2})_[A-Za-z0-9]").expect("static regex")
});
static DATE_SECOND_512: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})(\d{2})(\d{2})_(\d{2})(\d{2})(\d{2})_512").expect("static regex")
});
static COMPACT_SECOND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"_(\d{4})(\d{2})(\d{2})T(\d{2})(\d{2})(\d{2})\.[A-Za-z0-9]+$")
        .expect("static regex")
});
static DIGITS_14: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\D)(\d{4})(\d{2})(\d{2})(\d{2})(\d{2})(\d{2})(?:\D|$)")
        .expect("static regex")
});

impl Grammar {
    /// Every supported grammar.
    pub const ALL: [Grammar; 7] = [
        Grammar::CompactMinute,
        Grammar::DashedDateMinute,
        Grammar::ScanStart,
        Grammar::DateMinuteTag,
        Grammar::DateSecond512,
        Grammar::CompactSecond,
        Grammar::Digits14,
    ];

    /// Stable identifier, as used in catalog files.
    pub fn id(self) -> &'static str {
        match self {
            Grammar::CompactMinute => "compact_minute",
            Grammar::DashedDateMinute => "dashed_date_minute",
            Grammar::ScanStart => "scan_start",
            Grammar::DateMinuteTag => "date_minute_tag",
            Grammar::DateSecond512 => "date_second_512",
            Grammar::CompactSecond => "compact_second",
            Grammar::Digits14 => "digits14",
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Grammar::CompactMinute => &COMPACT_MINUTE,
            Grammar::DashedDateMinute => &DASHED_DATE_MINUTE,
            Grammar::ScanStart => &SCAN_START,
            Grammar::DateMinuteTag => &DATE_MINUTE_TAG,
            Grammar::DateSecond512 => &DATE_SECOND_512,
            Grammar::CompactSecond => &COMPACT_SECOND,
            Grammar::Digits14 => &DIGITS_14,
        }
    }

    fn has_seconds(self) -> bool {
        matches!(
            self,
            Grammar::ScanStart | Grammar::DateSecond512 | Grammar::CompactSecond | Grammar::Digits14
        )
    }

    /// Recover the UTC instant encoded in `filename`, or `None` when it does not conform.
    ///
    /// Calendar-invalid fields (month 13, hour 24, ...) are treated as no match.
    pub fn extract(self, filename: &str) -> Option<DateTime<Utc>> {
        let caps = self.pattern().captures(filename)?;
        let seconds = if self.has_seconds() {
            field(&caps, 6)?
        } else {
            0
        };
        NaiveDate::from_ymd_opt(field(&caps, 1)? as i32, field(&caps, 2)?, field(&caps, 3)?)?
            .and_hms_opt(field(&caps, 4)?, field(&caps, 5)?, seconds)
            .map(|dt| dt.and_utc())
    }
}

impl std::fmt::Display for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for Grammar {
    type Err = SkyloopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Grammar::ALL
            .into_iter()
            .find(|g| g.id() == s)
            .ok_or_else(|| SkyloopError::validation(format!("unknown grammar '{s}'")))
    }
}

fn field(caps: &Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx)?.as_str().parse().ok()
}

/// Return `true` for "latest" placeholder filenames, which never carry a usable timestamp.
pub fn is_latest_placeholder(filename: &str) -> bool {
    filename.to_ascii_lowercase().contains("latest")
}

/// Recover a timestamp from `filename` using `grammar`.
///
/// Never fails: non-conforming names yield `None`.
pub fn extract_timestamp(filename: &str, grammar: Grammar) -> Option<DateTime<Utc>> {
    grammar.extract(filename)
}

/// Grammar lookup keyed by source identity.
///
/// Call sites resolve a grammar through the table, so new sources only need a `register` call
/// (or a catalog entry).
#[derive(Clone, Debug, Default)]
pub struct GrammarTable {
    by_source: HashMap<String, Grammar>,
}

impl GrammarTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the grammar for `source_key`.
    pub fn register(&mut self, source_key: impl Into<String>, grammar: Grammar) {
        self.by_source.insert(source_key.into(), grammar);
    }

    /// Grammar registered for `source_key`, if any.
    pub fn grammar_for(&self, source_key: &str) -> Option<Grammar> {
        self.by_source.get(source_key).copied()
    }

    /// Extract a timestamp for a file belonging to `source_key`.
    pub fn extract(&self, source_key: &str, filename: &str) -> SkyloopResult<Option<DateTime<Utc>>> {
        let grammar = self.grammar_for(source_key).ok_or_else(|| {
            SkyloopError::validation(format!("no grammar registered for source '{source_key}'"))
        })?;
        Ok(grammar.extract(filename))
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    /// Return `true` when no source is registered.
    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }
}

impl FromIterator<(String, Grammar)> for GrammarTable {
    fn from_iter<T: IntoIterator<Item = (String, Grammar)>>(iter: T) -> Self {
        Self {
            by_source: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/timestamp/grammar.rs"]
mod tests;
