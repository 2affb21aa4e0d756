use crate::error::{AlignError, Result};
use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use std::{fmt, str::FromStr, sync::LazyLock};

const RUN_ID_FORMAT: &str = "%Y%m%d%H%M%S";

static RUN_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{14}$").expect("run id pattern is valid"));

/// Identifier of one alignment run: the fetch time as UTC `YYYYMMDDHHMMSS`.
///
/// Fixed width, so string order is chronological order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(String);

impl RunId {
    pub fn from_timestamp(epoch_secs: i64) -> Result<Self> {
        if epoch_secs < 0 {
            return Err(AlignError::InvalidInput(format!(
                "Request timestamp {epoch_secs} is before the epoch"
            )));
        }
        let time = DateTime::from_timestamp(epoch_secs, 0).ok_or_else(|| {
            AlignError::InvalidInput(format!("Request timestamp {epoch_secs} is out of range"))
        })?;
        let text = time.format(RUN_ID_FORMAT).to_string();
        if !RUN_ID_PATTERN.is_match(&text) {
            return Err(AlignError::InvalidInput(format!(
                "Request timestamp {epoch_secs} does not fit a 14 digit run id"
            )));
        }
        Ok(Self(text))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if !RUN_ID_PATTERN.is_match(text) {
            return Err(AlignError::InvalidInput(format!(
                "Run id '{text}' is not 14 digits (YYYYMMDDHHMMSS)"
            )));
        }
        NaiveDateTime::parse_from_str(text, RUN_ID_FORMAT).map_err(|e| {
            AlignError::InvalidInput(format!("Run id '{text}' is not a valid time: {e}"))
        })?;
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn timestamp(&self) -> i64 {
        NaiveDateTime::parse_from_str(&self.0, RUN_ID_FORMAT)
            .map(|t| t.and_utc().timestamp())
            .unwrap_or_default()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RunId {
    type Err = AlignError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_timestamp_formats_utc() {
        assert_eq!(RunId::from_timestamp(0).unwrap().as_str(), "19700101000000");
        let id = RunId::from_timestamp(1_588_291_200).unwrap();
        assert_eq!(id.as_str(), "20200501000000");
        assert_eq!(id.timestamp(), 1_588_291_200);
    }

    #[test]
    fn test_string_order_is_chronological() {
        let stamps = [1_577_836_800_i64, 1_577_836_801, 1_580_000_000, 1_700_000_000];
        let ids: Vec<RunId> = stamps
            .iter()
            .map(|s| RunId::from_timestamp(*s).unwrap())
            .collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].as_str() < pair[1].as_str());
        }
    }

    #[test]
    fn test_rejects_negative_and_oversized_timestamps() {
        assert!(matches!(
            RunId::from_timestamp(-1),
            Err(AlignError::InvalidInput(_))
        ));
        // year 10000 no longer fits the fixed width
        assert!(RunId::from_timestamp(253_402_300_800).is_err());
    }

    #[test]
    fn test_parse_validates_shape_and_calendar() {
        assert!(RunId::parse("20200501123000").is_ok());
        assert!("20200501123000".parse::<RunId>().is_ok());
        assert!(RunId::parse("2020050112300").is_err());
        assert!(RunId::parse("2020-05-01").is_err());
        assert!(RunId::parse("20201301000000").is_err());
    }
}
