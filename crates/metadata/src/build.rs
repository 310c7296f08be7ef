//! Build numbers and snapshot values.
//!
//! A timestamped snapshot value looks like `1.0-20240101.120000-7`: the base
//! version, the deployment timestamp and the build number, joined by `-`.
//! The base version may itself contain dashes, so segments are always taken
//! from the right.

use crate::error::{ErrorKind, Result};
use derive_more::Display;
use std::str::FromStr;

/// Build number of a snapshot deployment.
///
/// Parsing is strict: the text must be non-empty ASCII digits that fit in a
/// `u32`. There is no fallback to zero; a value that fails to parse is a
/// distinct condition callers have to handle.
///
/// # Examples
///
/// ```
/// use keeper_metadata::BuildNumber;
///
/// assert_eq!("7".parse::<BuildNumber>().unwrap().get(), 7);
/// assert!("".parse::<BuildNumber>().is_err());
/// assert!("+7".parse::<BuildNumber>().is_err());
/// assert!("SNAPSHOT".parse::<BuildNumber>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub struct BuildNumber(u32);

impl BuildNumber {
    pub const ZERO: Self = Self(0);

    pub fn new(n: u32) -> Self {
        Self(n)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Parse the build number from the segment after the last `-` of a
    /// snapshot value.
    ///
    /// ```
    /// use keeper_metadata::BuildNumber;
    ///
    /// assert_eq!(BuildNumber::from_value("1.0-20240101.120000-7").unwrap().get(), 7);
    /// assert!(BuildNumber::from_value("1.0-SNAPSHOT").is_err());
    /// ```
    pub fn from_value(value: &str) -> Result<Self> {
        let segment = value.rsplit('-').next().unwrap_or(value);
        parse_digits(segment).ok_or_else(|| ErrorKind::InvalidBuildNumber(value.to_string()).into())
    }
}

impl FromStr for BuildNumber {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_digits(s).ok_or_else(|| ErrorKind::InvalidBuildNumber(s.to_string()).into())
    }
}

fn parse_digits(s: &str) -> Option<BuildNumber> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok().map(BuildNumber)
}

/// Timestamp segment of a snapshot value (`20240101.120000` for
/// `1.0-20240101.120000-7`), if it has one.
pub fn timestamp_of(value: &str) -> Option<&str> {
    let mut segments = value.rsplitn(3, '-');
    let _build = segments.next()?;
    let timestamp = segments.next()?;
    // Without a base version in front this is not a timestamped value.
    segments.next()?;
    match timestamp.is_empty() {
        true => None,
        false => Some(timestamp),
    }
}

/// Base version of a snapshot version string (`1.0` for `1.0-SNAPSHOT`).
pub fn base_version(version: &str) -> Option<&str> {
    version.strip_suffix(crate::SNAPSHOT_SUFFIX)
}
