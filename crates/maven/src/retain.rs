use crate::error::{Error, ErrorKind};
use derive_more::Display;
use keeper_metadata::BuildNumber;
use std::num::NonZeroU32;

/// How many of the newest builds of a snapshot version survive a sweep.
///
/// Configured as a plain integer: `-1` disables sweeping, any positive value
/// is a retain count. Everything else is rejected.
///
/// ```
/// use keeper_maven::RetainBuilds;
///
/// assert_eq!(RetainBuilds::try_from(-1).unwrap(), RetainBuilds::Disabled);
/// assert!(RetainBuilds::try_from(0).is_err());
/// assert_eq!(RetainBuilds::try_from(3).unwrap().to_string(), "3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RetainBuilds {
    #[display("disabled")]
    Disabled,
    #[display("{_0}")]
    Keep(NonZeroU32),
}

impl RetainBuilds {
    pub const DISABLED: i64 = -1;

    /// Builds strictly below the returned number are removed. `None` when
    /// nothing is old enough: `max - retain <= 0`.
    pub fn threshold(retain: NonZeroU32, max: BuildNumber) -> Option<BuildNumber> {
        max.get().checked_sub(retain.get()).filter(|&t| t > 0).map(BuildNumber::new)
    }
}

impl TryFrom<i64> for RetainBuilds {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value == Self::DISABLED {
            return Ok(Self::Disabled);
        }
        u32::try_from(value)
            .ok()
            .and_then(NonZeroU32::new)
            .map(Self::Keep)
            .ok_or_else(|| {
                Error::from(ErrorKind::Configuration(format!(
                    "retain count must be at least 1, or {} to disable; got {value}",
                    Self::DISABLED
                )))
            })
    }
}
