use crate::{
    Result,
    constants::{ADC_RESOLUTION, SECONDS_PER_DAY, SENTINEL_TAG, TAG_ID_LEN},
    error::Error,
};
use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// RFID tag identifier (10 uppercase hex characters).
///
/// The all-zero identifier is reserved as the sentinel for "no tag" or
/// "unreadable tag"; every port starts out associated with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagId(String);

impl TagId {
    /// Create a tag identifier with validation.
    ///
    /// The identifier is normalized (trimmed and uppercased) before validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidTag` if the identifier is not exactly 10 ASCII
    /// hex characters.
    pub fn new(id: &str) -> Result<Self> {
        let id = id.trim().to_ascii_uppercase();

        if id.len() != TAG_ID_LEN {
            return Err(Error::InvalidTag(format!(
                "tag must be {TAG_ID_LEN} hex chars, got {} in {id:?}",
                id.len()
            )));
        }

        if !id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidTag(format!("tag must be hexadecimal: {id:?}")));
        }

        Ok(TagId(id))
    }

    /// The reserved "no tag" identifier.
    #[must_use]
    pub fn sentinel() -> Self {
        TagId(SENTINEL_TAG.to_string())
    }

    /// Returns `true` for the reserved "no tag" identifier.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.0 == SENTINEL_TAG
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TagId {
    fn default() -> Self {
        Self::sentinel()
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TagId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TagId::new(s)
    }
}

impl TryFrom<String> for TagId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        TagId::new(&value)
    }
}

impl From<TagId> for String {
    fn from(tag: TagId) -> Self {
        tag.0
    }
}

/// Wheel identity reported by the device after the handshake.
///
/// Zero means the device has not reported yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WheelId(u8);

impl WheelId {
    /// Identity of a wheel that has not reported yet.
    pub const UNKNOWN: WheelId = WheelId(0);

    #[must_use]
    pub fn new(id: u8) -> Self {
        WheelId(id)
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for WheelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a single hall-sensor step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StepDirection {
    Backward = 0,
    Forward = 1,
}

impl StepDirection {
    /// Decode the direction byte of a step frame.
    ///
    /// # Errors
    /// Returns `Error::InvalidDirection` if the value is not 0 or 1.
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(StepDirection::Backward),
            1 => Ok(StepDirection::Forward),
            _ => Err(Error::InvalidDirection { code: value }),
        }
    }

    #[inline]
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Signed unit for the step: `+1` forward, `-1` backward.
    #[inline]
    #[must_use]
    pub fn sign(self) -> i8 {
        match self {
            StepDirection::Backward => -1,
            StepDirection::Forward => 1,
        }
    }
}

impl fmt::Display for StepDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.sign())
    }
}

/// Physical lock state of a wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LockState {
    Unlocked = 0,
    Locked = 1,
}

impl LockState {
    /// Decode the state byte of a heartbeat frame.
    ///
    /// # Errors
    /// Returns `Error::InvalidLockState` if the value is not 0 or 1.
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(LockState::Unlocked),
            1 => Ok(LockState::Locked),
            _ => Err(Error::InvalidLockState { code: value }),
        }
    }

    #[inline]
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub fn from_locked(locked: bool) -> Self {
        if locked {
            LockState::Locked
        } else {
            LockState::Unlocked
        }
    }

    #[inline]
    #[must_use]
    pub fn is_locked(self) -> bool {
        matches!(self, LockState::Locked)
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LockState::Unlocked => write!(f, "unlocked"),
            LockState::Locked => write!(f, "locked"),
        }
    }
}

/// Wall-clock time of day with one-second resolution.
///
/// Stored as seconds since midnight; the legacy integer form is
/// `HHMMSS = hour * 10000 + minute * 100 + second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u32);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);

    /// Create a time of day with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidTimeOfDay` if any component is out of range.
    pub fn new(hour: u32, minute: u32, second: u32) -> Result<Self> {
        if hour > 23 || minute > 59 || second > 59 {
            return Err(Error::InvalidTimeOfDay(format!(
                "{hour:02}:{minute:02}:{second:02}"
            )));
        }
        Ok(TimeOfDay(hour * 3600 + minute * 60 + second))
    }

    /// Decode the `HHMMSS` integer form.
    ///
    /// # Errors
    /// Returns `Error::InvalidTimeOfDay` if the encoded components are out of range.
    pub fn from_hhmmss(value: u32) -> Result<Self> {
        Self::new(value / 10_000, (value / 100) % 100, value % 100)
    }

    #[must_use]
    pub fn from_naive_time(time: NaiveTime) -> Self {
        TimeOfDay(time.num_seconds_from_midnight() % SECONDS_PER_DAY)
    }

    /// Encode as `HHMMSS`.
    #[must_use]
    pub fn hhmmss(&self) -> u32 {
        self.hour() * 10_000 + self.minute() * 100 + self.second()
    }

    #[must_use]
    pub fn seconds_from_midnight(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn hour(&self) -> u32 {
        self.0 / 3600
    }

    #[must_use]
    pub fn minute(&self) -> u32 {
        (self.0 / 60) % 60
    }

    #[must_use]
    pub fn second(&self) -> u32 {
        self.0 % 60
    }

    /// Seconds elapsed since `earlier`, wrapping across midnight.
    ///
    /// ```
    /// use wheelhouse_core::TimeOfDay;
    ///
    /// let scheduled = TimeOfDay::new(23, 59, 59).unwrap();
    /// let now = TimeOfDay::new(0, 0, 5).unwrap();
    /// assert_eq!(now.seconds_since(scheduled), 6);
    /// ```
    #[must_use]
    pub fn seconds_since(&self, earlier: TimeOfDay) -> u32 {
        (self.0 + SECONDS_PER_DAY - earlier.0) % SECONDS_PER_DAY
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

impl std::str::FromStr for TimeOfDay {
    type Err = Error;

    /// Parse `HH:MM:SS` or `HH:MM`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidTimeOfDay(s.to_string());
        let parts = s
            .trim()
            .split(':')
            .map(|p| p.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>>>()?;

        match parts.as_slice() {
            [h, m] => TimeOfDay::new(*h, *m, 0),
            [h, m, s] => TimeOfDay::new(*h, *m, *s),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(time: TimeOfDay) -> Self {
        time.to_string()
    }
}

/// Convert a raw ADC sample to degrees Celsius.
///
/// The sensor outputs 10 mV/°C with a 500 mV offset:
/// `°C = 100 · raw · vref / 1024 − 50`.
///
/// ```
/// use wheelhouse_core::celsius_from_raw;
///
/// assert!((celsius_from_raw(154, 5.0) - 25.195).abs() < 0.01);
/// ```
#[must_use]
pub fn celsius_from_raw(raw: u16, vref: f64) -> f64 {
    100.0 * f64::from(raw) * vref / ADC_RESOLUTION - 50.0
}
