//! VLAN identifiers and VLAN membership sets.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// IEEE 802.1Q VLAN identifier (1-4094).
///
/// VLAN 0 (priority tagged frames) and VLAN 4095 are reserved.
///
/// # Examples
///
/// ```
/// use nbsync_types::VlanId;
///
/// let vlan = VlanId::new(100).unwrap();
/// assert_eq!(vlan.as_u16(), 100);
///
/// assert!(VlanId::new(0).is_err());
/// assert!(VlanId::new(4095).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    /// Minimum valid VLAN ID.
    pub const MIN: u16 = 1;

    /// Maximum valid VLAN ID.
    pub const MAX: u16 = 4094;

    /// Creates a new VLAN ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the VLAN ID is not in the valid range (1-4094).
    pub const fn new(id: u16) -> Result<Self, ParseError> {
        if id >= Self::MIN && id <= Self::MAX {
            Ok(VlanId(id))
        } else {
            Err(ParseError::InvalidVlanId(id))
        }
    }

    /// Returns the VLAN ID as a u16.
    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Extracts the VLAN ID from a switched virtual interface name such as
    /// `Vlan100` or `vlan20`.
    ///
    /// Returns `None` for any other interface name.
    pub fn from_interface_name(name: &str) -> Option<Self> {
        let prefix = name.get(..4)?;
        if !prefix.eq_ignore_ascii_case("vlan") {
            return None;
        }
        let digits = &name[4..];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse::<u16>().ok().and_then(|id| VlanId::new(id).ok())
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VlanId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(vlan) = VlanId::from_interface_name(s) {
            return Ok(vlan);
        }
        let id: u16 = s.parse().map_err(|_| ParseError::InvalidVlanId(0))?;
        VlanId::new(id)
    }
}

impl TryFrom<u16> for VlanId {
    type Error = ParseError;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        VlanId::new(id)
    }
}

impl From<VlanId> for u16 {
    fn from(vlan: VlanId) -> u16 {
        vlan.0
    }
}

/// An unordered set of VLAN tags.
///
/// Devices report trunk membership as range strings (`"10,20,30-40"`) while
/// the directory stores a list of VLAN references. Both sides are reduced to
/// a `VlanSet` so membership is compared as a set rather than as text.
///
/// # Examples
///
/// ```
/// use nbsync_types::VlanSet;
///
/// let desired = VlanSet::from_range_str("10,20,30-32").unwrap();
/// let current: VlanSet = [10, 40].into_iter().collect();
///
/// assert_eq!(desired.added(&current).to_range_string(), "20,30-32");
/// assert_eq!(desired.removed(&current).to_range_string(), "40");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VlanSet(BTreeSet<u16>);

impl VlanSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Returns a set holding every valid VLAN tag (1-4094).
    pub fn all() -> Self {
        Self((VlanId::MIN..=VlanId::MAX).collect())
    }

    /// Parses a device range string such as `"10,20,30-40"`.
    ///
    /// `"all"` expands to every valid tag; `"none"` and the empty string
    /// yield an empty set. Reversed ranges are accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if any token is not a number or range, or if a tag
    /// falls outside 1-4094.
    pub fn from_range_str(s: &str) -> Result<Self, ParseError> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            return Ok(Self::new());
        }
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::all());
        }

        let mut tags = BTreeSet::new();
        for token in trimmed.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.split_once('-') {
                Some((lo, hi)) => {
                    let lo = parse_tag(lo, s)?;
                    let hi = parse_tag(hi, s)?;
                    let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                    tags.extend(lo..=hi);
                }
                None => {
                    tags.insert(parse_tag(token, s)?);
                }
            }
        }
        Ok(Self(tags))
    }

    /// Inserts a tag, returning true if it was not already present.
    pub fn insert(&mut self, tag: u16) -> bool {
        self.0.insert(tag)
    }

    /// Returns true if the set contains the tag.
    pub fn contains(&self, tag: u16) -> bool {
        self.0.contains(&tag)
    }

    /// Returns the number of tags in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if the set covers every valid VLAN tag.
    pub fn is_all(&self) -> bool {
        self.0.len() == usize::from(VlanId::MAX - VlanId::MIN + 1)
            && self.0.first() == Some(&VlanId::MIN)
            && self.0.last() == Some(&VlanId::MAX)
    }

    /// Iterates the tags in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }

    /// Tags present in `self` but not in `other` (`self − other`).
    pub fn added(&self, other: &VlanSet) -> VlanSet {
        Self(self.0.difference(&other.0).copied().collect())
    }

    /// Tags present in `other` but not in `self` (`other − self`).
    pub fn removed(&self, other: &VlanSet) -> VlanSet {
        Self(other.0.difference(&self.0).copied().collect())
    }

    /// Renders the set in compact range notation, e.g. `"10,20,30-32"`.
    pub fn to_range_string(&self) -> String {
        let mut parts = Vec::new();
        let mut iter = self.0.iter().copied().peekable();
        while let Some(start) = iter.next() {
            let mut end = start;
            while let Some(next) = end.checked_add(1) {
                if iter.peek() != Some(&next) {
                    break;
                }
                end = next;
                iter.next();
            }
            if start == end {
                parts.push(start.to_string());
            } else {
                parts.push(format!("{}-{}", start, end));
            }
        }
        parts.join(",")
    }
}

fn parse_tag(token: &str, whole: &str) -> Result<u16, ParseError> {
    let tag: u16 = token
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidVlanList(whole.to_string()))?;
    VlanId::new(tag).map(|v| v.as_u16())
}

impl fmt::Display for VlanSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_range_string())
    }
}

impl FromStr for VlanSet {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_range_str(s)
    }
}

impl FromIterator<u16> for VlanSet {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl FromIterator<VlanId> for VlanSet {
    fn from_iter<I: IntoIterator<Item = VlanId>>(iter: I) -> Self {
        Self(iter.into_iter().map(|v| v.as_u16()).collect())
    }
}
