use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Notification urgency, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Filter,
    Digest,
    Notify,
    Priority,
}

impl Tier {
    /// True for tiers that warrant an individual message.
    pub fn is_notify(self) -> bool {
        self >= Tier::Notify
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Filter => "filter",
            Tier::Digest => "digest",
            Tier::Notify => "notify",
            Tier::Priority => "priority",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "filter" => Ok(Tier::Filter),
            "digest" => Ok(Tier::Digest),
            "notify" => Ok(Tier::Notify),
            "priority" => Ok(Tier::Priority),
            other => Err(format!("unknown tier '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_ordered() {
        assert!(Tier::Filter < Tier::Digest);
        assert!(Tier::Digest < Tier::Notify);
        assert!(Tier::Notify < Tier::Priority);
        assert!(Tier::Priority.is_notify());
        assert!(!Tier::Digest.is_notify());
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("PRIORITY".parse::<Tier>().unwrap(), Tier::Priority);
        assert_eq!(Tier::Digest.to_string(), "digest");
        assert!("loud".parse::<Tier>().is_err());
    }
}
