use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error type for parsing an ID from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            #[must_use]
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the underlying u64 value
            #[must_use]
            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self::new)
                    .map_err(|_| ParseIdError {
                        kind: stringify!($name),
                    })
            }
        }
    };
}

define_id!(
    /// Identifier of a persisted quiz session
    SessionId
);
define_id!(
    /// Identifier of a user, as issued by the auth service
    UserId
);
define_id!(
    /// Identifier of a question
    QuestionId
);
define_id!(
    /// Identifier of a question group
    GroupId
);
define_id!(
    /// Identifier of an instructor-defined test
    TestId
);
define_id!(
    /// Identifier of a clinical case
    CaseId
);
define_id!(
    /// Identifier of a case parameter
    ParameterId
);

// ─── Wire sentinels ────────────────────────────────────────────────────────────

impl QuestionId {
    /// Wire and storage value meaning "no further question".
    pub const WIRE_NONE: i64 = -1;

    /// Encodes an optional question position using the `-1` sentinel.
    #[must_use]
    pub fn to_wire(id: Option<Self>) -> i64 {
        id.and_then(|q| i64::try_from(q.0).ok())
            .unwrap_or(Self::WIRE_NONE)
    }

    /// Decodes a wire value; anything `<= 0` means no question.
    #[must_use]
    pub fn from_wire(raw: i64) -> Option<Self> {
        u64::try_from(raw).ok().filter(|v| *v > 0).map(Self)
    }
}

impl GroupId {
    /// Wire and storage value meaning "no group assigned".
    pub const WIRE_NONE: i64 = 0;

    #[must_use]
    pub fn to_wire(id: Option<Self>) -> i64 {
        id.and_then(|g| i64::try_from(g.0).ok())
            .unwrap_or(Self::WIRE_NONE)
    }

    #[must_use]
    pub fn from_wire(raw: i64) -> Option<Self> {
        u64::try_from(raw).ok().filter(|v| *v > 0).map(Self)
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_display_and_parse() {
        let id = SessionId::new(42);
        assert_eq!(id.to_string(), "42");
        let parsed: SessionId = " 42 ".parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn invalid_id_reports_kind() {
        let err = "abc".parse::<UserId>().unwrap_err();
        assert_eq!(err.to_string(), "failed to parse UserId from string");
    }

    #[test]
    fn debug_includes_type_name() {
        assert_eq!(format!("{:?}", QuestionId::new(7)), "QuestionId(7)");
    }

    #[test]
    fn question_sentinel_maps_to_none() {
        assert_eq!(QuestionId::from_wire(-1), None);
        assert_eq!(QuestionId::from_wire(0), None);
        assert_eq!(QuestionId::from_wire(12), Some(QuestionId::new(12)));
        assert_eq!(QuestionId::to_wire(None), -1);
        assert_eq!(QuestionId::to_wire(Some(QuestionId::new(12))), 12);
    }

    #[test]
    fn group_sentinel_is_zero() {
        assert_eq!(GroupId::from_wire(0), None);
        assert_eq!(GroupId::to_wire(None), 0);
        assert_eq!(GroupId::to_wire(Some(GroupId::new(7))), 7);
    }
}
