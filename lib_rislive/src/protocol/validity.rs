//! # RPKI Validity Responses
//!
//! Routinator answers `GET /validity?asn=..&prefix=..` with
//! `{"validated_route": {"route": {...}, "validity": {"state": "...", ...}}}`.
//! Only `state` matters here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Body Routinator returns while its first validation run is still in progress.
pub const WARMING_UP_BODY: &str = "Initial validation ongoing. Please wait.";

/// Outcome of checking one (origin AS, prefix) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Valid,
    Invalid,
    /// The oracle could not be asked or did not answer sensibly.
    Unknown,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Verdict::Valid => "valid",
            Verdict::Invalid => "invalid",
            Verdict::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ValidatedMessage {
    pub validated_route: Option<ValidatedRoute>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ValidatedRoute {
    pub validity: Option<Validity>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Validity {
    pub state: Option<String>,
}

impl ValidatedMessage {
    /// `invalid` is the only rejecting state; `valid` and `not-found` both pass.
    /// A body without a state, or with a state Routinator never reports, is
    /// `Unknown`.
    pub fn verdict(&self) -> Verdict {
        let state = self
            .validated_route
            .as_ref()
            .and_then(|route| route.validity.as_ref())
            .and_then(|validity| validity.state.as_deref());

        match state {
            Some("invalid") => Verdict::Invalid,
            Some("valid") | Some("not-found") => Verdict::Valid,
            Some(_) | None => Verdict::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict_of(body: &str) -> Verdict {
        serde_json::from_str::<ValidatedMessage>(body).unwrap().verdict()
    }

    #[test]
    fn test_states() {
        assert_eq!(verdict_of(r#"{"validated_route":{"validity":{"state":"invalid"}}}"#), Verdict::Invalid);
        assert_eq!(verdict_of(r#"{"validated_route":{"validity":{"state":"valid"}}}"#), Verdict::Valid);
        assert_eq!(verdict_of(r#"{"validated_route":{"validity":{"state":"not-found"}}}"#), Verdict::Valid);
    }

    #[test]
    fn test_missing_state_is_unknown() {
        assert_eq!(verdict_of(r#"{}"#), Verdict::Unknown);
        assert_eq!(verdict_of(r#"{"validated_route":{}}"#), Verdict::Unknown);
        assert_eq!(verdict_of(r#"{"validated_route":{"validity":{"reason":"x"}}}"#), Verdict::Unknown);
    }

    #[test]
    fn test_unrecognised_state_is_unknown() {
        assert_eq!(verdict_of(r#"{"validated_route":{"validity":{"state":""}}}"#), Verdict::Unknown);
        assert_eq!(verdict_of(r#"{"validated_route":{"validity":{"state":"vaild"}}}"#), Verdict::Unknown);
        assert_eq!(verdict_of(r#"{"validated_route":{"validity":{"state":"Invalid"}}}"#), Verdict::Unknown);
    }

    #[test]
    fn test_display() {
        assert_eq!(Verdict::Unknown.to_string(), "unknown");
        assert_eq!(serde_json::to_string(&Verdict::Invalid).unwrap(), "\"invalid\"");
    }
}
