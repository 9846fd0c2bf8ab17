//! Reasons carried in a REJECT message.

use std::fmt;

/// Why the RTI (or a peer federate) refused a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Federation id in the join message does not match.
    FederationIdDoesNotMatch,
    /// A federate with this id is already connected.
    FederateIdInUse,
    /// Federate id is not in `[0, N)`.
    FederateIdOutOfRange,
    /// The message was not expected in the current protocol state.
    UnexpectedMessage,
    /// Connected to the wrong server.
    WrongServer,
}

impl RejectReason {
    /// One-byte wire code.
    pub fn code(self) -> u8 {
        match self {
            RejectReason::FederationIdDoesNotMatch => 1,
            RejectReason::FederateIdInUse => 2,
            RejectReason::FederateIdOutOfRange => 3,
            RejectReason::UnexpectedMessage => 4,
            RejectReason::WrongServer => 5,
        }
    }

    /// Parse a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(RejectReason::FederationIdDoesNotMatch),
            2 => Some(RejectReason::FederateIdInUse),
            3 => Some(RejectReason::FederateIdOutOfRange),
            4 => Some(RejectReason::UnexpectedMessage),
            5 => Some(RejectReason::WrongServer),
            _ => None,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RejectReason::FederationIdDoesNotMatch => "FEDERATION_ID_DOES_NOT_MATCH",
            RejectReason::FederateIdInUse => "FEDERATE_ID_IN_USE",
            RejectReason::FederateIdOutOfRange => "FEDERATE_ID_OUT_OF_RANGE",
            RejectReason::UnexpectedMessage => "UNEXPECTED_MESSAGE",
            RejectReason::WrongServer => "WRONG_SERVER",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_protocol() {
        assert_eq!(RejectReason::FederationIdDoesNotMatch.code(), 1);
        assert_eq!(RejectReason::FederateIdInUse.code(), 2);
        assert_eq!(RejectReason::FederateIdOutOfRange.code(), 3);
        assert_eq!(RejectReason::UnexpectedMessage.code(), 4);
        assert_eq!(RejectReason::WrongServer.code(), 5);
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(RejectReason::from_code(0), None);
        assert_eq!(RejectReason::from_code(6), None);
        assert_eq!(
            RejectReason::from_code(2),
            Some(RejectReason::FederateIdInUse)
        );
    }
}
