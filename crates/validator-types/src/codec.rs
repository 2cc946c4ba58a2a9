// ============================================================================
// Vote Codec
// ============================================================================
//
// decode() = protobuf parse + structural validation. A record that fails
// either step never reaches the validation authority.
//
// ============================================================================

use prost::Message;
use thiserror::Error;

use crate::vote::{Vote, Voter};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to unmarshal vote: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("malformed vote: {0}")]
    Structural(#[from] StructuralError),
}

/// A vote that parsed but is missing required data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("candidate ID must be non-empty")]
    MissingCandidate,
    #[error("voter must be present")]
    MissingVoter,
    #[error("voter's passport must be non-empty")]
    MissingPassport,
    #[error("voter's fullname must be non-empty")]
    MissingFullname,
}

/// Parse a raw record payload into a well-formed vote
pub fn decode(payload: &[u8]) -> Result<Vote, CodecError> {
    let vote = Vote::decode(payload)?;
    validate(&vote)?;
    Ok(vote)
}

/// Like [`decode`], also handing back the voter that validation guarantees
pub fn decode_with_voter(payload: &[u8]) -> Result<(Vote, Voter), CodecError> {
    let vote = Vote::decode(payload)?;
    validate(&vote)?;
    let voter = vote.voter.clone().ok_or(StructuralError::MissingVoter)?;
    Ok((vote, voter))
}

pub fn validate(vote: &Vote) -> Result<(), StructuralError> {
    if vote.candidate_id == 0 {
        return Err(StructuralError::MissingCandidate);
    }
    let voter = vote.voter.as_ref().ok_or(StructuralError::MissingVoter)?;
    if voter.passport.is_empty() {
        return Err(StructuralError::MissingPassport);
    }
    if voter.fullname.is_empty() {
        return Err(StructuralError::MissingFullname);
    }
    Ok(())
}

pub fn encode(vote: &Vote) -> Vec<u8> {
    vote.encode_to_vec()
}
