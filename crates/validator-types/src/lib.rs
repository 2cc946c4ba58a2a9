// ============================================================================
// Validator Types - Vote wire messages
// ============================================================================
//
// Protobuf messages exchanged over Kafka and the codec that turns raw record
// payloads into well-formed votes. No I/O and no business logic beyond the
// structural checks every stage relies on.
//
// Dependencies:
// - prost (protobuf encoding)
// - chrono (death dates)
//
// ============================================================================

pub mod codec;
pub mod vote;

// Re-exports for convenience
pub use codec::{CodecError, StructuralError, decode, decode_with_voter, encode, validate};
pub use vote::{Vote, VoteStatus, Voter, date_to_timestamp, timestamp_to_date};
