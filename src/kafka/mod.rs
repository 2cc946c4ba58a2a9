// Kafka adapters
//
// The only code that talks to rdkafka. The claim loop sees messages as
// MessageEnvelope, produces through RecordProducer and acknowledges through
// ClaimSession, so it runs unchanged against in-memory fakes.

pub mod config;
pub mod consumer;
pub mod producer;
pub mod types;

// Re-export commonly used types
pub use config::create_client_config;
pub use consumer::{ClaimConsumer, ClaimContext, KafkaClaimSession};
pub use producer::{MessageProducer, RecordProducer};
pub use types::MessageEnvelope;
