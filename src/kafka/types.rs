use rdkafka::Message;

/// One consumed record, detached from the consumer that produced it
///
/// The payload is kept as raw bytes: decoding happens in the claim loop, and
/// dead-lettering must forward the exact bytes that were consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    /// Rewind generation of the partition when this record reached its claim
    pub epoch: u64,
}

impl MessageEnvelope {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        key: Option<Vec<u8>>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key,
            payload,
            epoch: 0,
        }
    }

    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    /// Copy a borrowed rdkafka message. An absent payload becomes empty bytes.
    pub fn from_message<M: Message>(message: &M) -> Self {
        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            epoch: 0,
        }
    }

    /// (topic, partition) this record belongs to
    pub fn claim_key(&self) -> (String, i32) {
        (self.topic.clone(), self.partition)
    }
}
