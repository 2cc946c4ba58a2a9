// Shared test harness: in-memory claim session, recording producer and a
// scripted authority. None of it needs a broker or the network.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use validator_types::{Vote, Voter, encode};
use vote_validator::authority::{AuthorityError, VerificationOutcome, VoterAuthority};
use vote_validator::claim::{Claim, ClaimSession};
use vote_validator::kafka::{MessageEnvelope, RecordProducer};
use vote_validator::shutdown::Shutdown;

pub const TOPIC: &str = "votes";
pub const CHAIN_TOPIC: &str = "votes.validated";
pub const DEAD_TOPIC: &str = "votes.dead";

pub fn jane_vote() -> Vote {
    Vote::new(7, Voter::new("123", "Jane Doe"))
}

pub fn message(topic: &str, offset: i64, vote: &Vote) -> MessageEnvelope {
    MessageEnvelope::new(
        topic,
        0,
        offset,
        Some(format!("key-{}", offset).into_bytes()),
        encode(vote),
    )
}

pub fn raw_message(topic: &str, offset: i64, payload: &[u8]) -> MessageEnvelope {
    MessageEnvelope::new(topic, 0, offset, None, payload.to_vec())
}

// ============================================================================
// Session
// ============================================================================

/// Partition of pre-loaded messages
///
/// `redeliver` replays the log from the given offset, like a seek would, and
/// tags the replayed copies with a new epoch. The claim closes once the last
/// offset of the log is committed.
pub struct MemorySession {
    topic: String,
    shutdown: Shutdown,
    log: Vec<MessageEnvelope>,
    tx: Mutex<Option<mpsc::Sender<MessageEnvelope>>>,
    commits: Mutex<Vec<i64>>,
    redeliveries: Mutex<Vec<i64>>,
    epoch: AtomicU64,
    fail_commits: bool,
    head_expired: bool,
}

impl MemorySession {
    pub fn new(log: Vec<MessageEnvelope>, shutdown: Shutdown) -> (Self, Claim) {
        let topic = log
            .first()
            .map(|m| m.topic.clone())
            .unwrap_or_else(|| TOPIC.to_string());
        let (tx, rx) = mpsc::channel(log.len() * 4 + 8);
        for message in &log {
            tx.try_send(message.clone()).unwrap();
        }
        let tx = if log.is_empty() { None } else { Some(tx) };

        let session = Self {
            topic: topic.clone(),
            shutdown,
            log,
            tx: Mutex::new(tx),
            commits: Mutex::new(Vec::new()),
            redeliveries: Mutex::new(Vec::new()),
            epoch: AtomicU64::new(0),
            fail_commits: false,
            head_expired: false,
        };
        (session, Claim::new(topic, 0, rx))
    }

    pub fn failing_commits(mut self) -> Self {
        self.fail_commits = true;
        self
    }

    /// Rewinds find the requested record already removed by retention
    pub fn expiring_head(mut self) -> Self {
        self.head_expired = true;
        self
    }

    pub fn commits(&self) -> Vec<i64> {
        self.commits.lock().unwrap().clone()
    }

    pub fn redeliveries(&self) -> Vec<i64> {
        self.redeliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClaimSession for MemorySession {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn partition(&self) -> i32 {
        0
    }

    fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    async fn commit(&self, message: &MessageEnvelope) -> anyhow::Result<()> {
        if self.fail_commits {
            anyhow::bail!("group is rebalancing");
        }
        self.commits.lock().unwrap().push(message.offset);
        if self.log.last().map(|m| m.offset) == Some(message.offset) {
            self.tx.lock().unwrap().take();
        }
        Ok(())
    }

    async fn redeliver(&self, message: &MessageEnvelope) -> anyhow::Result<u64> {
        self.redeliveries.lock().unwrap().push(message.offset);
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let first = if self.head_expired {
            message.offset + 1
        } else {
            message.offset
        };
        let tx = self.tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            for replay in self.log.iter().filter(|m| m.offset >= first) {
                tx.send(replay.clone().with_epoch(epoch)).await?;
            }
        }
        Ok(epoch)
    }
}

// ============================================================================
// Producer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Produced {
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

#[derive(Default)]
pub struct MemoryProducer {
    records: Mutex<Vec<Produced>>,
    failing_topics: HashSet<String>,
}

impl MemoryProducer {
    pub fn failing_on(topic: &str) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failing_topics: HashSet::from([topic.to_string()]),
        }
    }

    pub fn records(&self) -> Vec<Produced> {
        self.records.lock().unwrap().clone()
    }

    pub fn to_topic(&self, topic: &str) -> Vec<Produced> {
        self.records()
            .into_iter()
            .filter(|r| r.topic == topic)
            .collect()
    }
}

#[async_trait]
impl RecordProducer for MemoryProducer {
    async fn send(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: &[u8],
    ) -> anyhow::Result<(i32, i64)> {
        if self.failing_topics.contains(topic) {
            anyhow::bail!("Message production error: MessageTimedOut");
        }
        let mut records = self.records.lock().unwrap();
        records.push(Produced {
            topic: topic.to_string(),
            key: key.map(<[u8]>::to_vec),
            payload: payload.to_vec(),
        });
        Ok((0, records.len() as i64 - 1))
    }
}

// ============================================================================
// Authority
// ============================================================================

#[derive(Debug, Clone)]
pub enum Reply {
    Updated(Voter),
    Rejected(&'static str),
    InvalidInput(&'static str),
    Unavailable,
    /// Never answers; resolves only through shutdown
    Hang,
}

/// Answers from a script; the last reply repeats once the script runs out
pub struct ScriptedAuthority {
    replies: Mutex<VecDeque<Reply>>,
    last: Mutex<Option<Reply>>,
    calls: AtomicUsize,
}

impl ScriptedAuthority {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(reply: Reply) -> Self {
        Self::new([reply])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Reply {
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            *last = Some(reply);
        }
        last.clone().unwrap_or(Reply::Unavailable)
    }
}

#[async_trait]
impl VoterAuthority for ScriptedAuthority {
    async fn verify(&self, shutdown: &Shutdown, _voter: &Voter) -> VerificationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_reply() {
            Reply::Updated(voter) => VerificationOutcome::Updated(voter),
            Reply::Rejected(reason) => VerificationOutcome::Rejected(reason.to_string()),
            Reply::InvalidInput(reason) => VerificationOutcome::InvalidInput(reason.to_string()),
            Reply::Unavailable => VerificationOutcome::Transient(AuthorityError::Status {
                status: 503,
                body: "registry under maintenance".to_string(),
            }),
            Reply::Hang => {
                shutdown.cancelled().await;
                VerificationOutcome::Cancelled
            }
        }
    }
}
