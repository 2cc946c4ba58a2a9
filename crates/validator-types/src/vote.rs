use chrono::{DateTime, NaiveDate, NaiveTime};
use prost_types::Timestamp;

/// Identity data checked against the external registry
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Voter {
    #[prost(string, tag = "1")]
    pub passport: String,
    #[prost(string, tag = "2")]
    pub fullname: String,
    #[prost(message, optional, tag = "3")]
    pub death_date: Option<Timestamp>,
}

impl Voter {
    pub fn new(passport: impl Into<String>, fullname: impl Into<String>) -> Self {
        Self {
            passport: passport.into(),
            fullname: fullname.into(),
            death_date: None,
        }
    }

    /// Calendar date of death, if the registry recorded one
    pub fn died_on(&self) -> Option<NaiveDate> {
        self.death_date.as_ref().and_then(timestamp_to_date)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum VoteStatus {
    Unverified = 0,
    Pass = 1,
    Fail = 2,
}

impl VoteStatus {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            VoteStatus::Unverified => "UNVERIFIED",
            VoteStatus::Pass => "PASS",
            VoteStatus::Fail => "FAIL",
        }
    }
}

/// A ballot cast by a voter for a candidate
///
/// `fail_reason` is set exactly when `status` is FAIL; use [`Vote::mark_failed`]
/// rather than writing the fields separately.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Vote {
    #[prost(int64, tag = "1")]
    pub candidate_id: i64,
    #[prost(message, optional, tag = "2")]
    pub voter: Option<Voter>,
    #[prost(enumeration = "VoteStatus", tag = "3")]
    pub status: i32,
    #[prost(string, optional, tag = "4")]
    pub fail_reason: Option<String>,
}

impl Vote {
    pub fn new(candidate_id: i64, voter: Voter) -> Self {
        Self {
            candidate_id,
            voter: Some(voter),
            status: VoteStatus::Unverified as i32,
            fail_reason: None,
        }
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.set_status(VoteStatus::Fail);
        self.fail_reason = Some(reason.into());
    }

    /// `fail_reason` is present if and only if the vote failed
    pub fn is_consistent(&self) -> bool {
        (self.status() == VoteStatus::Fail) == self.fail_reason.is_some()
    }
}

pub fn timestamp_to_date(ts: &Timestamp) -> Option<NaiveDate> {
    let nanos = u32::try_from(ts.nanos).ok()?;
    DateTime::from_timestamp(ts.seconds, nanos).map(|dt| dt.date_naive())
}

/// Midnight UTC of `date`
pub fn date_to_timestamp(date: NaiveDate) -> Timestamp {
    Timestamp {
        seconds: date.and_time(NaiveTime::MIN).and_utc().timestamp(),
        nanos: 0,
    }
}
