use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use validator_types::{Voter, date_to_timestamp};

/// Body of `POST /api/users/passport`
#[derive(Debug, Clone, Serialize)]
pub struct PassportRequest<'a> {
    pub passport: &'a str,
}

/// Body of a 400 response
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: i64,
}

/// Voter as the registry returns it on 200
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterRecord {
    #[serde(default)]
    pub passport: String,
    #[serde(default)]
    pub fullname: String,
    #[serde(default, alias = "death_date")]
    pub death_date: Option<DeathDate>,
}

/// Death dates arrive either as text or as a protobuf-style timestamp object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DeathDate {
    Text(String),
    Timestamp {
        seconds: i64,
        #[serde(default)]
        nanos: i32,
    },
}

impl DeathDate {
    pub fn to_date(&self) -> Result<NaiveDate, String> {
        match self {
            DeathDate::Text(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
                .map_err(|_| format!("invalid death date {:?}", raw)),
            DeathDate::Timestamp { seconds, nanos } => u32::try_from(*nanos)
                .ok()
                .and_then(|nanos| DateTime::from_timestamp(*seconds, nanos))
                .map(|dt| dt.date_naive())
                .ok_or_else(|| format!("invalid death timestamp {}s", seconds)),
        }
    }
}

impl VoterRecord {
    /// Convert into a wire voter. A record without a passport keeps `original_passport`.
    pub fn into_voter(self, original_passport: &str) -> Result<Voter, String> {
        let death_date = self
            .death_date
            .as_ref()
            .map(DeathDate::to_date)
            .transpose()?
            .map(date_to_timestamp);

        let passport = if self.passport.is_empty() {
            original_passport.to_string()
        } else {
            self.passport
        };

        Ok(Voter {
            passport,
            fullname: self.fullname,
            death_date,
        })
    }
}
