//! Validation and normalization of inbound sale submissions.
//!
//! A submission must be a JSON object carrying `amount`, `date` and `time`.
//! Extra fields are ignored and never forwarded. Anything that does not
//! normalize into a [`SaleEvent`] is rejected with a [`ValidationError`]
//! rather than forwarded best effort.

use compact_str::CompactString;
use salerelay_sdk::objects::{Ack, Amount, AmountError, SaleEvent};
use serde::Deserialize;
use serde_json::Value;
use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use tracing::info;

use crate::broadcaster::{Broadcaster, PublishReport};

/// Longest accepted `time` value, in characters.
pub const MAX_TIME_LEN: usize = 64;

/// ISO-8601 extended calendar date, the only accepted `date` form.
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Reasons a submission is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("body is not a JSON object: {0}")]
    MalformedJson(String),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid `amount`: {0}")]
    InvalidAmount(#[from] AmountError),
    #[error("invalid `date`: expected an ISO-8601 calendar date such as 2024-06-01")]
    InvalidDate,
    #[error("invalid `time`: {0}")]
    InvalidTime(&'static str),
}

/// A submission as received from the producer, before validation.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SalePayload {
    pub amount: Option<Value>,
    pub date: Option<Value>,
    pub time: Option<Value>,
}

impl SalePayload {
    /// Parse a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ValidationError::MalformedJson(e.to_string()))?;
        if !value.is_object() {
            return Err(ValidationError::MalformedJson(
                "expected an object".to_owned(),
            ));
        }
        serde_json::from_value(value).map_err(|e| ValidationError::MalformedJson(e.to_string()))
    }

    /// Validate every field and build the normalized sale.
    pub fn normalize(self) -> Result<SaleEvent, ValidationError> {
        let amount = normalize_amount(self.amount.ok_or(ValidationError::MissingField("amount"))?)?;
        let date = normalize_date(self.date.ok_or(ValidationError::MissingField("date"))?)?;
        let time = normalize_time(self.time.ok_or(ValidationError::MissingField("time"))?)?;
        Ok(SaleEvent { amount, date, time })
    }
}

fn normalize_amount(value: Value) -> Result<Amount, ValidationError> {
    let amount = match value {
        Value::Number(n) => n.to_string().parse::<Amount>()?,
        Value::String(s) => s.parse::<Amount>()?,
        _ => return Err(AmountError::NotANumber.into()),
    };
    Ok(amount)
}

fn normalize_date(value: Value) -> Result<Date, ValidationError> {
    match value {
        Value::String(s) => {
            Date::parse(s.trim(), DATE_FORMAT).map_err(|_| ValidationError::InvalidDate)
        }
        _ => Err(ValidationError::InvalidDate),
    }
}

fn normalize_time(value: Value) -> Result<CompactString, ValidationError> {
    let Value::String(s) = value else {
        return Err(ValidationError::InvalidTime("must be a string"));
    };
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidTime("must not be empty"));
    }
    if trimmed.chars().count() > MAX_TIME_LEN {
        return Err(ValidationError::InvalidTime("must be at most 64 characters"));
    }
    Ok(CompactString::from(trimmed))
}

/// Entry point for producer submissions.
pub struct EventIngress {
    broadcaster: Broadcaster,
}

impl EventIngress {
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self { broadcaster }
    }

    /// Validate a submission and hand it to the broadcaster.
    ///
    /// The acknowledgement does not wait for subscribers to receive the sale.
    pub async fn submit_event(&self, payload: SalePayload) -> Result<Ack, ValidationError> {
        let event = payload.normalize()?;
        let report = self.broadcaster.publish(&event).await;
        log_relayed(&event, report);
        Ok(Ack::accepted())
    }

    /// Parse, validate and relay a raw request body.
    pub async fn submit_raw(&self, body: &[u8]) -> Result<Ack, ValidationError> {
        self.submit_event(SalePayload::from_slice(body)?).await
    }
}

fn log_relayed(event: &SaleEvent, report: PublishReport) {
    info!(
        amount = %event.amount,
        date = %event.date,
        time = %event.time,
        delivered = report.delivered,
        dropped = report.dropped,
        "sale relayed"
    );
}
