//! Wire formats of the persistent channel between the scraping context and the
//! display context.
//!
//! Sources send [`SourceMessage`]s to the relay; the relay stamps and diffs them
//! and broadcasts [`ChannelRecord`]s in the persisted layout:
//! `{extractedData, timestamp, changes}` and `{priceData: {value, timestamp}}`.

use crate::{
    error::FlowError,
    snapshot::{RawValue, Snapshot, ValueChange},
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Latest full snapshot together with the metrics that changed to produce it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedDataRecord {
    pub extracted_data: Snapshot,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub changes: IndexMap<String, ValueChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PriceSample {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceDataRecord {
    pub price_data: PriceSample,
}

/// One record broadcast to display clients.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ChannelRecord {
    Extracted(ExtractedDataRecord),
    Price(PriceDataRecord),
}

impl ChannelRecord {
    pub fn decode(text: &str) -> Result<Self, FlowError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, FlowError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ChannelRecord::Extracted(record) => record.timestamp,
            ChannelRecord::Price(record) => record.price_data.timestamp,
        }
    }
}

impl From<ExtractedDataRecord> for ChannelRecord {
    fn from(value: ExtractedDataRecord) -> Self {
        Self::Extracted(value)
    }
}

impl From<PriceDataRecord> for ChannelRecord {
    fn from(value: PriceDataRecord) -> Self {
        Self::Price(value)
    }
}

/// Message pushed by a scraping context into the relay.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceMessage {
    /// Full labelled snapshot of the sentiment panel.
    Snapshot { data: Snapshot },
    /// One price figure, numeric or scraped text.
    Price { value: RawValue },
}

impl SourceMessage {
    pub fn decode(text: &str) -> Result<Self, FlowError> {
        Ok(serde_json::from_str(text)?)
    }
}
