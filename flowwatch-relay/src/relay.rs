//! Relay state: diffs incoming snapshots and remembers the latest record of each
//! kind so newly connected display clients can be brought up to date.

use chrono::{DateTime, Utc};
use flowwatch_core::{
    ChannelRecord, ExtractedDataRecord, Observation, PriceDataRecord, PriceSample, Snapshot,
    SnapshotDiffer, SourceMessage, snapshot::is_tracked_metric,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct Relay {
    differ: SnapshotDiffer,
    latest_extracted: Option<ExtractedDataRecord>,
    latest_price: Option<PriceDataRecord>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a source message with `received_at` and turn it into the record to
    /// broadcast, if any.
    pub fn on_source(&mut self, message: SourceMessage, received_at: DateTime<Utc>) -> Option<ChannelRecord> {
        match message {
            SourceMessage::Snapshot { data } => self.on_snapshot(data, received_at),
            SourceMessage::Price { value } => self.on_price(Observation::price(value, received_at)),
        }
    }

    fn on_snapshot(&mut self, data: Snapshot, received_at: DateTime<Utc>) -> Option<ChannelRecord> {
        let untracked = data.keys().filter(|metric| !is_tracked_metric(metric)).count();
        if untracked > 0 {
            debug!(untracked, "snapshot carries untracked labels");
        }

        let is_baseline = self.differ.previous().is_none();
        let changes = self.differ.diff(&data);
        if !is_baseline && changes.is_empty() {
            return None;
        }

        debug!(changed = changes.len(), is_baseline, "snapshot accepted");
        let record = ExtractedDataRecord {
            extracted_data: data,
            timestamp: received_at,
            changes,
        };
        self.latest_extracted = Some(record.clone());
        Some(record.into())
    }

    fn on_price(&mut self, observation: Observation) -> Option<ChannelRecord> {
        let value = observation.value();
        if value == 0.0 {
            warn!(raw = ?observation.raw_value, "dropping unparseable price sample");
            return None;
        }

        let record = PriceDataRecord {
            price_data: PriceSample {
                value,
                timestamp: observation.observed_at,
            },
        };
        self.latest_price = Some(record);
        Some(record.into())
    }

    /// Latest record of each kind for a newly connected client.
    ///
    /// The snapshot is replayed without its change map so the client does not
    /// fold deltas it may already have seen.
    pub fn replay(&self) -> Vec<ChannelRecord> {
        let extracted = self.latest_extracted.as_ref().map(|record| {
            ChannelRecord::from(ExtractedDataRecord {
                changes: Default::default(),
                ..record.clone()
            })
        });

        extracted
            .into_iter()
            .chain(self.latest_price.map(ChannelRecord::from))
            .collect()
    }
}

/// Broadcast `record` to every connected client, returning how many received it.
pub fn broadcast_record(tx: &broadcast::Sender<ChannelRecord>, record: ChannelRecord) -> usize {
    match tx.send(record) {
        Ok(receivers) => receivers,
        Err(_) => {
            debug!("no display clients connected, record dropped");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flowwatch_core::snapshot::RawValue;

    fn at(s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 36, s).unwrap()
    }

    fn snapshot(pairs: &[(&str, &str)]) -> SourceMessage {
        SourceMessage::Snapshot {
            data: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_first_snapshot_is_broadcast_as_baseline() {
        let mut relay = Relay::new();
        let record = relay.on_source(snapshot(&[("SmartFlow", "100")]), at(0)).unwrap();

        let ChannelRecord::Extracted(record) = record else {
            panic!("expected extracted record");
        };
        assert!(record.changes.is_empty());
        assert_eq!(record.timestamp, at(0));
    }

    #[test]
    fn test_unchanged_snapshot_is_suppressed() {
        let mut relay = Relay::new();
        relay.on_source(snapshot(&[("SmartFlow", "100")]), at(0));
        assert!(relay.on_source(snapshot(&[("SmartFlow", "100")]), at(1)).is_none());

        let Some(ChannelRecord::Extracted(record)) =
            relay.on_source(snapshot(&[("SmartFlow", "1,100")]), at(2))
        else {
            panic!("expected extracted record");
        };
        assert_eq!(record.changes["SmartFlow"].from.as_deref(), Some("100"));
        assert_eq!(record.changes["SmartFlow"].to, "1,100");
    }

    #[test]
    fn test_price_samples() {
        struct TestCase {
            input: RawValue,
            expected: Option<f64>,
        }

        let tests = vec![
            TestCase {
                // TC0: numeric sample
                input: RawValue::Number(5123.25),
                expected: Some(5123.25),
            },
            TestCase {
                // TC1: scraped text with separators
                input: RawValue::Text("5,001.50".to_string()),
                expected: Some(5001.5),
            },
            TestCase {
                // TC2: unparseable text is dropped
                input: RawValue::Text("--".to_string()),
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let mut relay = Relay::new();
            let actual = relay
                .on_source(SourceMessage::Price { value: test.input }, at(0))
                .map(|record| match record {
                    ChannelRecord::Price(record) => record.price_data.value,
                    ChannelRecord::Extracted(_) => f64::NAN,
                });
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_replay_strips_changes() {
        let mut relay = Relay::new();
        assert!(relay.replay().is_empty());

        relay.on_source(snapshot(&[("NOFA", "1")]), at(0));
        relay.on_source(snapshot(&[("NOFA", "2")]), at(1));
        relay.on_source(SourceMessage::Price { value: RawValue::Number(10.0) }, at(2));

        let replay = relay.replay();
        assert_eq!(replay.len(), 2);
        assert!(matches!(&replay[0], ChannelRecord::Extracted(r) if r.changes.is_empty() && r.extracted_data["NOFA"] == "2"));
        assert!(matches!(&replay[1], ChannelRecord::Price(r) if r.price_data.value == 10.0));
    }

    #[tokio::test]
    async fn test_broadcast_record_reaches_subscribers() {
        let (tx, _) = broadcast::channel::<ChannelRecord>(8);
        let record = ChannelRecord::from(PriceDataRecord {
            price_data: PriceSample {
                value: 1.0,
                timestamp: at(0),
            },
        });

        // No subscribers is not an error
        assert_eq!(broadcast_record(&tx, record.clone()), 0);

        let mut rx_a = tx.subscribe();
        let mut rx_b = tx.subscribe();
        assert_eq!(broadcast_record(&tx, record.clone()), 2);
        assert_eq!(rx_a.recv().await.unwrap(), record);
        assert_eq!(rx_b.recv().await.unwrap(), record);
    }
}
