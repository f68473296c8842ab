//! Full zone transfer (AXFR, RFC 5936) streaming.
//!
//! A producer task walks the zone in transfer order and packs records into
//! envelopes as it goes. Envelopes reach the transport through a bounded
//! channel, so a slow client holds the producer back instead of letting it
//! buffer the whole zone.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::Zone;
use super::record::RecordKind;
use crate::dns::MAX_TCP_MESSAGE;
use crate::dns::header::HEADER_LEN;
use crate::dns::resource::DNSResource;

/// Largest envelope that still fits one TCP message: what is left of 65535
/// bytes after the header and the longest possible question.
pub const MAX_ENVELOPE_BYTES: usize = MAX_TCP_MESSAGE - HEADER_LEN - (255 + 4);

/// A batch of records small enough for one transfer message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub records: Vec<DNSResource>,
}

impl Envelope {
    /// Uncompressed size of the records
    pub fn wire_len(&self) -> usize {
        self.records
            .iter()
            .fold(0usize, |total, record| total.saturating_add(record.wire_len()))
    }
}

/// Cancellation signal shared by a transfer's producer and its consumer
#[derive(Clone, Debug)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in self, so the channel cannot close under us
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

#[derive(Debug, Clone)]
pub struct TransferEngine {
    max_bytes: usize,
    channel_capacity: usize,
    global_ttl: u32,
}

impl TransferEngine {
    /// `max_bytes` is clamped to `1..=MAX_ENVELOPE_BYTES`
    pub fn new(max_bytes: usize, channel_capacity: usize, global_ttl: u32) -> Self {
        Self {
            max_bytes: max_bytes.clamp(1, MAX_ENVELOPE_BYTES),
            channel_capacity: channel_capacity.max(1),
            global_ttl,
        }
    }

    /// Start streaming `zone`. The producer stops when the stream is dropped or cancelled.
    pub fn transfer(&self, zone: Arc<Zone>) -> TransferStream {
        let (sender, receiver) = mpsc::channel(self.channel_capacity);
        let cancel = CancelToken::new();
        let producer_cancel = cancel.clone();
        let max_bytes = self.max_bytes;
        let global_ttl = self.global_ttl;

        info!(
            "Starting transfer of {} (serial {}, {} records)",
            zone.name,
            zone.serial(),
            zone.record_count()
        );

        let producer = tokio::spawn(async move {
            let mut packer = EnvelopePacker::new(max_bytes);
            let mut sent = 0usize;

            for record in ordered_records(&zone, global_ttl) {
                if let Some(envelope) = packer.push(record) {
                    if !emit(&sender, &producer_cancel, envelope).await {
                        debug!("Transfer of {} stopped after {} envelopes", zone.name, sent);
                        return;
                    }
                    sent += 1;
                }
            }
            if let Some(envelope) = packer.finish() {
                if !emit(&sender, &producer_cancel, envelope).await {
                    debug!("Transfer of {} stopped after {} envelopes", zone.name, sent);
                    return;
                }
                sent += 1;
            }
            debug!("Transfer of {} produced {} envelopes", zone.name, sent);
        });

        TransferStream {
            receiver,
            cancel,
            producer,
        }
    }
}

async fn emit(sender: &mpsc::Sender<Envelope>, cancel: &CancelToken, envelope: Envelope) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = sender.send(envelope) => sent.is_ok(),
    }
}

/// Consumer side of a running transfer
pub struct TransferStream {
    receiver: mpsc::Receiver<Envelope>,
    cancel: CancelToken,
    producer: JoinHandle<()>,
}

impl TransferStream {
    /// Next envelope, or None once the zone is exhausted or the transfer was cancelled
    pub async fn next(&mut self) -> Option<Envelope> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.receiver.recv().await
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_producer_finished(&self) -> bool {
        self.producer.is_finished()
    }
}

impl Drop for TransferStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Zone records in transfer order: SOA, apex NS, then every location in name
/// order with its sets in kind order. Apex SOA and NS are not repeated.
///
/// Records are built as the iterator is advanced.
pub fn ordered_records(zone: &Zone, global_ttl: u32) -> impl Iterator<Item = DNSResource> + '_ {
    let soa = std::iter::once(zone.soa_record(global_ttl));
    let apex_ns = zone
        .apex()
        .into_iter()
        .flat_map(|apex| apex.records(RecordKind::NS))
        .map(move |ns| zone.resource(&zone.name, ns, global_ttl));

    let rest = zone.locations().flat_map(move |location| {
        let owner = zone.owner_name(&location.name);
        location
            .rrsets()
            .filter(move |rrset| {
                !(location.is_apex() && matches!(rrset.kind, RecordKind::SOA | RecordKind::NS))
            })
            .flat_map(move |rrset| {
                let owner = owner.clone();
                rrset
                    .records
                    .iter()
                    .map(move |record| zone.resource(&owner, record, global_ttl))
            })
    });

    soa.chain(apex_ns).chain(rest)
}

/// Split records into envelopes without reordering them
pub fn pack(records: impl IntoIterator<Item = DNSResource>, max_bytes: usize) -> Vec<Envelope> {
    let mut packer = EnvelopePacker::new(max_bytes);
    let mut envelopes: Vec<Envelope> = records
        .into_iter()
        .filter_map(|record| packer.push(record))
        .collect();
    envelopes.extend(packer.finish());
    envelopes
}

/// Greedy packing by uncompressed size. A record larger than the limit gets
/// an envelope of its own; records are never split.
struct EnvelopePacker {
    max_bytes: usize,
    current: Vec<DNSResource>,
    bytes: usize,
}

impl EnvelopePacker {
    fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            current: Vec::new(),
            bytes: 0,
        }
    }

    /// Add a record; returns the previous envelope when this one did not fit
    fn push(&mut self, record: DNSResource) -> Option<Envelope> {
        let len = record.wire_len();
        let full = if !self.current.is_empty() && self.bytes.saturating_add(len) > self.max_bytes {
            self.bytes = 0;
            Some(Envelope {
                records: std::mem::take(&mut self.current),
            })
        } else {
            None
        };

        self.bytes = self.bytes.saturating_add(len);
        self.current.push(record);
        full
    }

    fn finish(&mut self) -> Option<Envelope> {
        if self.current.is_empty() {
            return None;
        }
        self.bytes = 0;
        Some(Envelope {
            records: std::mem::take(&mut self.current),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::resource::RData;

    fn a(name: &str, last: u8) -> DNSResource {
        DNSResource::new(name, 300, RData::A([192, 0, 2, last].into()))
    }

    #[test]
    fn test_pack_respects_limit() {
        // 31 bytes each for www.example.org.
        let records: Vec<DNSResource> = (0..10).map(|i| a("www.example.org.", i)).collect();
        let envelopes = pack(records.clone(), 100);

        assert_eq!(envelopes.len(), 4);
        assert!(envelopes.iter().all(|e| e.wire_len() <= 100));
        let flattened: Vec<DNSResource> = envelopes.into_iter().flat_map(|e| e.records).collect();
        assert_eq!(flattened, records);
    }

    #[test]
    fn test_oversized_record_travels_alone() {
        let big = DNSResource::new("big.example.org.", 300, RData::txt(&"x".repeat(400)));
        let records = vec![a("a.example.org.", 1), big.clone(), a("b.example.org.", 2)];
        let envelopes = pack(records, 100);

        assert_eq!(envelopes.len(), 3);
        assert_eq!(envelopes[1].records, vec![big]);
    }

    #[tokio::test]
    async fn test_dropped_stream_stops_producer() {
        let apex = r#"{"soa": [{"ns": "ns1", "mbox": "hostmaster"}]}"#;
        let mut locations = vec![crate::zone::Location::from_json("", "example.org.", apex).unwrap()];
        for i in 0..50 {
            let json = format!(r#"{{"a": [{{"ip": "192.0.2.{}"}}]}}"#, i);
            locations.push(crate::zone::Location::from_json(&format!("h{}", i), "example.org.", &json).unwrap());
        }
        let zone = Arc::new(Zone::new("example.org.", locations).unwrap());

        let engine = TransferEngine::new(1, 1, 300);
        let mut stream = engine.transfer(zone.clone());
        assert!(stream.next().await.is_some());
        assert!(Arc::strong_count(&zone) > 1);

        // The producer owns the other reference and releases it on exit
        drop(stream);
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while Arc::strong_count(&zone) > 1 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("producer should exit once the stream is dropped");
    }

    #[test]
    fn test_engine_clamps_envelope_size() {
        assert_eq!(TransferEngine::new(200_000, 4, 300).max_bytes, MAX_ENVELOPE_BYTES);
        assert_eq!(TransferEngine::new(0, 4, 300).max_bytes, 1);
    }

    #[test]
    fn test_pack_empty() {
        assert!(pack(Vec::new(), 100).is_empty());
    }

    #[tokio::test]
    async fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }
}
