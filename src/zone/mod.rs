pub mod answer;
pub mod cache;
pub mod locate;
pub mod matcher;
pub mod record;
pub mod transfer;
#[allow(clippy::module_inception)]
pub mod zone;

pub use answer::{Answer, AnswerSynthesizer, QueryKind};
pub use cache::{CacheEntry, ZoneCache};
pub use matcher::match_zone;
pub use record::{Location, RRSet, RecordKind, StoredRecord};
pub use transfer::{CancelToken, Envelope, TransferEngine, TransferStream};
pub use zone::Zone;
