pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;
pub mod traits;

pub use memory::InMemoryStore;
#[cfg(feature = "database")]
pub use postgres::PostgresStore;
pub use traits::{RecordFilter, RecordKind, RecordStore, SeasonKey, SeriesKey};
