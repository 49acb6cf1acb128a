mod table;
mod source;
mod static_source;
mod directory;
mod destination;

pub use table::{TableId, Fingerprint, FingerprintRecord};
pub(crate) use table::is_identifier;
pub use source::{FingerprintSource, CatalogSnapshot};
pub use static_source::StaticFingerprintSource;
pub use directory::{DirectoryFingerprintSource, DEFAULT_PATTERN};
pub use destination::{Destination, DestinationLookup, PublishMode};
