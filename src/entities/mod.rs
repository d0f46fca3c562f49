// Entity Models
//
// Each entity has a stable canonical code plus the names that identify it
// in free-text sources.

pub mod country;

pub use country::{normalize_code, CountryReference, CountryRegistry, NameMatch, ReferenceColumns};
