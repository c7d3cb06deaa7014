//! Concrete agent implementations built on the execution core.

pub mod listing;

pub use listing::ListingGeneratorAgent;
