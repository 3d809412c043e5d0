//! REST API for contract signing

mod handlers;
mod router;

pub use router::build_router;
