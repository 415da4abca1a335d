//! Remote retail-platform API: transport with multi-host failover and the
//! typed client built on top of it.

mod retail_client;
mod transport;

pub use retail_client::RetailApiClient;
pub use transport::{Transport, TransportOutcome};
