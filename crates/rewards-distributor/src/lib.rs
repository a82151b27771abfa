pub mod chain;
pub mod config;
pub mod distributor;
pub mod error;
pub mod events;
pub mod export;
pub mod initial_state;
pub mod owners;
pub mod records;
pub mod sources;
pub mod subgraph;
pub mod transport;

pub use config::{DistributorConfig, RetryConfig};
pub use distributor::{CampaignWindow, Distributor};
pub use error::{DistributorError, DistributorResult};
pub use export::{Exporter, RunReport};
pub use transport::{HttpTransport, JsonTransport};
