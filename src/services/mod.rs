pub mod gmgn_api;
pub mod monitoring;
pub mod request_queue;
pub mod rpc_client;
pub mod telegram;

pub use gmgn_api::{AggregatorApi, GmgnClient};
pub use monitoring::MonitoringService;
pub use request_queue::RequestQueue;
