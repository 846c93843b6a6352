//! Service layer: channel catalog, liveness probing and the network fetch
//! capability they share with playback.

pub mod catalog;
pub mod liveness_prober;
pub mod stream_fetcher;

pub use catalog::{CatalogHandle, ChannelCatalog, LivenessSummary};
pub use liveness_prober::{LivenessProber, ProbeOutcome, ProbeSummary, ProbeTask};
pub use stream_fetcher::{FetchResponse, ReqwestFetcher, StreamFetcher};
