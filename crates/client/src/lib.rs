//! Client side of the wittr offline pipeline.
//!
//! This crate provides the HTTP asset fetcher, the tiered asset cache with
//! its worker lifecycle and eviction loop, and the reconnecting live-update
//! channel that feeds the core reconciler.

pub mod assets;
pub mod channel;
pub mod fetch;

pub use assets::{AssetCacheManager, AssetRoute, CacheNames, ControlMessage, Worker, WorkerState};
pub use channel::{
    BatchSink, ChannelConfig, ChannelError, ChannelState, Connection, Connector, FrameScheduler, ReconnectingChannel,
    ToastId, Toasts,
};
pub use fetch::{AssetFetcher, FetchConfig, HttpFetcher};
