pub mod client;
pub mod config;
pub mod error;
pub mod session;

pub use client::{
    CollectionPage, CollectionQuery, OverallStats, PermitApiClient, UpdateStatusData,
    UpdateStatusRequest,
};
pub use config::{ConfigError, DeskConfig};
pub use error::{ApiError, ErrorKind};
pub use session::{AccessGate, DeskSession};

pub const API_CONTRACT_VERSION: &str = "api.v1";
