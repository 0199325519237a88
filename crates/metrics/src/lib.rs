//! Gauge definitions and the backends that publish them.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod app_insights;
mod delegate;
mod error;
mod gauges;
mod log;
mod memory;
mod otlp;
mod push_gateway;
mod server;
mod service;

pub mod registry;

pub use app_insights::{AppInsightsRecorder, DEFAULT_INGESTION_URL};
pub use delegate::DelegateRecorder;
pub use error::{Error, Result};
pub use log::LogRecorder;
pub use memory::MemoryRecorder;
pub use otlp::{OtlpProtocol, OtlpRecorder};
pub use push_gateway::{PUSH_JOB, PushGatewayRecorder};
pub use registry::{MetricDefinition, MetricRegistry};
pub use server::{MetricsServer, PrometheusRecorder};
pub use service::{Labels, MetricsService, RecordService};
