//! Pipeline Test Kit - test infrastructure for the Pipeline client
//!
//! - [`MockPipeline`] - wiremock-backed Pipeline API with the receive, sync
//!   and send endpoints
//! - [`FeedWriter`] - scripted in-memory transport feeding an envelope decoder
//! - [`fixtures`] - envelope and error body builders
//! - Tracing configuration for test output
//!
//! # Example
//!
//! ```rust,ignore
//! use pipeline_testkit::{MockPipeline, fixtures};
//!
//! #[tokio::test]
//! async fn test_receive() {
//!     pipeline_testkit::init_test_tracing();
//!
//!     let mock = MockPipeline::start().await;
//!     mock.expect_receive("topic", &[fixtures::ping(), fixtures::end_of_stream()]).await;
//!
//!     let client = PipelineClient::new(config(mock.base_url()), StaticToken::new("token"))?;
//!     // ...
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

pub mod fixtures;
mod mock_server;
mod tracing_config;
mod transport;

pub use mock_server::*;
pub use tracing_config::*;
pub use transport::*;
