//! Testing utilities for deterministic conversation tests.

pub mod mock_transport;

pub use mock_transport::{MockChannel, MockTransport};
