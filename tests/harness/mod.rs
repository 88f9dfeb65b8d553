//! Shared test infrastructure:
//!
//! - Scripted peer links and a factory that hands them out in order
//! - A recording signal sink and a spy signal handler
//! - An in-process WebSocket relay speaking the wire protocol

// Each test binary uses a different slice of the harness.
#![allow(dead_code)]

pub mod mocks;
pub mod relay;

pub use mocks::{HandlerCall, RecordingSink, ScriptedFactory, ScriptedLink, SentSignal, SpyHandler};
pub use relay::TestRelay;

use std::time::Duration;
use tokio::sync::mpsc;

/// Receive with a deadline so a broken test fails instead of hanging
pub async fn recv_timeout<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("channel closed")
}

/// Install a test subscriber once; `RUST_LOG` controls verbosity
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
