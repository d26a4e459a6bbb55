// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::connection::{CommandOutput, Connection, ConnectionError, ConnectionProvider};
use async_trait::async_trait;
use rj_core::Host;
use std::sync::Arc;
use tracing::Instrument;

/// Wrapper that adds tracing to any ConnectionProvider
#[derive(Clone)]
pub struct TracedProvider<P> {
    inner: P,
}

impl<P> TracedProvider<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<P: ConnectionProvider> ConnectionProvider for TracedProvider<P> {
    async fn connect(&self, host: &Host) -> Result<Arc<dyn Connection>, ConnectionError> {
        let span = tracing::info_span!("connection.connect", host = %host);
        async {
            tracing::info!("connecting");
            let start = std::time::Instant::now();
            let result = self.inner.connect(host).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match result {
                Ok(conn) => {
                    tracing::info!(elapsed_ms, "connected");
                    Ok(Arc::new(TracedConnection {
                        inner: conn,
                        host: host.key(),
                    }) as Arc<dyn Connection>)
                }
                Err(e) => {
                    tracing::error!(elapsed_ms, error = %e, "connect failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Connection returned by [`TracedProvider`]
pub struct TracedConnection {
    inner: Arc<dyn Connection>,
    host: String,
}

#[async_trait]
impl Connection for TracedConnection {
    async fn run_command(
        &self,
        command: &str,
        verbose: bool,
    ) -> Result<CommandOutput, ConnectionError> {
        let span = tracing::info_span!("connection.run", host = %self.host);
        async {
            tracing::debug!(command, "running");
            let start = std::time::Instant::now();
            let result = self.inner.run_command(command, verbose).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(out) => tracing::debug!(elapsed_ms, exit_code = ?out.exit_code, "finished"),
                Err(e) => tracing::warn!(elapsed_ms, error = %e, "command failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
