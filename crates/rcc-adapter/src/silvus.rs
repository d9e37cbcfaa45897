//! Silvus StreamCaster driver
//!
//! The link tracks TCP reachability of the radio's control endpoint. Vendor
//! command encoding is not carried here; a command succeeds when the control
//! connection is still up when it is issued.

use std::io::ErrorKind;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::adapter::AdapterTiming;
use crate::driver::LinkedAdapter;
use crate::error::LinkError;
use crate::link::RadioLink;
use crate::types::{CapabilityInfo, PowerRange, RadioId};

/// Adapter type key for Silvus radios
pub const SILVUS_ADAPTER_TYPE: &str = "silvus";

/// A Silvus adapter
pub type SilvusAdapter = LinkedAdapter<TcpLink>;

/// Capabilities of a stock StreamCaster: three 2.4 GHz channels, 0.1 to 5 W
pub fn silvus_capabilities() -> CapabilityInfo {
    CapabilityInfo::new([2412.0, 2437.0, 2462.0], PowerRange::new(0.1, 5.0))
}

/// Build a Silvus adapter for a `host:port` control endpoint
pub fn silvus_adapter(
    id: RadioId,
    endpoint: impl Into<String>,
    capabilities: CapabilityInfo,
    timing: AdapterTiming,
) -> SilvusAdapter {
    LinkedAdapter::new(
        id,
        SILVUS_ADAPTER_TYPE,
        capabilities,
        timing,
        TcpLink::new(endpoint),
    )
}

/// TCP control connection to a radio
pub struct TcpLink {
    endpoint: String,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpLink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            stream: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn dial(&self) -> Result<TcpStream, LinkError> {
        TcpStream::connect(&self.endpoint)
            .await
            .map_err(|e| LinkError::Unreachable(format!("{}: {}", self.endpoint, e)))
    }

    /// Check the open connection without blocking
    async fn ensure_alive(&self) -> Result<(), LinkError> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_ref() else {
            return Err(LinkError::Lost(format!("{}: not connected", self.endpoint)));
        };

        let mut buf = [0u8; 64];
        match stream.try_read(&mut buf) {
            Ok(0) => {
                *guard = None;
                Err(LinkError::Lost(format!("{}: closed by peer", self.endpoint)))
            }
            // Unsolicited status output, discarded
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => {
                *guard = None;
                Err(LinkError::Lost(format!("{}: {}", self.endpoint, e)))
            }
        }
    }
}

#[async_trait]
impl RadioLink for TcpLink {
    fn vendor(&self) -> &str {
        SILVUS_ADAPTER_TYPE
    }

    async fn open(&self) -> Result<(), LinkError> {
        let stream = self.dial().await?;
        debug!("Opened control link to {}", self.endpoint);
        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    async fn apply_power(&self, _watts: f64) -> Result<(), LinkError> {
        self.ensure_alive().await
    }

    async fn apply_channel(&self, _channel_index: u32, _frequency_mhz: f64) -> Result<(), LinkError> {
        self.ensure_alive().await
    }

    async fn probe(&self) -> Result<(), LinkError> {
        if self.ensure_alive().await.is_ok() {
            return Ok(());
        }
        self.open().await
    }

    async fn close(&self) {
        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.shutdown().await;
            debug!("Closed control link to {}", self.endpoint);
        }
    }
}
