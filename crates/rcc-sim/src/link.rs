//! Simulated radio link

use std::sync::Arc;

use async_trait::async_trait;
use rcc_adapter::{LinkError, RadioLink};
use tracing::trace;

use crate::control::{SimControl, SimOp};

/// A link to a simulated radio, driven by a shared [`SimControl`]
#[derive(Debug, Clone)]
pub struct SimLink {
    vendor: String,
    control: Arc<SimControl>,
}

impl SimLink {
    /// Create a link answering with generic vendor tokens
    pub fn new(control: Arc<SimControl>) -> Self {
        Self {
            vendor: "generic".to_string(),
            control,
        }
    }

    /// Use another vendor's token table for rejections
    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    pub fn control(&self) -> &Arc<SimControl> {
        &self.control
    }

    async fn exchange(&self, op: SimOp) -> Result<(), LinkError> {
        let _call = self.control.enter(op);
        trace!("Sim link {}", op);

        if self.control.take_panic() {
            panic!("simulated driver fault during {}", op);
        }

        let latency = self.control.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.control.is_hung() {
            std::future::pending::<()>().await;
        }

        if !self.control.is_reachable() {
            return Err(match op {
                SimOp::Open | SimOp::Probe => {
                    LinkError::Unreachable("simulated radio not reachable".to_string())
                }
                _ => LinkError::Lost("simulated radio dropped the link".to_string()),
            });
        }

        if op.is_command() {
            if let Some(token) = self.control.take_rejection() {
                return Err(LinkError::Rejected(token));
            }
        }

        self.control.record_applied(op);
        Ok(())
    }
}

#[async_trait]
impl RadioLink for SimLink {
    fn vendor(&self) -> &str {
        &self.vendor
    }

    async fn open(&self) -> Result<(), LinkError> {
        self.exchange(SimOp::Open).await
    }

    async fn apply_power(&self, watts: f64) -> Result<(), LinkError> {
        self.exchange(SimOp::Power { watts }).await
    }

    async fn apply_channel(&self, channel_index: u32, frequency_mhz: f64) -> Result<(), LinkError> {
        self.exchange(SimOp::Channel {
            index: channel_index,
            frequency_mhz,
        })
        .await
    }

    async fn probe(&self) -> Result<(), LinkError> {
        self.exchange(SimOp::Probe).await
    }

    async fn close(&self) {
        let _ = self.exchange(SimOp::Close).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_commands_apply() {
        let link = SimLink::new(SimControl::new());
        link.open().await.unwrap();
        link.apply_power(2.5).await.unwrap();
        link.apply_channel(2, 2437.0).await.unwrap();

        let applied = link.control().applied();
        assert_eq!(applied.power_watts, Some(2.5));
        assert_eq!(applied.channel_index, Some(2));
        assert_eq!(applied.frequency_mhz, Some(2437.0));
    }

    #[tokio::test]
    async fn test_unreachable() {
        let link = SimLink::new(SimControl::new());
        link.control().set_reachable(false);

        assert!(matches!(link.open().await, Err(LinkError::Unreachable(_))));
        assert!(matches!(
            link.apply_power(1.0).await,
            Err(LinkError::Lost(_))
        ));
        assert_eq!(link.control().applied().power_watts, None);
    }

    #[tokio::test]
    async fn test_rejection_only_hits_commands() {
        let link = SimLink::new(SimControl::new()).with_vendor("silvus");
        link.control().reject_next("TX_POWER_OUT_OF_RANGE");

        link.probe().await.unwrap();
        assert_eq!(
            link.apply_power(1.0).await,
            Err(LinkError::Rejected("TX_POWER_OUT_OF_RANGE".to_string()))
        );
        link.apply_power(1.0).await.unwrap();
        assert_eq!(link.vendor(), "silvus");
    }

    #[tokio::test]
    async fn test_hang_never_completes() {
        let link = SimLink::new(SimControl::new());
        link.control().set_hang(true);

        let outcome = tokio::time::timeout(Duration::from_millis(20), link.probe()).await;
        assert!(outcome.is_err());
        // Dropping the stalled call still closes its log entry
        assert!(!link.control().saw_overlap());
        assert_eq!(link.control().calls().len(), 2);
    }
}
