//! Transport seam between the generic driver and a vendor's I/O

use async_trait::async_trait;

use crate::error::LinkError;

/// I/O half of a radio driver
///
/// A link only moves bytes and reports what happened. Range checks, status
/// transitions and timeouts belong to [`LinkedAdapter`](crate::LinkedAdapter).
#[async_trait]
pub trait RadioLink: Send + Sync + 'static {
    /// Vendor key used to normalize rejection tokens
    fn vendor(&self) -> &str;

    /// Establish the link
    async fn open(&self) -> Result<(), LinkError>;

    /// Push a transmit power setting
    async fn apply_power(&self, watts: f64) -> Result<(), LinkError>;

    /// Push a channel setting
    async fn apply_channel(&self, channel_index: u32, frequency_mhz: f64) -> Result<(), LinkError>;

    /// Check that the radio answers, re-establishing the link if needed
    async fn probe(&self) -> Result<(), LinkError>;

    /// Release the link
    async fn close(&self);
}
