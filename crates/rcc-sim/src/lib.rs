//! Radio Simulation Library
//!
//! This crate provides simulated radios for exercising the control container
//! without hardware:
//!
//! - **SimLink**: a [`RadioLink`](rcc_adapter::RadioLink) answering from memory
//! - **SimControl**: shared fault injection (reachability, latency, hangs,
//!   vendor rejections, panics) and an ordered call log
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use rcc_adapter::{AdapterTiming, RadioAdapter, RadioId, RadioStatus};
//! use rcc_sim::{sim_adapter, sim_capabilities, SimControl};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let control = SimControl::with_latency(Duration::from_millis(1));
//! let radio = sim_adapter(
//!     RadioId::new("bench-1"),
//!     sim_capabilities(),
//!     AdapterTiming::default(),
//!     control.clone(),
//! );
//!
//! radio.connect().await.unwrap();
//! radio.set_power(1.5).await.unwrap();
//! assert_eq!(radio.state().status, RadioStatus::Ready);
//! assert_eq!(control.applied().power_watts, Some(1.5));
//! # }
//! ```

pub mod control;
pub mod link;

use std::sync::Arc;

use rcc_adapter::{AdapterTiming, CapabilityInfo, LinkedAdapter, PowerRange, RadioId};

pub use control::{AppliedSettings, CallPhase, SimCall, SimControl, SimOp};
pub use link::SimLink;

/// Adapter type key for simulated radios
pub const SIM_ADAPTER_TYPE: &str = "sim";

/// A simulated adapter
pub type SimAdapter = LinkedAdapter<SimLink>;

/// Default capabilities of a simulated radio
pub fn sim_capabilities() -> CapabilityInfo {
    CapabilityInfo::new([2412.0, 2437.0, 2462.0], PowerRange::new(0.1, 5.0))
}

/// Build a simulated adapter driven by `control`
pub fn sim_adapter(
    id: RadioId,
    capabilities: CapabilityInfo,
    timing: AdapterTiming,
    control: Arc<SimControl>,
) -> SimAdapter {
    LinkedAdapter::new(
        id,
        SIM_ADAPTER_TYPE,
        capabilities,
        timing,
        SimLink::new(control),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;
    use rcc_adapter::{AdapterError, RadioAdapter, RadioStatus};

    use super::*;

    fn timing() -> AdapterTiming {
        AdapterTiming {
            set_power_timeout: Duration::from_millis(50),
            set_channel_timeout: Duration::from_millis(50),
            ..AdapterTiming::default()
        }
    }

    #[tokio::test]
    async fn test_hung_command_recovers_through_refresh() {
        let control = SimControl::new();
        let radio = sim_adapter(RadioId::new("r1"), sim_capabilities(), timing(), control.clone());
        radio.connect().await.unwrap();

        control.set_hang(true);
        let err = radio.set_power(1.0).await.unwrap_err();
        assert!(matches!(err, AdapterError::Timeout { .. }));
        assert_eq!(radio.state().status, RadioStatus::Recovering);

        control.set_hang(false);
        radio.refresh_state().await.unwrap();
        assert_eq!(radio.state().status, RadioStatus::Ready);
    }

    #[tokio::test]
    async fn test_generic_rejection_is_busy() {
        let control = SimControl::new();
        let radio = sim_adapter(RadioId::new("r1"), sim_capabilities(), timing(), control.clone());
        radio.connect().await.unwrap();

        control.reject_next("TOO_MANY_REQUESTS");
        let err = radio.set_channel(1, 2412.0).await.unwrap_err();

        assert!(matches!(err, AdapterError::Busy(_)));
        assert_eq!(radio.state().status, RadioStatus::Ready);
        assert_eq!(control.applied().channel_index, None);
    }

    proptest! {
        #[test]
        fn prop_out_of_range_power_never_reaches_radio(watts in prop_oneof![-100.0f64..0.1, 5.0001f64..100.0]) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let control = SimControl::new();
            let radio = sim_adapter(RadioId::new("r1"), sim_capabilities(), timing(), control.clone());

            rt.block_on(async {
                radio.connect().await.unwrap();
                let err = radio.set_power(watts).await.unwrap_err();
                prop_assert!(matches!(err, AdapterError::InvalidRange(_)));
                prop_assert!(control.commands().is_empty());
                prop_assert_eq!(radio.state().power_watts, None);
                Ok(())
            })?;
        }
    }
}
