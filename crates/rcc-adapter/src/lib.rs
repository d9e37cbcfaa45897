//! Radio Adapter Library
//!
//! This crate defines how the control container talks to a radio:
//!
//! - **RadioAdapter**: the capability contract every vendor driver implements
//! - **RadioStatus**: the lifecycle state machine (`Discovering`, `Ready`,
//!   `Busy`, `Recovering`, `Offline`)
//! - **Result codes**: the normalized outcome vocabulary shared with clients
//! - **Vendor tables**: mapping of vendor rejection tokens onto result codes
//!
//! # Architecture
//!
//! A driver is split in two halves. A [`RadioLink`] does the vendor I/O and
//! nothing else. [`LinkedAdapter`] wraps any link and owns everything that is
//! common across vendors: capability validation, status transitions,
//! timeout classes and error normalization.
//!
//! # Example
//!
//! ```rust,no_run
//! use rcc_adapter::{silvus_adapter, silvus_capabilities, AdapterTiming, RadioAdapter, RadioId};
//!
//! # async fn demo() {
//! let radio = silvus_adapter(
//!     RadioId::new("silvus-01"),
//!     "10.0.0.21:50000",
//!     silvus_capabilities(),
//!     AdapterTiming::default(),
//! );
//!
//! if radio.connect().await.is_ok() {
//!     let _ = radio.set_power(2.0).await;
//! }
//! # }
//! ```

pub mod adapter;
pub mod driver;
pub mod error;
pub mod link;
pub mod silvus;
pub mod status;
pub mod types;
pub mod vendor;

pub use adapter::{AdapterTiming, RadioAdapter};
pub use driver::LinkedAdapter;
pub use error::{AdapterError, AdapterResult, LinkError};
pub use link::RadioLink;
pub use silvus::{silvus_adapter, silvus_capabilities, SilvusAdapter, TcpLink, SILVUS_ADAPTER_TYPE};
pub use status::{InvalidTransition, LinkEvent, RadioStatus, StateCell};
pub use types::{CapabilityInfo, CommandResult, PowerRange, RadioId, RadioState, ResultCode};
pub use vendor::{classify, normalize_rejection, vendor_table, VendorTable};
