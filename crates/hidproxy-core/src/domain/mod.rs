//! Domain types shared by every layer of the proxy.
//!
//! - **`report`** – keyboard and mouse reports plus the records that carry
//!   them across the upstream and downstream queues.
//! - **`status`** – the closed set of interpreter states.
//! - **`keydef`** – macro definitions and their actions.

pub mod keydef;
pub mod report;
pub mod status;

pub use keydef::{Keydef, KeydefError, MacroAction, MAX_ACTIONS};
pub use report::{
    DownstreamRecord, InterfaceProtocol, KeyboardReport, MouseReport, SourceId, UpstreamPayload,
    UpstreamReport,
};
pub use status::DeviceStatus;
