//! Persistent key/value storage.
//!
//! - **`block_device`** – the flash abstraction with RAM and file backends.
//! - **`log`**          – the append-only log with two-area compaction.
//! - **`store`**        – plain/sealed value framing over the log.
//!
//! Only executor D touches the store.

pub mod block_device;
pub mod log;
pub mod store;

pub use block_device::{BlockDevice, DeviceError, FileDevice, RamDevice};
pub use log::{KvError, LogStats, LogStore, MAX_KEY_LEN, MAX_VALUE_LEN};
pub use store::{Fetched, KvStore};
