//! Application layer: the two executors and the logic they run.
//!
//! # What lives here? (for beginners)
//!
//! The proxy is split across two cooperating loops that share nothing but
//! the lock-free queues in `infrastructure::queues`:
//!
//! - **Executor U** ([`upstream`]) talks to the physical keyboard.  It stamps
//!   every report with a sequence number and queues it.  It never sees a
//!   password or touches flash.
//! - **Executor D** ([`pipeline`]) talks to the host computer.  It owns the
//!   state machine, the macro store and every secret.
//!
//! The remaining modules are pieces executor D is built from:
//!
//! - **`state_machine`** – the pure command interpreter: `(status, report)`
//!   in, next status plus a list of effects out.  No I/O.
//! - **`macro_store`** / **`settings`** – typed access to the key/value
//!   store, sealing private values with the derived key.
//! - **`emitter`** – keeps at most one report in flight to the host.
//! - **`watchdog`** – seals the device after a period of inactivity.
//! - **`leds`** – merges the host's LED state with the status indicator.
//! - **`diagnostics`** – sequence counters, report histories and the dump.

pub mod diagnostics;
pub mod emitter;
pub mod leds;
pub mod macro_store;
pub mod pipeline;
pub mod settings;
pub mod state_machine;
pub mod upstream;
pub mod watchdog;
