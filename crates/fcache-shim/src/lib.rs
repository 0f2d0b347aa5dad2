//! A fault-injection proxy engine.
//!
//! The shim sits between the server front-end and a real storage engine
//! and deterministically injects transient errors — above all would-block,
//! the signal that a request must be suspended until the engine notifies
//! the host it may be retried. Engines return would-block rarely and
//! unpredictably; wrapping one in this shim makes those paths testable on
//! demand.
//!
//! A connection programs its own failures through a control opcode: fail
//! the next N operations, fail the first of each kind, fail at random,
//! follow a bit mask, fail once and never notify, or fail CAS stores
//! specifically. Beyond injector policies, a cookie can be suspended under
//! a named token and resumed later (by hand, or when a watched file
//! disappears), and a synthetic change stream serves canned mutations for
//! streaming tests without involving the wrapped engine.
//!
//! Everything the shim does not inject or intercept is forwarded to the
//! wrapped engine unchanged.

pub mod config;
mod control;
mod dcp;
pub mod engine;
pub mod injector;
pub mod monitor;
pub mod notify;
pub mod registry;
pub mod suspend;

pub use config::{split_config_str, ShimConfig, SplitConfig};
pub use engine::ShimEngine;
pub use injector::FaultInjector;
pub use monitor::MonitorSet;
pub use notify::{NotifyPump, NotifyQueue};
pub use registry::{Decision, InjectorRegistry};
pub use suspend::SuspensionMap;
