#[macro_use]
extern crate log;

mod cli;
pub mod config;
pub mod device;
pub mod sim;
pub mod trace;

pub use crate::cli::*;
pub use crate::config::{BusProtocol, SsdConfig};
pub use crate::device::completion::{Completion, IoStatus, RequestId};
pub use crate::device::{DiskParams, RamSsd};
pub use crate::sim::{Address, EventKind, Level, SimError, Ssd};
pub use crate::trace::{replay, TraceStats};
