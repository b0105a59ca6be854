//! vigil-filters library interface
//!
//! Detection backends behind the generator/task contract, plus the connection
//! loop and monitoring router used by the `vigil-filter` binary.

pub mod error;
pub mod generator;
pub mod hostlookup;
pub mod lifecycle;
pub mod monitor;
pub mod server;
pub mod sofa;
pub mod task;
pub mod useragent;

pub use crate::error::{FilterError, FilterResult};
pub use crate::generator::{FilterKind, Generator};
pub use crate::task::{Evaluator, Task};
