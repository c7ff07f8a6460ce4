pub mod engine;
pub mod error;
pub mod progress;
pub mod registry;
pub mod task;
mod worker;

#[cfg(test)]
mod test_server;

pub use engine::DownloadEngine;
pub use error::{DownloadError, DownloadResult};
pub use progress::SpeedSampler;
pub use registry::TaskRegistry;
pub use task::{TaskSnapshot, TaskStatus};
