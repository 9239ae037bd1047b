mod executor;
mod handle;
mod job;
mod params;
mod registry;
mod service;

pub use executor::{BackgroundExecutor, Submitted};
pub use handle::{Handle, Tracked};
pub use job::{Job, JobHandle, JobId, JobStatus};
pub use params::{ParamValue, Parameters};
pub use registry::{InMemoryStore, JobRegistry, JobStore};
pub use service::{JobProcessor, JobService};
