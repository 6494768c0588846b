// Jobs: typed intents passed between decision, actuation and vision modules,
// queued in a JobList and serialized for the job network port.

pub mod codec;
pub mod job;
pub mod job_list;

pub use codec::{decode_jobs, encode_jobs};
pub use job::{BehaviourJob, Job, JobKind, MotionJob, VisionJob};
pub use job_list::{JobList, JobSummary};
