//! Cross-platform verification (§4.9, §4.10): a pure planner deciding
//! which of a run's tasks to re-execute on remote, platform-distinct nodes,
//! and a coordinator that actually ships them there and merges the results
//! back.
//!
//! The planner (`plan`) has no side effects and is the piece of this
//! workspace most amenable to property testing (spec Design Notes "Pure
//! planner"); the coordinator is where the networking, retry, and
//! partial-failure handling lives, kept entirely separate so the decision
//! logic stays trivial to test in isolation.

mod coordinator;
mod error;
mod planner;
mod protocol;

pub use coordinator::{merge, run_plan, Dialer, TcpDialer};
pub use error::{Result, VerifyError};
pub use planner::{partitions_cleanly, plan};
pub use protocol::{read_frame, write_frame, VerifyArtifact, VerifyRequest, VerifyResponse};
