//! Secret-redaction registry used by the scheduler and CLI logging layer.

pub mod redaction;
