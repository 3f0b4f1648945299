//! Scale/region strategies dispatched over `ProcessingMethod`.

pub mod pyramid;
pub mod region;
pub mod single_scale;
