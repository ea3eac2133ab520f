pub mod queue;
pub mod status;
pub mod strake;
pub mod sync;
