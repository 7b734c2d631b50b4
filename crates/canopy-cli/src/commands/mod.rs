pub mod checkpoint;
pub mod dispatch;
pub mod license;
pub mod queue;
pub mod shared;
pub mod sync;
