pub mod frame_buffer;
pub mod output_buffer;
pub mod ringbuf;
pub mod worker;

pub use frame_buffer::FrameBuffer;
pub use output_buffer::OutputBuffer;
pub use ringbuf::{FrameRing, RingStats};
pub use worker::{TickOutcome, VisionWorker, WorkerHandle, WorkerSettings, WorkerStats};
