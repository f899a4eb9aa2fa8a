//! Lock-free SPSC ring buffer for interleaved PCM bytes.
//!
//! Uses `ringbuf::HeapRb<u8>` whose `push_slice` is wait-free, so the
//! caller's capture path never contends with the worker draining frames.

pub mod frame;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Type alias for the producer half — held by the façade behind its write lock.
pub type FrameProducer = ringbuf::HeapProd<u8>;

/// Type alias for the consumer half — held by the worker thread.
pub type FrameConsumer = ringbuf::HeapCons<u8>;

/// Buffer capacity: three whole frames. One frame in flight plus at most two
/// frames of backlog before writes are refused.
pub const RING_CAPACITY: usize = 3 * frame::FRAME_BYTES;

/// Create a matched producer/consumer pair backed by a heap-allocated ring.
pub fn create_frame_ring() -> (FrameProducer, FrameConsumer) {
    HeapRb::<u8>::new(RING_CAPACITY).split()
}
