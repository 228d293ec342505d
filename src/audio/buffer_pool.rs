// BufferPool - lock-free buffer pool with dual SPSC queues
//
// Two rtrb ring buffers carry pre-allocated sample buffers between the
// real-time capture callback and the analysis thread, so the callback never
// allocates.
//
// Buffer flow:
// 1. Capture thread pops an empty buffer from POOL_QUEUE
// 2. Capture thread copies the callback's samples into it (channel 0 only)
// 3. Capture thread pushes the filled buffer to DATA_QUEUE
// 4. Analysis thread pops the filled buffer from DATA_QUEUE, in arrival order
// 5. Analysis thread pushes the emptied buffer back to POOL_QUEUE

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer};

/// Configuration constants for buffer pool
pub const DEFAULT_BUFFER_COUNT: usize = 16;
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

/// Audio buffer type - pre-allocated vector of f32 samples
pub type AudioBuffer = Vec<f32>;

/// Both ends of both queues, before they are handed to their threads
pub struct BufferPoolChannels {
    /// Producer for sending filled audio buffers to analysis thread
    pub data_producer: Producer<AudioBuffer>,
    /// Consumer for receiving filled audio buffers in analysis thread
    pub data_consumer: Consumer<AudioBuffer>,
    /// Producer for returning empty buffers from analysis thread
    pub pool_producer: Producer<AudioBuffer>,
    /// Consumer for retrieving empty buffers in audio thread
    pub pool_consumer: Consumer<AudioBuffer>,
    dropped: Arc<AtomicU64>,
}

/// Real-time side: owned by the platform callback
pub struct CaptureThreadChannels {
    data_producer: Producer<AudioBuffer>,
    pool_consumer: Consumer<AudioBuffer>,
    dropped: Arc<AtomicU64>,
}

/// Analysis side: owned by the analysis worker
pub struct AnalysisThreadChannels {
    data_consumer: Consumer<AudioBuffer>,
    pool_producer: Producer<AudioBuffer>,
    dropped: Arc<AtomicU64>,
}

/// Lock-free buffer pool using dual SPSC ring buffers
///
/// Pre-allocates a fixed number of audio buffers and manages them through
/// two lock-free queues. All heap allocation happens here.
///
/// # Example
/// ```ignore
/// let (mut capture, mut analysis) = BufferPool::new(16, 2048).split_for_threads();
///
/// // In the capture callback:
/// capture.push_interleaved(data, channel_count);
///
/// // In the analysis thread:
/// if let Some(buffer) = analysis.pop() {
///     // Process buffer
///     analysis.recycle(buffer);
/// }
/// ```
pub struct BufferPool;

impl BufferPool {
    /// Create a new BufferPool with specified buffer count and size
    ///
    /// # Panics
    /// Panics if buffer_count is 0 or buffer_size is 0
    #[allow(clippy::new_ret_no_self)]
    pub fn new(buffer_count: usize, buffer_size: usize) -> BufferPoolChannels {
        assert!(buffer_count > 0, "buffer_count must be greater than 0");
        assert!(buffer_size > 0, "buffer_size must be greater than 0");

        let (mut pool_producer, pool_consumer) = rtrb::RingBuffer::new(buffer_count);
        let (data_producer, data_consumer) = rtrb::RingBuffer::new(buffer_count);

        // Both rings have room for every buffer, so these pushes cannot fail
        for _ in 0..buffer_count {
            let _ = pool_producer.push(Vec::with_capacity(buffer_size));
        }

        BufferPoolChannels {
            data_producer,
            data_consumer,
            pool_producer,
            pool_consumer,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl BufferPoolChannels {
    /// Hand each thread only the queue ends it is allowed to touch
    pub fn split_for_threads(self) -> (CaptureThreadChannels, AnalysisThreadChannels) {
        (
            CaptureThreadChannels {
                data_producer: self.data_producer,
                pool_consumer: self.pool_consumer,
                dropped: Arc::clone(&self.dropped),
            },
            AnalysisThreadChannels {
                data_consumer: self.data_consumer,
                pool_producer: self.pool_producer,
                dropped: self.dropped,
            },
        )
    }
}

impl CaptureThreadChannels {
    /// Copy channel 0 of an interleaved callback block into a pooled buffer.
    ///
    /// Returns false when the pool is exhausted; the block is dropped and
    /// counted rather than blocking the callback.
    pub fn push_interleaved(&mut self, data: &[f32], channel_count: usize) -> bool {
        let mut buffer = match self.pool_consumer.pop() {
            Ok(buffer) => buffer,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        buffer.clear();
        if channel_count <= 1 {
            let room = buffer.capacity().min(data.len());
            buffer.extend_from_slice(&data[..room]);
        } else {
            let room = buffer.capacity();
            buffer.extend(data.chunks(channel_count).take(room).map(|frame| frame[0]));
        }

        match self.data_producer.push(buffer) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// True when a buffer is available for the next block
    pub fn has_free_buffer(&self) -> bool {
        !self.pool_consumer.is_empty()
    }
}

impl AnalysisThreadChannels {
    /// Next filled buffer in arrival order
    pub fn pop(&mut self) -> Option<AudioBuffer> {
        self.data_consumer.pop().ok()
    }

    /// Return an emptied buffer to the capture side
    pub fn recycle(&mut self, mut buffer: AudioBuffer) {
        buffer.clear();
        let _ = self.pool_producer.push(buffer);
    }

    /// Blocks dropped by the capture side because the pool was exhausted
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
