use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::warn;

/// SPSC sample ring between the capture source and the pipeline task,
/// built on rtrb (real-time safe). The producer half is the external
/// `push` surface; it never blocks and never grows the buffer.
pub struct AudioRingBuffer {
    producer: Producer<i16>,
    consumer: Consumer<i16>,
}

impl AudioRingBuffer {
    /// Capacity in samples (interleaved when the source is stereo).
    pub fn new(capacity: usize) -> Self {
        let (producer, consumer) = RingBuffer::new(capacity);
        Self { producer, consumer }
    }

    pub fn split(self) -> (AudioProducer, AudioConsumer) {
        let overflow = Arc::new(AtomicU64::new(0));
        (
            AudioProducer {
                producer: self.producer,
                overflow_samples: Arc::clone(&overflow),
            },
            AudioConsumer {
                consumer: self.consumer,
                overflow_samples: overflow,
            },
        )
    }
}

/// Producer half, owned by the capture/source thread.
pub struct AudioProducer {
    producer: Producer<i16>,
    overflow_samples: Arc<AtomicU64>,
}

impl AudioProducer {
    /// Append samples, writing as many as fit. Samples that do not fit are
    /// discarded and counted; bounded latency wins over completeness.
    /// Returns the number of samples written.
    pub fn push(&mut self, samples: &[i16]) -> usize {
        let writable = samples.len().min(self.producer.slots());
        if writable < samples.len() {
            let dropped = (samples.len() - writable) as u64;
            self.overflow_samples.fetch_add(dropped, Ordering::Relaxed);
            warn!(
                "Sample ring full: discarded {} of {} pushed samples",
                dropped,
                samples.len()
            );
        }
        if writable == 0 {
            return 0;
        }

        let mut chunk = self
            .producer
            .write_chunk(writable)
            .expect("slots() reported space");

        // Write may wrap; fill both slices
        let (first, second) = chunk.as_mut_slices();
        let split = first.len();
        first.copy_from_slice(&samples[..split]);
        if !second.is_empty() {
            second.copy_from_slice(&samples[split..split + second.len()]);
        }
        chunk.commit_all();
        writable
    }

    /// Available space, in samples.
    pub fn slots(&self) -> usize {
        self.producer.slots()
    }
}

/// Consumer half, owned by the pipeline task.
pub struct AudioConsumer {
    consumer: Consumer<i16>,
    overflow_samples: Arc<AtomicU64>,
}

impl AudioConsumer {
    /// Read up to `buffer.len()` samples without blocking. Returns the
    /// number of samples read.
    pub fn read(&mut self, buffer: &mut [i16]) -> usize {
        let chunk = match self.consumer.read_chunk(buffer.len()) {
            Ok(chunk) => chunk,
            Err(rtrb::chunks::ChunkError::TooFewSlots(available)) => {
                if available == 0 {
                    return 0;
                }
                self.consumer.read_chunk(available).unwrap()
            }
        };

        let len = chunk.len();
        let (first, second) = chunk.as_slices();
        let split = first.len();
        buffer[..split].copy_from_slice(first);
        if !second.is_empty() {
            buffer[split..split + second.len()].copy_from_slice(second);
        }
        chunk.commit_all();
        len
    }

    pub fn slots(&self) -> usize {
        self.consumer.slots()
    }

    /// Drain and reset the count of samples the producer had to discard
    /// since the last call.
    pub fn take_overflow_samples(&self) -> u64 {
        self.overflow_samples.swap(0, Ordering::Relaxed)
    }
}
