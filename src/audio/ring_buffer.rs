//! Lock-free SPSC ring between the cpal callback and the listener.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// About 10 s of 16 kHz mono audio.
const DEFAULT_CAPACITY: usize = 160_000;

/// Writer half, owned by the cpal callback.
pub struct SampleWriter {
    inner: ringbuf::HeapProd<f32>,
}

/// Reader half, owned by the microphone.
pub struct SampleReader {
    inner: ringbuf::HeapCons<f32>,
}

pub fn sample_ring(capacity: Option<usize>) -> (SampleWriter, SampleReader) {
    let rb = HeapRb::<f32>::new(capacity.unwrap_or(DEFAULT_CAPACITY));
    let (prod, cons) = rb.split();
    (SampleWriter { inner: prod }, SampleReader { inner: cons })
}

impl SampleWriter {
    /// Returns the number of samples written; short when the ring is full.
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        self.inner.push_slice(samples)
    }
}

// The producer is only touched from the cpal callback thread.
unsafe impl Send for SampleWriter {}

impl SampleReader {
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Pop exactly `len` samples, or nothing if fewer are buffered.
    pub fn pop_chunk(&mut self, len: usize) -> Option<Vec<f32>> {
        if len == 0 || self.available() < len {
            return None;
        }
        let mut chunk = vec![0.0f32; len];
        let read = self.inner.pop_slice(&mut chunk);
        chunk.truncate(read);
        Some(chunk)
    }

    pub fn drain_all(&mut self) -> Vec<f32> {
        let mut buf = vec![0.0f32; self.available()];
        let read = self.inner.pop_slice(&mut buf);
        buf.truncate(read);
        buf
    }

    /// Discard everything buffered so far.
    pub fn clear(&mut self) -> usize {
        self.drain_all().len()
    }
}

unsafe impl Send for SampleReader {}
