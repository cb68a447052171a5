//! Multi-block sample ring used along every edge of a DSP path.
//!
//! An [`AudioBuffer`] stores `num_blocks` blocks of `block_size` samples. Writers
//! fill the current write block, then call [`next_block`](AudioBuffer::next_block),
//! after which the block just written becomes the read block. Readers therefore
//! always see the most recently completed block, and older blocks stay
//! available as history until they are overwritten.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

/// Fixed-size ring of sample blocks with read and write cursors.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    block_size: usize,
    num_blocks: usize,
    write_block: usize,
    read_block: usize,
}

impl AudioBuffer {
    /// Creates a zeroed buffer. `num_blocks` is clamped to at least 1.
    pub fn new(block_size: usize, num_blocks: usize) -> Self {
        let num_blocks = num_blocks.max(1);
        Self {
            samples: vec![0.0; block_size * num_blocks],
            block_size,
            num_blocks,
            write_block: 0,
            read_block: num_blocks - 1,
        }
    }

    /// Re-sizes the buffer, zeroing its contents and rewinding the cursors.
    pub fn resize(&mut self, block_size: usize, num_blocks: usize) {
        *self = Self::new(block_size, num_blocks);
    }

    /// Samples per block.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks in the ring.
    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// Index of the block currently being written.
    #[inline]
    pub fn write_index(&self) -> usize {
        self.write_block
    }

    /// Index of the last completed block.
    #[inline]
    pub fn read_index(&self) -> usize {
        self.read_block
    }

    /// The last completed block.
    #[inline]
    pub fn read(&self) -> &[f32] {
        let start = self.read_block * self.block_size;
        &self.samples[start..start + self.block_size]
    }

    /// The block currently being written.
    #[inline]
    pub fn write(&mut self) -> &mut [f32] {
        let start = self.write_block * self.block_size;
        &mut self.samples[start..start + self.block_size]
    }

    /// Copies `block` into the write block. Extra samples on either side are
    /// ignored.
    pub fn write_from(&mut self, block: &[f32]) {
        let dst = self.write();
        let n = dst.len().min(block.len());
        dst[..n].copy_from_slice(&block[..n]);
    }

    /// Copies one channel out of an interleaved frame buffer into the write
    /// block: sample `i` comes from `src[offset + i * stride]`.
    pub fn write_strided(&mut self, src: &[f32], offset: usize, stride: usize) {
        let stride = stride.max(1);
        for (i, dst) in self.write().iter_mut().enumerate() {
            *dst = src.get(offset + i * stride).copied().unwrap_or(0.0);
        }
    }

    /// Copies `block * amp` into the write block.
    pub fn write_scaled(&mut self, block: &[f32], amp: f32) {
        for (dst, &src) in self.write().iter_mut().zip(block) {
            *dst = src * amp;
        }
    }

    /// Writes one block of silence.
    pub fn write_null(&mut self) {
        self.write().fill(0.0);
    }

    /// Adds `block` on top of the write block (mixing).
    pub fn write_add(&mut self, block: &[f32]) {
        for (dst, &src) in self.write().iter_mut().zip(block) {
            *dst += src;
        }
    }

    /// Multiplies the write block by `amp`.
    pub fn multiply(&mut self, amp: f32) {
        for s in self.write() {
            *s *= amp;
        }
    }

    /// Copies the read block into one channel of an interleaved frame buffer:
    /// sample `i` goes to `dst[offset + i * stride]`.
    pub fn read_strided(&self, dst: &mut [f32], offset: usize, stride: usize) {
        let stride = stride.max(1);
        for (i, &s) in self.read().iter().enumerate() {
            if let Some(slot) = dst.get_mut(offset + i * stride) {
                *slot = s;
            }
        }
    }

    /// Completes the write block: it becomes the read block and the write
    /// cursor moves on.
    #[inline]
    pub fn next_block(&mut self) {
        self.write_block = (self.write_block + 1) % self.num_blocks;
        self.read_block = (self.read_block + 1) % self.num_blocks;
    }

    /// Moves both cursors back by one block.
    #[inline]
    pub fn previous_block(&mut self) {
        self.write_block = self
            .write_block
            .checked_sub(1)
            .unwrap_or(self.num_blocks - 1);
        self.read_block = self
            .read_block
            .checked_sub(1)
            .unwrap_or(self.num_blocks - 1);
    }

    /// Reads the sample `samples_ago` samples before the last written one.
    ///
    /// `0` is the newest sample. Requests past the stored history return the
    /// oldest stored sample.
    pub fn read_history(&self, samples_ago: usize) -> f32 {
        let total = self.samples.len();
        if total == 0 {
            return 0.0;
        }
        let back = samples_ago.min(total - 1);
        let newest = self.read_block * self.block_size + self.block_size - 1;
        self.samples[(newest + total - back) % total]
    }

    /// Fills `dst` with the most recent `dst.len()` samples, oldest first.
    pub fn copy_history(&self, dst: &mut [f32]) {
        let n = dst.len();
        for (k, slot) in dst.iter_mut().enumerate() {
            *slot = self.read_history(n - 1 - k);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_sees_last_written_block() {
        let mut buf = AudioBuffer::new(4, 3);
        buf.write_from(&[1.0, 2.0, 3.0, 4.0]);
        buf.next_block();
        assert_eq!(buf.read(), &[1.0, 2.0, 3.0, 4.0]);
        buf.write_from(&[5.0; 4]);
        buf.next_block();
        assert_eq!(buf.read(), &[5.0; 4]);
    }

    #[test]
    fn test_single_block_reads_in_place() {
        let mut buf = AudioBuffer::new(2, 1);
        assert_eq!(buf.read_index(), buf.write_index());
        buf.write_from(&[0.5, -0.5]);
        buf.next_block();
        assert_eq!(buf.read(), &[0.5, -0.5]);
    }

    #[test]
    fn test_zero_blocks_clamped() {
        let buf = AudioBuffer::new(8, 0);
        assert_eq!(buf.num_blocks(), 1);
        assert_eq!(buf.read().len(), 8);
    }

    #[test]
    fn test_mix_and_null() {
        let mut buf = AudioBuffer::new(3, 1);
        buf.write_null();
        buf.write_add(&[0.3, 0.3, 0.3]);
        buf.write_add(&[0.2, 0.2, 0.2]);
        buf.next_block();
        for &s in buf.read() {
            assert!((s - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_scaled_and_multiply() {
        let mut buf = AudioBuffer::new(2, 1);
        buf.write_scaled(&[1.0, -2.0], 0.5);
        buf.multiply(2.0);
        buf.next_block();
        assert_eq!(buf.read(), &[1.0, -2.0]);
    }

    #[test]
    fn test_strided_round_trip() {
        let interleaved = [1.0, 10.0, 2.0, 20.0, 3.0, 30.0];
        let mut right = AudioBuffer::new(3, 1);
        right.write_strided(&interleaved, 1, 2);
        right.next_block();
        assert_eq!(right.read(), &[10.0, 20.0, 30.0]);

        let mut out = [0.0; 6];
        right.read_strided(&mut out, 0, 2);
        assert_eq!(out, [10.0, 0.0, 20.0, 0.0, 30.0, 0.0]);
    }

    #[test]
    fn test_history() {
        let mut buf = AudioBuffer::new(2, 2);
        buf.write_from(&[1.0, 2.0]);
        buf.next_block();
        buf.write_from(&[3.0, 4.0]);
        buf.next_block();
        assert_eq!(buf.read_history(0), 4.0);
        assert_eq!(buf.read_history(1), 3.0);
        assert_eq!(buf.read_history(3), 1.0);
        // past the stored history the oldest sample repeats
        assert_eq!(buf.read_history(100), 1.0);

        let mut last = [0.0; 3];
        buf.copy_history(&mut last);
        assert_eq!(last, [2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_previous_block_undoes_next_block() {
        let mut buf = AudioBuffer::new(2, 3);
        let (w, r) = (buf.write_index(), buf.read_index());
        buf.next_block();
        buf.previous_block();
        assert_eq!((buf.write_index(), buf.read_index()), (w, r));
        buf.previous_block();
        assert_eq!(buf.write_index(), 2);
    }
}
