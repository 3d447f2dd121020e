//! Rolling capture of rendered frames.
//!
//! The host pushes a copy of the pixel buffer every `interval` frames into a
//! fixed ring. When full, the oldest frame is overwritten. Captured frames
//! can be dumped as PNG files by the frontend.

/// One captured pixel buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
    /// RGBA8888 pixels, row-major
    pub pixels: Vec<u32>,
    /// Tick number when this frame was captured
    pub tick: u64,
}

/// Ring buffer of captured frames.
pub struct FrameCapture {
    buf: Vec<Option<Frame>>,
    /// Next slot to overwrite
    write_pos: usize,
    count: usize,
    /// Frames between captures
    pub interval: u32,
    frame_counter: u32,
}

impl FrameCapture {
    /// Create a ring holding up to `capacity` frames, capturing one every
    /// `interval` frames. Both are clamped to at least 1.
    pub fn new(capacity: usize, interval: u32) -> Self {
        FrameCapture {
            buf: vec![None; capacity.max(1)],
            write_pos: 0,
            count: 0,
            interval: interval.max(1),
            frame_counter: 0,
        }
    }

    /// Notify that a frame was rendered. Returns true if one should be captured.
    pub fn tick_frame(&mut self) -> bool {
        self.frame_counter += 1;
        if self.frame_counter >= self.interval {
            self.frame_counter = 0;
            true
        } else {
            false
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.buf[self.write_pos] = Some(frame);
        self.write_pos = (self.write_pos + 1) % self.buf.len();
        if self.count < self.buf.len() {
            self.count += 1;
        }
    }

    /// Stored frames, oldest first.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> + '_ {
        let cap = self.buf.len();
        let start = (self.write_pos + cap - self.count) % cap;
        (0..self.count).filter_map(move |i| self.buf[(start + i) % cap].as_ref())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn clear(&mut self) {
        self.buf.iter_mut().for_each(|slot| *slot = None);
        self.count = 0;
        self.write_pos = 0;
        self.frame_counter = 0;
    }
}
