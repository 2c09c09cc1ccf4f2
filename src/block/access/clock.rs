/// Index of a frame in a [`ClockReplacer`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(super) struct FrameId(usize);

impl FrameId {
    #[inline]
    pub(super) fn from_usize(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub(super) fn as_usize(self) -> usize {
        self.0
    }
}

/// Second-chance ("clock") victim selection over a fixed number of frames.
///
/// Every frame carries a reference bit, set whenever the frame is used. The clock hand sweeps the
/// frames in order: a frame with the bit set gets a second chance (the bit is cleared and the hand
/// moves on), the first frame found with the bit clear is the victim.
#[derive(Debug)]
pub(super) struct ClockReplacer {
    ref_bits: Vec<bool>,
    hand: usize,
}

impl ClockReplacer {
    pub(super) fn new(num_frames: usize) -> Self {
        Self { ref_bits: vec![false; num_frames], hand: 0 }
    }

    #[inline]
    pub(super) fn touch(&mut self, frame_id: FrameId) {
        if let Some(bit) = self.ref_bits.get_mut(frame_id.as_usize()) {
            *bit = true;
        }
    }

    /// Forgets any use of `frame_id`, making it the preferred victim.
    #[inline]
    pub(super) fn reset(&mut self, frame_id: FrameId) {
        if let Some(bit) = self.ref_bits.get_mut(frame_id.as_usize()) {
            *bit = false;
        }
    }

    /// Picks the next frame to evict. The victim is marked as referenced, since the caller is
    /// about to reuse it.
    pub(super) fn victim(&mut self) -> Option<FrameId> {
        let num_frames = self.ref_bits.len();
        // Two sweeps are enough: the first one clears every reference bit.
        for _ in 0..(num_frames * 2) {
            let current = self.hand;
            self.hand = (self.hand + 1) % num_frames;

            let bit = &mut self.ref_bits[current];
            if *bit {
                *bit = false;
                continue;
            }
            *bit = true;
            return Some(FrameId::from_usize(current));
        }
        None
    }
}
