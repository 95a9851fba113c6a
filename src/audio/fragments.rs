//! Ordered buffer of captured audio fragments
//!
//! Fragments are kept in arrival order and assembled into a single blob when
//! the capture finalizes. Unlike a ring buffer nothing is ever evicted: the
//! assembled recording must contain every fragment.

/// Ordered sequence of fragments for one capture. Each fragment is an
/// opaque chunk of encoded audio as delivered by the capture backend.
///
/// Thread-safety: This struct is NOT internally synchronized.
/// Wrap in `Arc<Mutex<>>` if shared across threads.
#[derive(Debug, Default)]
pub struct FragmentBuffer {
    fragments: Vec<Vec<u8>>,
    next_sequence: u64,
}

impl FragmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Returns the sequence number assigned to it.
    pub fn push(&mut self, bytes: Vec<u8>) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.fragments.push(bytes);
        sequence
    }

    /// Concatenate all fragments in arrival order.
    ///
    /// The buffer is left untouched.
    pub fn assemble(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for fragment in &self.fragments {
            out.extend_from_slice(fragment);
        }
        out
    }

    /// Number of fragments currently buffered
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Total size of buffered audio in bytes
    pub fn byte_len(&self) -> usize {
        self.fragments.iter().map(Vec::len).sum()
    }

    /// Drop every buffered fragment. Sequence numbering continues.
    pub fn clear(&mut self) {
        self.fragments.clear();
    }
}
