use std::cell::RefCell;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

/// Small buffers: tokens, attribute names, short scratch text.
pub const SBUF_SIZE: usize = 64;
/// Medium buffers: object names, messages.
pub const MBUF_SIZE: usize = 400;
/// Large buffers: every transient evaluation string rides in one of these.
pub const LBUF_SIZE: usize = 8000;
/// Giant buffers: flatfile records and other bulk staging.
pub const GBUF_SIZE: usize = 32768;

const CLASS_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufClass {
    Sbuf,
    Mbuf,
    Lbuf,
    Gbuf,
}

impl BufClass {
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            BufClass::Sbuf => SBUF_SIZE,
            BufClass::Mbuf => MBUF_SIZE,
            BufClass::Lbuf => LBUF_SIZE,
            BufClass::Gbuf => GBUF_SIZE,
        }
    }

    /// Usable payload size. The final byte of every frame is reserved so
    /// text built in a buffer always fits `size() - 1` bytes, matching the
    /// terminator convention of the wire side.
    #[inline]
    pub const fn usable(self) -> usize {
        self.size() - 1
    }

    #[inline]
    const fn index(self) -> usize {
        match self {
            BufClass::Sbuf => 0,
            BufClass::Mbuf => 1,
            BufClass::Lbuf => 2,
            BufClass::Gbuf => 3,
        }
    }

    const fn from_index(i: usize) -> BufClass {
        match i {
            0 => BufClass::Sbuf,
            1 => BufClass::Mbuf,
            2 => BufClass::Lbuf,
            _ => BufClass::Gbuf,
        }
    }
}

impl Display for BufClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BufClass::Sbuf => "SBUF",
            BufClass::Mbuf => "MBUF",
            BufClass::Lbuf => "LBUF",
            BufClass::Gbuf => "GBUF",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug)]
pub enum PoolError {
    /// The per-class cap was reached and no frame is on the free list.
    Exhausted(BufClass),
}

impl Display for PoolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::Exhausted(c) => write!(f, "buffer pool exhausted: {}", c),
        }
    }
}

impl std::error::Error for PoolError {}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClassStats {
    /// Frames currently handed out.
    pub live: usize,
    /// Frames parked on the free list.
    pub free: usize,
    /// High-water mark of `live`.
    pub peak: usize,
    /// Total alloc calls serviced.
    pub total_allocs: u64,
}

#[derive(Debug, Default)]
struct PoolInner {
    free: [Vec<Box<[u8]>>; CLASS_COUNT],
    stats: [ClassStats; CLASS_COUNT],
    caps: [usize; CLASS_COUNT],
}

/// Fixed-size buffer pool. Frames are recycled through per-class free
/// lists; a dropped [`Buf`] returns its frame in O(1). Cloning the pool
/// clones a handle to the same free lists.
#[derive(Debug, Clone, Default)]
pub struct Pool {
    inner: Rc<RefCell<PoolInner>>,
}

impl Pool {
    pub fn new() -> Self {
        Pool::default()
    }

    /// A pool whose classes refuse to grow past the given live-frame caps
    /// (0 = unbounded). Order: SBUF, MBUF, LBUF, GBUF.
    pub fn with_caps(caps: [usize; CLASS_COUNT]) -> Self {
        let pool = Pool::default();
        pool.inner.borrow_mut().caps = caps;
        pool
    }

    /// Hand out a frame of `class`, recycling from the free list when one
    /// is parked there. `tag` names the call site for diagnostics.
    pub fn alloc(&self, class: BufClass, tag: &'static str) -> Result<Buf, PoolError> {
        let frame = {
            let mut inner = self.inner.borrow_mut();
            let idx = class.index();
            let cap = inner.caps[idx];
            if cap != 0 && inner.stats[idx].live >= cap && inner.free[idx].is_empty() {
                return Err(PoolError::Exhausted(class));
            }
            let frame = match inner.free[idx].pop() {
                Some(f) => f,
                None => vec![0u8; class.size()].into_boxed_slice(),
            };
            let free_len = inner.free[idx].len();
            let st = &mut inner.stats[idx];
            st.live += 1;
            st.free = free_len;
            st.total_allocs += 1;
            if st.live > st.peak {
                st.peak = st.live;
            }
            frame
        };
        Ok(Buf {
            frame: Some(frame),
            len: 0,
            class,
            tag,
            overflowed: false,
            pool: self.clone(),
        })
    }

    pub fn stats(&self, class: BufClass) -> ClassStats {
        self.inner.borrow().stats[class.index()]
    }

    /// Audit the free lists against the counters. Returns one line per
    /// class; `ok` goes false if a parked frame has the wrong size or the
    /// free count disagrees with the list.
    pub fn pool_check(&self) -> Vec<PoolCheckLine> {
        let inner = self.inner.borrow();
        let mut report = Vec::with_capacity(CLASS_COUNT);
        for idx in 0..CLASS_COUNT {
            let class = BufClass::from_index(idx);
            let sized_ok = inner.free[idx].iter().all(|f| f.len() == class.size());
            let st = inner.stats[idx];
            report.push(PoolCheckLine {
                class,
                stats: st,
                ok: sized_ok && st.free == inner.free[idx].len(),
            });
        }
        report
    }

    fn release(&self, frame: Box<[u8]>, class: BufClass) {
        let mut inner = self.inner.borrow_mut();
        let idx = class.index();
        debug_assert_eq!(frame.len(), class.size());
        inner.free[idx].push(frame);
        let free_len = inner.free[idx].len();
        let st = &mut inner.stats[idx];
        st.live = st.live.saturating_sub(1);
        st.free = free_len;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolCheckLine {
    pub class: BufClass,
    pub stats: ClassStats,
    pub ok: bool,
}

/// A checked-out frame. Appends truncate at the class payload size and
/// record the overflow; the frame returns to its pool on drop.
#[derive(Debug)]
pub struct Buf {
    frame: Option<Box<[u8]>>,
    len: usize,
    class: BufClass,
    tag: &'static str,
    overflowed: bool,
    pool: Pool,
}

impl Buf {
    #[inline]
    pub fn class(&self) -> BufClass {
        self.class
    }

    #[inline]
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.class.usable()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.len
    }

    /// True once any append has been cut short.
    #[inline]
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.frame.as_ref().unwrap()[..self.len]
    }

    /// The buffer only ever receives UTF-8 and truncation trims partial
    /// sequences, so this cannot fail on content the pool APIs built.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.as_bytes()).unwrap_or("")
    }

    /// Append raw bytes, truncating at capacity on a codepoint boundary.
    /// Returns the number of bytes actually copied.
    pub fn append(&mut self, src: &[u8]) -> usize {
        let room = self.remaining();
        let n = if src.len() <= room {
            src.len()
        } else {
            self.overflowed = true;
            trim_partial_sequence(src, room)
        };
        let frame = self.frame.as_mut().unwrap();
        frame[self.len..self.len + n].copy_from_slice(&src[..n]);
        self.len += n;
        n
    }

    #[inline]
    pub fn append_str(&mut self, src: &str) -> usize {
        self.append(src.as_bytes())
    }

    pub fn push_ch(&mut self, ch: char) {
        let mut tmp = [0u8; 4];
        self.append(ch.encode_utf8(&mut tmp).as_bytes());
    }

    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            self.len = len;
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.overflowed = false;
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl Drop for Buf {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.pool.release(frame, self.class);
        }
    }
}

impl Display for Buf {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Largest prefix of `src[..limit]` that does not split a UTF-8 sequence.
pub fn trim_partial_sequence(src: &[u8], limit: usize) -> usize {
    if limit >= src.len() {
        return src.len();
    }
    let mut n = limit;
    while n > 0 && (src[n] & 0xC0) == 0x80 {
        n -= 1;
    }
    n
}
