//! Deferred-command queue: a time-ordered heap, per-semaphore wait
//! lists, and the immediate FIFO the tick loop drains.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use fnv::FnvHashMap;
use tracing::debug;

use common::config::LimitsConfig;
use world::attr::AttrNum;
use world::Dbref;

use crate::game::{Ctx, Regs};

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub seq: u64,
    /// Absolute ready time, epoch seconds. Immediate entries carry the
    /// enqueue time.
    pub ready: i64,
    pub ctx: Ctx,
    /// Whose queue quota this entry occupies.
    pub owner: Dbref,
    pub text: String,
    pub args: Vec<String>,
    pub regs: Regs,
    pub sem: Option<(Dbref, AttrNum)>,
    /// Re-entrancy depth: one more than the entry that enqueued it.
    pub depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// Per-owner quota or re-entrancy depth exceeded.
    Overflow,
}

struct HeapItem(QueueEntry);

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.0.ready == other.0.ready && self.0.seq == other.0.seq
    }
}
impl Eq for HeapItem {}
impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapItem {
    // BinaryHeap is a max-heap; invert for earliest-first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.0.ready, other.0.seq).cmp(&(self.0.ready, self.0.seq))
    }
}

impl std::fmt::Debug for HeapItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug)]
pub struct CommandQueue {
    heap: BinaryHeap<HeapItem>,
    sem_waits: FnvHashMap<(Dbref, AttrNum), VecDeque<QueueEntry>>,
    fifo: VecDeque<QueueEntry>,
    next_seq: u64,
    counts: FnvHashMap<Dbref, usize>,
    queue_max: usize,
    queue_max_depth: u32,
    chunk: usize,
    /// Depth of the entry currently executing; 0 between entries.
    pub cur_depth: u32,
}

impl CommandQueue {
    pub fn new(limits: &LimitsConfig) -> Self {
        CommandQueue {
            heap: BinaryHeap::new(),
            sem_waits: FnvHashMap::default(),
            fifo: VecDeque::new(),
            next_seq: 0,
            counts: FnvHashMap::default(),
            queue_max: limits.queue_max,
            queue_max_depth: limits.queue_max_depth,
            chunk: limits.queue_chunk,
            cur_depth: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len() + self.fifo.len() + self.sem_waits.values().map(|v| v.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn chunk(&self) -> usize {
        self.chunk
    }

    fn admit(&mut self, owner: Dbref) -> Result<(), QueueError> {
        if self.cur_depth + 1 > self.queue_max_depth {
            return Err(QueueError::Overflow);
        }
        let count = self.counts.entry(owner).or_insert(0);
        if *count >= self.queue_max {
            return Err(QueueError::Overflow);
        }
        *count += 1;
        Ok(())
    }

    fn retire(&mut self, owner: Dbref) {
        if let Some(c) = self.counts.get_mut(&owner) {
            *c = c.saturating_sub(1);
            if *c == 0 {
                self.counts.remove(&owner);
            }
        }
    }

    fn build(
        &mut self,
        ready: i64,
        ctx: Ctx,
        owner: Dbref,
        text: String,
        args: Vec<String>,
        regs: Regs,
        sem: Option<(Dbref, AttrNum)>,
    ) -> QueueEntry {
        let seq = self.next_seq;
        self.next_seq += 1;
        QueueEntry {
            seq,
            ready,
            ctx,
            owner,
            text,
            args,
            regs,
            sem,
            depth: self.cur_depth + 1,
        }
    }

    /// Time-triggered entry. `ready <= now` lands on the immediate FIFO.
    pub fn enqueue_wait(
        &mut self,
        now: i64,
        ready: i64,
        ctx: Ctx,
        owner: Dbref,
        text: String,
        args: Vec<String>,
        regs: Regs,
    ) -> Result<u64, QueueError> {
        self.admit(owner)?;
        let entry = self.build(ready.max(now), ctx, owner, text, args, regs, None);
        let seq = entry.seq;
        debug!(seq, ready, executor = ctx.executor, "queued wait entry");
        if ready <= now {
            self.fifo.push_back(entry);
        } else {
            self.heap.push(HeapItem(entry));
        }
        Ok(seq)
    }

    /// Semaphore-triggered entry; parks until notify or drain.
    pub fn enqueue_sem(
        &mut self,
        obj: Dbref,
        attr: AttrNum,
        ctx: Ctx,
        owner: Dbref,
        text: String,
        args: Vec<String>,
        regs: Regs,
    ) -> Result<u64, QueueError> {
        self.admit(owner)?;
        let entry = self.build(0, ctx, owner, text, args, regs, Some((obj, attr)));
        let seq = entry.seq;
        debug!(seq, obj, attr, "queued semaphore entry");
        self.sem_waits.entry((obj, attr)).or_default().push_back(entry);
        Ok(seq)
    }

    /// Move every ripe heap entry onto the FIFO in (ready, insertion)
    /// order.
    pub fn tick(&mut self, now: i64) {
        while let Some(top) = self.heap.peek() {
            if top.0.ready > now {
                break;
            }
            if let Some(HeapItem(e)) = self.heap.pop() {
                self.fifo.push_back(e);
            }
        }
    }

    /// Pop the next runnable entry; its quota slot is released here.
    pub fn next_runnable(&mut self) -> Option<QueueEntry> {
        let e = self.fifo.pop_front()?;
        self.retire(e.owner);
        Some(e)
    }

    /// Release waiters parked on `(obj, attr)` — the first, or all.
    /// Returns how many moved to the FIFO.
    pub fn notify_sem(&mut self, obj: Dbref, attr: AttrNum, all: bool) -> usize {
        let Some(waiters) = self.sem_waits.get_mut(&(obj, attr)) else {
            return 0;
        };
        let mut released = 0;
        loop {
            match waiters.pop_front() {
                Some(e) => {
                    self.fifo.push_back(e);
                    released += 1;
                    if !all {
                        break;
                    }
                }
                None => break,
            }
        }
        if self
            .sem_waits
            .get(&(obj, attr))
            .map(|w| w.is_empty())
            .unwrap_or(false)
        {
            self.sem_waits.remove(&(obj, attr));
        }
        released
    }

    /// Discard waiters on `(obj, attr)` without running them.
    pub fn drain_sem(&mut self, obj: Dbref, attr: AttrNum) -> usize {
        let Some(waiters) = self.sem_waits.remove(&(obj, attr)) else {
            return 0;
        };
        let n = waiters.len();
        for e in waiters {
            self.retire(e.owner);
        }
        n
    }

    /// Remove entries whose executor or enactor is `who` from every
    /// collection. Returns how many were dropped.
    pub fn halt(&mut self, who: Dbref) -> usize {
        let hit = |e: &QueueEntry| e.ctx.executor == who || e.ctx.enactor == who;
        let mut dropped = 0;

        let kept: Vec<HeapItem> = std::mem::take(&mut self.heap)
            .into_iter()
            .filter_map(|item| {
                if hit(&item.0) {
                    dropped += 1;
                    self.retire(item.0.owner);
                    None
                } else {
                    Some(item)
                }
            })
            .collect();
        self.heap = kept.into_iter().collect();

        let fifo = std::mem::take(&mut self.fifo);
        for e in fifo {
            if hit(&e) {
                dropped += 1;
                self.retire(e.owner);
            } else {
                self.fifo.push_back(e);
            }
        }

        let pairs: Vec<(Dbref, AttrNum)> = self.sem_waits.keys().copied().collect();
        for pair in pairs {
            if let Some(old) = self.sem_waits.remove(&pair) {
                let mut kept = VecDeque::new();
                for e in old {
                    if hit(&e) {
                        dropped += 1;
                        self.retire(e.owner);
                    } else {
                        kept.push_back(e);
                    }
                }
                if !kept.is_empty() {
                    self.sem_waits.insert(pair, kept);
                }
            }
        }
        dropped
    }

    /// Snapshot for @ps, ordered by firing time then insertion.
    pub fn ps(&self) -> Vec<PsLine> {
        let mut lines: Vec<PsLine> = Vec::with_capacity(self.len());
        for e in self.fifo.iter() {
            lines.push(PsLine::from_entry(e, PsState::Immediate));
        }
        let mut heaped: Vec<&HeapItem> = self.heap.iter().collect();
        heaped.sort_by_key(|i| (i.0.ready, i.0.seq));
        for item in heaped {
            lines.push(PsLine::from_entry(&item.0, PsState::Timed));
        }
        for ((obj, attr), waiters) in self.sem_waits.iter() {
            for e in waiters {
                lines.push(PsLine::from_entry(e, PsState::Semaphore(*obj, *attr)));
            }
        }
        lines
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PsState {
    Immediate,
    Timed,
    Semaphore(Dbref, AttrNum),
}

#[derive(Debug, Clone)]
pub struct PsLine {
    pub seq: u64,
    pub ready: i64,
    pub executor: Dbref,
    pub text: String,
    pub state: PsState,
}

impl PsLine {
    fn from_entry(e: &QueueEntry, state: PsState) -> Self {
        PsLine {
            seq: e.seq,
            ready: e.ready,
            executor: e.ctx.executor,
            text: e.text.clone(),
            state,
        }
    }
}
