//! Shared bounded circular byte channel
//!
//! A [`RingChannel`] is a single fixed-capacity ring of bytes shared by any
//! number of concurrent sessions. Sessions open with a capability set
//! (read, write, or both), transfer bytes through blocking or non-blocking
//! calls, and close. Storage is allocated when the first session opens and
//! freed when the last one closes.
//!
//! # Thread safety
//!
//! All cursor, counter, and storage accesses happen under one
//! `parking_lot::Mutex` per channel. A session holds no lock while it is
//! suspended waiting for data or space; the wait protocol is re-check on
//! wake (see [`crate::wakequeue`]), so being woken never implies the
//! condition holds.
//!
//! # Empty vs. full
//!
//! The buffer is empty iff the cursors are equal. One byte of capacity is
//! reserved so that "full" is the write cursor one slot behind the read
//! cursor, never equal to it.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::error::RingError;
use crate::wakequeue::{Handle, IdGen, WakeQueueArc};

/// Capability set granted to a session at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capabilities {
    Read,
    Write,
    ReadWrite,
}

impl Capabilities {
    #[must_use]
    pub fn can_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    #[must_use]
    pub fn can_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Per-call blocking mode.
///
/// `NonBlocking` converts "would suspend" into an immediate
/// [`RingError::WouldBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    Blocking,
    NonBlocking,
}

/// Sizing of one channel, fixed at construction.
///
/// The byte capacity is `items_per_channel * item_size`; one byte of it is
/// reserved to disambiguate full from empty.
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    pub items_per_channel: usize,
    pub item_size: usize,
}

impl ChannelConfig {
    /// Byte capacity of one channel.
    ///
    /// # Panics
    ///
    /// Panics if `items_per_channel * item_size` overflows `usize`.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.items_per_channel
            .checked_mul(self.item_size)
            .expect("channel capacity overflows usize")
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            items_per_channel: 20,
            item_size: 64,
        }
    }
}

/// Mutable channel state, all guarded by the channel mutex.
struct ChannelState {
    /// Allocated on first open, freed on last close. `None` iff no session
    /// is open.
    storage: Option<Box<[u8]>>,
    read_pos: usize,
    write_pos: usize,
    nreaders: usize,
    nwriters: usize,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            storage: None,
            read_pos: 0,
            write_pos: 0,
            nreaders: 0,
            nwriters: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.read_pos == self.write_pos
    }

    /// Bytes a write could still accept, honoring the reserved byte.
    fn space_free(&self, capacity: usize) -> usize {
        if self.read_pos == self.write_pos {
            capacity - 1
        } else {
            ((self.read_pos + capacity - self.write_pos) % capacity) - 1
        }
    }

    /// Bytes currently buffered.
    fn buffered(&self, capacity: usize) -> usize {
        (self.write_pos + capacity - self.read_pos) % capacity
    }

    /// Copy out up to `buf.len()` bytes from the contiguous run starting at
    /// the read cursor and advance it. Caller has verified non-emptiness.
    ///
    /// A single call never straddles the physical end of the buffer; the
    /// caller issues another call for the remainder.
    fn copy_out(&mut self, capacity: usize, buf: &mut [u8]) -> Result<usize, RingError> {
        let run = if self.write_pos > self.read_pos {
            self.write_pos - self.read_pos
        } else {
            capacity - self.read_pos
        };
        let count = run.min(buf.len());

        let storage = self.storage.as_ref().ok_or(RingError::Fault)?;
        let src = storage
            .get(self.read_pos..self.read_pos + count)
            .ok_or(RingError::Fault)?;
        buf[..count].copy_from_slice(src);

        self.read_pos += count;
        if self.read_pos == capacity {
            self.read_pos = 0;
        }
        Ok(count)
    }

    /// Copy in as much of `data` as free space and the contiguous run allow
    /// and advance the write cursor. Caller has verified free space exists.
    ///
    /// The run stops one byte short of the read cursor so a write can never
    /// make the cursors equal from a non-empty state.
    fn copy_in(&mut self, capacity: usize, data: &[u8]) -> Result<usize, RingError> {
        let free = self.space_free(capacity);
        let run = if self.write_pos >= self.read_pos {
            capacity - self.write_pos
        } else {
            self.read_pos - self.write_pos - 1
        };
        let count = data.len().min(free).min(run);

        let storage = self.storage.as_mut().ok_or(RingError::Fault)?;
        let dst = storage
            .get_mut(self.write_pos..self.write_pos + count)
            .ok_or(RingError::Fault)?;
        dst.copy_from_slice(&data[..count]);

        self.write_pos += count;
        if self.write_pos == capacity {
            self.write_pos = 0;
        }
        Ok(count)
    }
}

/// State shared between the channel and its sessions.
struct Shared {
    state: Mutex<ChannelState>,
    capacity: usize,
    /// Condition: data arrived, blocked readers should re-check.
    readable: Handle,
    /// Condition: space freed, blocked writers should re-check.
    writable: Handle,
    queue: WakeQueueArc,
    debug_hint: String,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.queue.unregister(self.readable);
        self.queue.unregister(self.writable);
    }
}

/// One shared circular byte channel.
///
/// The channel itself is created unallocated; [`RingChannel::open`] hands
/// out [`Session`]s that carry the granted capabilities and the session's
/// cancellation token.
pub struct RingChannel {
    shared: Arc<Shared>,
}

impl RingChannel {
    /// Create an unallocated channel and register its two wait conditions
    /// on the queue.
    ///
    /// # Panics
    ///
    /// Panics if the configured capacity overflows `usize` or is below 2
    /// bytes; one byte is reserved, so anything smaller could never hold
    /// data.
    #[must_use]
    pub fn new(
        config: ChannelConfig,
        queue: WakeQueueArc,
        id_gen: &IdGen,
        debug_hint: &str,
    ) -> Self {
        assert!(
            config.capacity() >= 2,
            "channel capacity must be at least 2 bytes"
        );
        let readable = Handle::new(id_gen.get_next());
        let writable = Handle::new(id_gen.get_next());
        queue.register(readable, &format!("ring.readable {debug_hint}"));
        queue.register(writable, &format!("ring.writable {debug_hint}"));

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ChannelState::new()),
                capacity: config.capacity(),
                readable,
                writable,
                queue,
                debug_hint: debug_hint.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Whether channel storage is currently allocated. True iff at least
    /// one session is open.
    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.shared.state.lock().storage.is_some()
    }

    /// Bytes currently buffered. Never reaches `capacity()`: one byte is
    /// reserved to keep full distinguishable from empty.
    #[must_use]
    pub fn buffered(&self) -> usize {
        let st = self.shared.state.lock();
        st.buffered(self.shared.capacity)
    }

    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.shared.state.lock().nreaders
    }

    #[must_use]
    pub fn writer_count(&self) -> usize {
        self.shared.state.lock().nwriters
    }

    /// Open a session with the requested capabilities.
    ///
    /// Allocates storage if this is the first open; cursors are reset only
    /// at that moment, so a second open never disturbs buffered content.
    ///
    /// # Errors
    ///
    /// `Interrupted` if `cancel` is already cancelled (nothing is changed),
    /// `OutOfMemory` if the first-open allocation fails (counters are left
    /// untouched).
    pub fn open(&self, caps: Capabilities, cancel: CancelToken) -> Result<Session, RingError> {
        if cancel.is_cancelled() {
            return Err(RingError::Interrupted);
        }

        let mut st = self.shared.state.lock();
        if st.storage.is_none() {
            let mut buf = Vec::new();
            buf.try_reserve_exact(self.shared.capacity)
                .map_err(|_| RingError::OutOfMemory)?;
            buf.resize(self.shared.capacity, 0);
            st.storage = Some(buf.into_boxed_slice());
            st.read_pos = 0;
            st.write_pos = 0;
        }
        if caps.can_read() {
            st.nreaders += 1;
        }
        if caps.can_write() {
            st.nwriters += 1;
        }
        drop(st);

        log::debug!("ring.open: {} caps={caps:?}", self.shared.debug_hint);
        Ok(Session {
            shared: Arc::clone(&self.shared),
            caps,
            cancel,
            closed: false,
        })
    }
}

impl fmt::Debug for RingChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.shared.state.lock();
        write!(
            f,
            "RingChannel(hint={}, capacity={}, allocated={}, buffered={}, nreaders={}, nwriters={})",
            self.shared.debug_hint,
            self.shared.capacity,
            st.storage.is_some(),
            st.buffered(self.shared.capacity),
            st.nreaders,
            st.nwriters
        )
    }
}

/// One open session on a channel.
///
/// A session is used from a single task at a time; separate sessions on the
/// same channel interleave safely through the channel mutex. Dropping a
/// session releases it, so the channel's session counts cannot leak.
pub struct Session {
    shared: Arc<Shared>,
    caps: Capabilities,
    cancel: CancelToken,
    closed: bool,
}

impl Session {
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Read up to `buf.len()` bytes.
    ///
    /// Transfers at most one contiguous run, so a successful call may
    /// return fewer bytes than requested even when more are buffered; the
    /// caller issues another call for the rest. A blocking read suspends
    /// while the buffer is empty and writers exist. Returns `Ok(0)` only at
    /// end of stream: the buffer is empty and no writer session is left
    /// (or `buf` is empty).
    ///
    /// # Errors
    ///
    /// `NotOpenForRead` without the Read capability, `WouldBlock` for a
    /// non-blocking read on an empty buffer, `Interrupted` if the session's
    /// token is cancelled before or during the wait, `Fault` if the storage
    /// transfer fails.
    pub async fn read(&self, buf: &mut [u8], mode: IoMode) -> Result<usize, RingError> {
        if !self.caps.can_read() {
            return Err(RingError::NotOpenForRead);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.cancel.is_cancelled() {
                return Err(RingError::Interrupted);
            }
            match self.read_once(buf) {
                Err(RingError::WouldBlock) if mode == IoMode::Blocking => {
                    self.wait_readable().await?;
                }
                other => return other,
            }
        }
    }

    /// Single non-blocking read attempt, for callers without an executor.
    ///
    /// Same contract as [`Session::read`] with [`IoMode::NonBlocking`].
    ///
    /// # Errors
    ///
    /// As for [`Session::read`].
    pub fn read_nonblocking(&self, buf: &mut [u8]) -> Result<usize, RingError> {
        if !self.caps.can_read() {
            return Err(RingError::NotOpenForRead);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        if self.cancel.is_cancelled() {
            return Err(RingError::Interrupted);
        }
        self.read_once(buf)
    }

    /// One locked read attempt; never waits.
    fn read_once(&self, buf: &mut [u8]) -> Result<usize, RingError> {
        let mut st = self.shared.state.lock();
        if !st.is_empty() {
            let count = st.copy_out(self.shared.capacity, buf)?;
            drop(st);
            // Space may now be free.
            #[allow(clippy::cast_possible_wrap)]
            self.shared.queue.notify(self.shared.writable, count as i64);
            log::debug!("ring.read: {} got {count} bytes", self.shared.debug_hint);
            return Ok(count);
        }
        if st.nwriters == 0 {
            // No producer left and nothing buffered: end of stream.
            return Ok(0);
        }
        Err(RingError::WouldBlock)
    }

    /// Write up to `data.len()` bytes.
    ///
    /// Accepts at most `min(free_space, contiguous run)` bytes; the count
    /// returned may be less than requested and the caller retries with the
    /// remainder (partial writes are not an error). A blocking write
    /// suspends while the buffer is full and readers exist. An empty `data`
    /// returns `Ok(0)` without waking readers.
    ///
    /// # Errors
    ///
    /// `NotOpenForWrite` without the Write capability, `WouldBlock` for a
    /// non-blocking write on a full buffer, `BrokenPipe` if the buffer is
    /// full with no reader session left to drain it, `Interrupted` if the
    /// session's token is cancelled before or during the wait, `Fault` if
    /// the storage transfer fails.
    pub async fn write(&self, data: &[u8], mode: IoMode) -> Result<usize, RingError> {
        if !self.caps.can_write() {
            return Err(RingError::NotOpenForWrite);
        }
        if data.is_empty() {
            return Ok(0);
        }

        loop {
            if self.cancel.is_cancelled() {
                return Err(RingError::Interrupted);
            }
            match self.write_once(data) {
                Err(RingError::WouldBlock) if mode == IoMode::Blocking => {
                    self.wait_writable().await?;
                }
                other => return other,
            }
        }
    }

    /// Single non-blocking write attempt, for callers without an executor.
    ///
    /// Same contract as [`Session::write`] with [`IoMode::NonBlocking`].
    ///
    /// # Errors
    ///
    /// As for [`Session::write`].
    pub fn write_nonblocking(&self, data: &[u8]) -> Result<usize, RingError> {
        if !self.caps.can_write() {
            return Err(RingError::NotOpenForWrite);
        }
        if data.is_empty() {
            return Ok(0);
        }
        if self.cancel.is_cancelled() {
            return Err(RingError::Interrupted);
        }
        self.write_once(data)
    }

    /// One locked write attempt; never waits.
    fn write_once(&self, data: &[u8]) -> Result<usize, RingError> {
        let mut st = self.shared.state.lock();
        if st.space_free(self.shared.capacity) > 0 {
            let count = st.copy_in(self.shared.capacity, data)?;
            drop(st);
            #[allow(clippy::cast_possible_wrap)]
            self.shared.queue.notify(self.shared.readable, count as i64);
            log::debug!("ring.write: {} put {count} bytes", self.shared.debug_hint);
            return Ok(count);
        }
        if st.nreaders == 0 {
            // Full and nobody will ever drain it.
            return Err(RingError::BrokenPipe);
        }
        Err(RingError::WouldBlock)
    }

    /// Close the session.
    ///
    /// When the last reader leaves, blocked writers are woken to re-check;
    /// when the last writer leaves, blocked readers are woken. When both
    /// counts reach zero the storage is freed and the cursors reset.
    ///
    /// # Errors
    ///
    /// `Interrupted` if the session's token is already cancelled. The
    /// session is still released (via `Drop`), so the counts do not leak.
    pub fn close(self) -> Result<(), RingError> {
        if self.cancel.is_cancelled() {
            return Err(RingError::Interrupted);
        }
        let mut this = self;
        this.release();
        Ok(())
    }

    /// Decrement the session counts and broadcast the conditions whose
    /// meaning changed. Idempotent.
    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let (readers_gone, writers_gone) = {
            let mut st = self.shared.state.lock();
            if self.caps.can_read() {
                st.nreaders -= 1;
            }
            if self.caps.can_write() {
                st.nwriters -= 1;
            }
            let readers_gone = self.caps.can_read() && st.nreaders == 0;
            let writers_gone = self.caps.can_write() && st.nwriters == 0;

            if st.nreaders == 0 && st.nwriters == 0 {
                st.storage = None;
                st.read_pos = 0;
                st.write_pos = 0;
            }
            (readers_gone, writers_gone)
        };

        // Notify outside the state lock. A count reaching zero changes the
        // meaning of "wait forever" for the opposite role, so the whole
        // wait list is woken to re-evaluate.
        if readers_gone {
            log::debug!("ring.close: last reader left {}", self.shared.debug_hint);
            self.shared.queue.notify(self.shared.writable, -1);
        }
        if writers_gone {
            log::debug!("ring.close: last writer left {}", self.shared.debug_hint);
            self.shared.queue.notify(self.shared.readable, -1);
        }
    }

    /// Park until the readable condition is notified.
    ///
    /// The queue lock is taken first and the emptiness condition re-checked
    /// under it, so a notification between the caller's check and the
    /// registration cannot be lost. Lock ordering is queue then state on
    /// this path; notifying paths take the two locks one at a time, never
    /// nested.
    async fn wait_readable(&self) -> Result<(), RingError> {
        let queue_lock = self.shared.queue.get_lock();
        let must_wait = {
            let st = self.shared.state.lock();
            st.is_empty() && st.nwriters > 0
        };
        if !must_wait {
            drop(queue_lock);
            return Ok(());
        }

        let wakeup = self
            .shared
            .queue
            .wait_async(self.shared.readable, "ring.read", queue_lock);
        tokio::select! {
            () = wakeup => Ok(()),
            () = self.cancel.cancelled() => Err(RingError::Interrupted),
        }
    }

    /// Park until the writable condition is notified. Same protocol as
    /// [`Session::wait_readable`].
    async fn wait_writable(&self) -> Result<(), RingError> {
        let queue_lock = self.shared.queue.get_lock();
        let must_wait = {
            let st = self.shared.state.lock();
            st.space_free(self.shared.capacity) == 0 && st.nreaders > 0
        };
        if !must_wait {
            drop(queue_lock);
            return Ok(());
        }

        let wakeup = self
            .shared
            .queue
            .wait_async(self.shared.writable, "ring.write", queue_lock);
        tokio::select! {
            () = wakeup => Ok(()),
            () = self.cancel.cancelled() => Err(RingError::Interrupted),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Session(channel={}, caps={:?}, closed={})",
            self.shared.debug_hint, self.caps, self.closed
        )
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}

impl embedded_io::ErrorType for Session {
    type Error = RingError;
}

// The sync trait surface never suspends: a call that would need to wait
// surfaces `WouldBlock` and the caller retries.
impl embedded_io::Read for Session {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        Session::read_nonblocking(self, buf)
    }
}

impl embedded_io::Write for Session {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Session::write_nonblocking(self, buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl embedded_io_async::Read for Session {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        Session::read(self, buf, IoMode::Blocking).await
    }
}

impl embedded_io_async::Write for Session {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Session::write(self, buf, IoMode::Blocking).await
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
