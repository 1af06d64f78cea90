//! Seqlock-guarded cells for torn-free composite reads
//!
//! Writer protocol: bump the sequence to odd, copy the payload in, bump to
//! even with release ordering. Reader protocol: load the sequence, copy the
//! payload out, load the sequence again; a consistent read saw the same even
//! value twice. The payload copy is a plain memcpy fenced by the sequence
//! accesses, so payloads of any trivially-copyable size work.

use std::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    ptr,
    sync::atomic::{fence, AtomicU32, Ordering},
};

/// A payload guarded by an odd/even sequence word
///
/// The in-memory layout is the protocol contract: a 32-bit sequence first,
/// the payload at its natural alignment behind it.
#[repr(C)]
pub struct Guarded<T> {
    seq: AtomicU32,
    pub(crate) value: UnsafeCell<T>,
}

unsafe impl<T: Copy + Send> Send for Guarded<T> {}
unsafe impl<T: Copy + Send> Sync for Guarded<T> {}

impl<T: Copy> Guarded<T> {
    pub fn new(value: T) -> Self {
        Self {
            seq: AtomicU32::new(0),
            value: UnsafeCell::new(value),
        }
    }

    /// Publish a new payload; never blocks
    pub fn write(&self, value: T) {
        let s = self.seq.load(Ordering::Relaxed);
        // Odd marks the write in progress; Acquire on the swap keeps the
        // payload copy from being hoisted above it
        self.seq.swap(s.wrapping_add(1), Ordering::Acquire);
        unsafe {
            ptr::copy_nonoverlapping(
                &value as *const T as *const u8,
                self.value.get() as *mut u8,
                std::mem::size_of::<T>(),
            );
        }
        self.seq.store(s.wrapping_add(2), Ordering::Release);
    }

    /// Read a consistent payload, spinning (yield-hinted) while a write is
    /// in progress
    pub fn read(&self) -> T {
        loop {
            if let Some(value) = self.try_read() {
                return value;
            }
            std::thread::yield_now();
        }
    }

    /// Attempt a single consistent read; `None` when a writer interfered
    pub fn try_read(&self) -> Option<T> {
        let s1 = self.seq.load(Ordering::Acquire);
        if s1 & 1 == 1 {
            return None;
        }
        let mut out = MaybeUninit::<T>::uninit();
        unsafe {
            ptr::copy_nonoverlapping(
                self.value.get() as *const u8,
                out.as_mut_ptr() as *mut u8,
                std::mem::size_of::<T>(),
            );
        }
        fence(Ordering::Acquire);
        let s2 = self.seq.load(Ordering::Relaxed);
        if s1 == s2 {
            Some(unsafe { out.assume_init() })
        } else {
            None
        }
    }

    /// Current sequence word; odd while a write is in flight
    pub fn sequence(&self) -> u32 {
        self.seq.load(Ordering::Acquire)
    }
}

/// One consistent-read attempt against a raw seqlock wrapper.
///
/// `wrapper` addresses the wrapper start (the sequence word); the payload
/// lives at `payload_offset`. Copies `len` bytes beginning `extra` bytes
/// into the payload (array element reads pass a nonzero `extra`).
///
/// # Safety
/// `wrapper` must point at a live seqlock wrapper whose payload extends at
/// least `payload_offset + extra + len` bytes; `out` must hold `len` bytes.
/// The sequence word must be 4-byte aligned.
pub unsafe fn seqlock_try_read_raw(
    wrapper: *const u8,
    payload_offset: usize,
    extra: usize,
    len: usize,
    out: *mut u8,
) -> bool {
    let seq = &*(wrapper as *const AtomicU32);
    let s1 = seq.load(Ordering::Acquire);
    if s1 & 1 == 1 {
        return false;
    }
    ptr::copy_nonoverlapping(wrapper.add(payload_offset + extra), out, len);
    fence(Ordering::Acquire);
    s1 == seq.load(Ordering::Relaxed)
}

/// Blocking consistent read against a raw seqlock wrapper; retries with a
/// yield hint until a writer-free window is captured.
///
/// # Safety
/// Same requirements as [`seqlock_try_read_raw`].
pub unsafe fn seqlock_read_raw(
    wrapper: *const u8,
    payload_offset: usize,
    extra: usize,
    len: usize,
    out: *mut u8,
) {
    loop {
        if seqlock_try_read_raw(wrapper, payload_offset, extra, len, out) {
            return;
        }
        std::thread::yield_now();
    }
}

/// Writer protocol against a raw seqlock wrapper. Only safe under the
/// single-writer discipline.
///
/// # Safety
/// Same layout requirements as [`seqlock_try_read_raw`]; `src` must hold
/// `len` bytes. Exactly one writer may run this protocol at a time.
pub unsafe fn seqlock_write_raw(
    wrapper: *mut u8,
    payload_offset: usize,
    extra: usize,
    len: usize,
    src: *const u8,
) {
    let seq = &*(wrapper as *const AtomicU32);
    let s = seq.load(Ordering::Relaxed);
    seq.swap(s.wrapping_add(1), Ordering::Acquire);
    ptr::copy_nonoverlapping(src, wrapper.add(payload_offset + extra), len);
    seq.store(s.wrapping_add(2), Ordering::Release);
}
