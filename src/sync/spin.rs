//! Spin-flag guarded cells with exclusive read/write/update

use std::{
    cell::UnsafeCell,
    ptr,
    sync::atomic::{AtomicU32, Ordering},
};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// A payload guarded by an atomic test-and-set flag
///
/// Layout contract: a 32-bit flag first, the payload at its natural
/// alignment behind it. All access paths (read, write, update) take the
/// flag for the duration of the copy.
#[repr(C)]
pub struct Locked<T> {
    flag: AtomicU32,
    pub(crate) value: UnsafeCell<T>,
}

unsafe impl<T: Copy + Send> Send for Locked<T> {}
unsafe impl<T: Copy + Send> Sync for Locked<T> {}

impl<T: Copy> Locked<T> {
    pub fn new(value: T) -> Self {
        Self {
            flag: AtomicU32::new(UNLOCKED),
            value: UnsafeCell::new(value),
        }
    }

    fn lock(&self) {
        while self.flag.swap(LOCKED, Ordering::Acquire) == LOCKED {
            std::hint::spin_loop();
        }
    }

    fn unlock(&self) {
        self.flag.store(UNLOCKED, Ordering::Release);
    }

    /// Copy the payload out under the flag
    pub fn read(&self) -> T {
        self.lock();
        let value = unsafe { *self.value.get() };
        self.unlock();
        value
    }

    /// Replace the payload under the flag
    pub fn write(&self, value: T) {
        self.lock();
        unsafe { *self.value.get() = value };
        self.unlock();
    }

    /// Mutate the payload in place under the flag
    pub fn update<F: FnOnce(&mut T)>(&self, f: F) {
        self.lock();
        unsafe { f(&mut *self.value.get()) };
        self.unlock();
    }
}

unsafe fn lock_raw(flag: &AtomicU32) {
    while flag.swap(LOCKED, Ordering::Acquire) == LOCKED {
        std::hint::spin_loop();
    }
}

/// Exclusive read against a raw locked wrapper.
///
/// `wrapper` addresses the wrapper start (the flag word); copies `len`
/// bytes beginning `extra` bytes into the payload.
///
/// # Safety
/// `wrapper` must point at a live locked wrapper whose payload extends at
/// least `payload_offset + extra + len` bytes; `out` must hold `len` bytes.
pub unsafe fn locked_read_raw(
    wrapper: *const u8,
    payload_offset: usize,
    extra: usize,
    len: usize,
    out: *mut u8,
) {
    let flag = &*(wrapper as *const AtomicU32);
    lock_raw(flag);
    ptr::copy_nonoverlapping(wrapper.add(payload_offset + extra), out, len);
    flag.store(UNLOCKED, Ordering::Release);
}

/// Exclusive write against a raw locked wrapper.
///
/// # Safety
/// Same requirements as [`locked_read_raw`]; `src` must hold `len` bytes.
pub unsafe fn locked_write_raw(
    wrapper: *mut u8,
    payload_offset: usize,
    extra: usize,
    len: usize,
    src: *const u8,
) {
    let flag = &*(wrapper as *const AtomicU32);
    lock_raw(flag);
    ptr::copy_nonoverlapping(src, wrapper.add(payload_offset + extra), len);
    flag.store(UNLOCKED, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_read_write_update() {
        let cell = Locked::new(40u64);
        assert_eq!(cell.read(), 40);
        cell.write(41);
        assert_eq!(cell.read(), 41);
        cell.update(|v| *v += 1);
        assert_eq!(cell.read(), 42);
    }

    #[test]
    fn test_raw_protocol() {
        let cell = Locked::new(7u32);
        let off = crate::sync::payload_offset(
            crate::layout::Atomicity::Locked,
            std::mem::align_of::<u32>(),
        );
        let mut out = [0u8; 4];
        unsafe {
            locked_read_raw(&cell as *const _ as *const u8, off, 0, 4, out.as_mut_ptr());
        }
        assert_eq!(u32::from_ne_bytes(out), 7);

        let newval = 99u32.to_ne_bytes();
        unsafe {
            locked_write_raw(&cell as *const _ as *mut u8, off, 0, 4, newval.as_ptr());
        }
        assert_eq!(cell.read(), 99);
    }

    #[test]
    fn test_concurrent_updates_count_exactly() {
        let cell = Arc::new(Locked::new(0u64));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cell = Arc::clone(&cell);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        cell.update(|v| *v += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cell.read(), 4_000);
    }
}
