//! Field proxies: atomicity-dispatched reads and writes
//!
//! A proxy carries a field descriptor and the field's mapped address. Reads
//! dispatch on the field's atomicity tag; the None mode is a plain copy and
//! may observe torn multi-word values. Writes are a producer-side facility:
//! they are rejected for fields whose atomicity is None.

use std::ptr;

use crate::{
    error::{MemglassError, Result},
    layout::Atomicity,
    sync::{
        atomic_load_raw, atomic_store_raw, locked_read_raw, locked_write_raw, payload_offset,
        seqlock_read_raw, seqlock_try_read_raw, seqlock_write_raw,
    },
};

use super::{ObservedField, ObservedType};

/// Primitive values readable through a [`FieldProxy`]
pub trait FieldValue: Copy {
    const SIZE: usize;
    fn from_ne_bytes(bytes: &[u8]) -> Self;
    fn write_ne_bytes(self, out: &mut [u8]);
}

macro_rules! impl_field_value {
    ($($t:ty),* $(,)?) => {
        $(
            impl FieldValue for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn from_ne_bytes(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(bytes);
                    <$t>::from_ne_bytes(buf)
                }

                fn write_ne_bytes(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_ne_bytes());
                }
            }
        )*
    };
}

impl_field_value!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl FieldValue for bool {
    const SIZE: usize = 1;

    fn from_ne_bytes(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    fn write_ne_bytes(self, out: &mut [u8]) {
        out[0] = self as u8;
    }
}

/// A proxy bound to one field (or one array element) of a mapped object
#[derive(Debug, Clone, Copy)]
pub struct FieldProxy<'a> {
    object_base: *const u8,
    ty: &'a ObservedType,
    field: &'a ObservedField,
    element: Option<u32>,
}

impl<'a> FieldProxy<'a> {
    pub(crate) fn new(object_base: *const u8, ty: &'a ObservedType, field: &'a ObservedField) -> Self {
        Self {
            object_base,
            ty,
            field,
            element: None,
        }
    }

    /// The field descriptor, for caller-side validation
    pub fn info(&self) -> &'a ObservedField {
        self.field
    }

    /// Resolve a nested member: `proxy("a").field("b")` is `"a.b"`
    pub fn field(&self, name: &str) -> Result<FieldProxy<'a>> {
        let path = format!("{}.{}", self.field.name, name);
        let field = self
            .ty
            .field(&path)
            .ok_or_else(|| MemglassError::invalid_field(&path))?;
        Ok(FieldProxy::new(self.object_base, self.ty, field))
    }

    /// Bind to one element of a fixed array field
    pub fn at(&self, index: u32) -> Result<FieldProxy<'a>> {
        if self.field.array_len == 0 {
            return Err(MemglassError::invalid_field(format!(
                "{} is not an array",
                self.field.name
            )));
        }
        if index >= self.field.array_len {
            return Err(MemglassError::invalid_field(format!(
                "{}[{}] out of bounds (len {})",
                self.field.name, index, self.field.array_len
            )));
        }
        Ok(FieldProxy {
            element: Some(index),
            ..*self
        })
    }

    /// Field atomicity tag
    pub fn atomicity(&self) -> Atomicity {
        self.field.atomicity
    }

    /// Bytes covered by this proxy: one element when bound, the whole
    /// payload otherwise
    pub fn byte_len(&self) -> usize {
        if self.element.is_some() {
            self.field.size as usize
        } else {
            self.field.total_size() as usize
        }
    }

    fn wrapper_addr(&self) -> *const u8 {
        unsafe { self.object_base.add(self.field.offset as usize) }
    }

    fn payload_off(&self) -> usize {
        payload_offset(self.field.atomicity, self.field.payload_align())
    }

    fn element_extra(&self) -> usize {
        self.element.unwrap_or(0) as usize * self.field.size as usize
    }

    /// Copy the payload out, honoring the atomicity tag. Seqlock fields
    /// spin until a consistent window is captured.
    pub fn read_bytes(&self, out: &mut [u8]) -> Result<()> {
        let len = self.byte_len();
        if out.len() != len {
            return Err(MemglassError::invalid_parameter(
                "out",
                format!("Buffer is {} bytes, field covers {}", out.len(), len),
            ));
        }

        match self.field.atomicity {
            Atomicity::None => unsafe {
                ptr::copy_nonoverlapping(
                    self.wrapper_addr().add(self.element_extra()),
                    out.as_mut_ptr(),
                    len,
                );
            },
            Atomicity::Atomic => self.read_atomic(out)?,
            Atomicity::Seqlock => unsafe {
                seqlock_read_raw(
                    self.wrapper_addr(),
                    self.payload_off(),
                    self.element_extra(),
                    len,
                    out.as_mut_ptr(),
                );
            },
            Atomicity::Locked => unsafe {
                locked_read_raw(
                    self.wrapper_addr(),
                    self.payload_off(),
                    self.element_extra(),
                    len,
                    out.as_mut_ptr(),
                );
            },
        }
        Ok(())
    }

    /// Non-blocking variant: `Ok(false)` when a seqlock writer interfered
    /// instead of retrying
    pub fn try_read_bytes(&self, out: &mut [u8]) -> Result<bool> {
        if self.field.atomicity != Atomicity::Seqlock {
            self.read_bytes(out)?;
            return Ok(true);
        }
        let len = self.byte_len();
        if out.len() != len {
            return Err(MemglassError::invalid_parameter(
                "out",
                format!("Buffer is {} bytes, field covers {}", out.len(), len),
            ));
        }
        Ok(unsafe {
            seqlock_try_read_raw(
                self.wrapper_addr(),
                self.payload_off(),
                self.element_extra(),
                len,
                out.as_mut_ptr(),
            )
        })
    }

    fn read_atomic(&self, out: &mut [u8]) -> Result<()> {
        let elem = self.field.size as usize;
        let base = unsafe { self.wrapper_addr().add(self.element_extra()) };
        for i in 0..(out.len() / elem) {
            let ok = unsafe {
                atomic_load_raw(base.add(i * elem), elem, out.as_mut_ptr().add(i * elem))
            };
            if !ok {
                return Err(MemglassError::invalid_field(format!(
                    "{}: no lock-free atomic of width {}",
                    self.field.name, elem
                )));
            }
        }
        Ok(())
    }

    /// Read the payload as `T`, refusing a size mismatch
    pub fn read<T: FieldValue>(&self) -> Result<T> {
        let len = self.byte_len();
        if T::SIZE != len {
            return Err(MemglassError::invalid_field(format!(
                "{}: field covers {} bytes, read asked for {}",
                self.field.name,
                len,
                T::SIZE
            )));
        }
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf[..len])?;
        Ok(T::from_ne_bytes(&buf[..len]))
    }

    /// Write the payload as `T`, honoring the atomicity tag.
    ///
    /// Only fields with a non-None atomicity accept writes; the concurrency
    /// model assumes a single writer, so this is a producer-side facility.
    pub fn write<T: FieldValue>(&self, value: T) -> Result<()> {
        let len = self.byte_len();
        if T::SIZE != len {
            return Err(MemglassError::invalid_field(format!(
                "{}: field covers {} bytes, write supplied {}",
                self.field.name,
                len,
                T::SIZE
            )));
        }
        let mut buf = [0u8; 8];
        value.write_ne_bytes(&mut buf[..len]);
        self.write_bytes(&buf[..len])
    }

    /// Raw write counterpart of [`FieldProxy::read_bytes`]
    pub fn write_bytes(&self, src: &[u8]) -> Result<()> {
        let len = self.byte_len();
        if src.len() != len {
            return Err(MemglassError::invalid_parameter(
                "src",
                format!("Buffer is {} bytes, field covers {}", src.len(), len),
            ));
        }

        match self.field.atomicity {
            Atomicity::None => Err(MemglassError::invalid_parameter(
                "atomicity",
                format!(
                    "Field {} is unguarded; writes require an atomicity wrapper",
                    self.field.name
                ),
            )),
            Atomicity::Atomic => {
                let elem = self.field.size as usize;
                let base =
                    unsafe { (self.wrapper_addr() as *mut u8).add(self.element_extra()) };
                for i in 0..(len / elem) {
                    let ok = unsafe {
                        atomic_store_raw(base.add(i * elem), elem, src.as_ptr().add(i * elem))
                    };
                    if !ok {
                        return Err(MemglassError::invalid_field(format!(
                            "{}: no lock-free atomic of width {}",
                            self.field.name, elem
                        )));
                    }
                }
                Ok(())
            }
            Atomicity::Seqlock => {
                unsafe {
                    seqlock_write_raw(
                        self.wrapper_addr() as *mut u8,
                        self.payload_off(),
                        self.element_extra(),
                        len,
                        src.as_ptr(),
                    );
                }
                Ok(())
            }
            Atomicity::Locked => {
                unsafe {
                    locked_write_raw(
                        self.wrapper_addr() as *mut u8,
                        self.payload_off(),
                        self.element_extra(),
                        len,
                        src.as_ptr(),
                    );
                }
                Ok(())
            }
        }
    }

    // Convenience accessors mirroring the primitive table
    pub fn read_bool(&self) -> Result<bool> {
        self.read()
    }

    pub fn read_u8(&self) -> Result<u8> {
        self.read()
    }

    pub fn read_i32(&self) -> Result<i32> {
        self.read()
    }

    pub fn read_u32(&self) -> Result<u32> {
        self.read()
    }

    pub fn read_i64(&self) -> Result<i64> {
        self.read()
    }

    pub fn read_u64(&self) -> Result<u64> {
        self.read()
    }

    pub fn read_f32(&self) -> Result<f32> {
        self.read()
    }

    pub fn read_f64(&self) -> Result<f64> {
        self.read()
    }
}
