use anyhow::Result;

use std::collections::HashMap;

use crate::error::{AinbError, Warning, WarningKind, WarningSink};
use crate::{Guid, Vector3f};

/// Cursor over a mutable byte buffer with little-endian typed reads and a
/// shared string pool.
///
/// The buffer is owned and writable because enum resolution patches bytes
/// at arbitrary offsets before the remaining sections are decoded.
pub struct AinbReader<'a> {
    data: Vec<u8>,
    pos: usize,
    pool: Option<usize>,
    /// Format version of the file being decoded, installed right after the
    /// version dword is read. Layout decisions downstream key off this.
    pub version: u32,
    sink: &'a mut dyn WarningSink,
}

impl<'a> AinbReader<'a> {
    pub fn new(data: Vec<u8>, sink: &'a mut dyn WarningSink) -> Self {
        Self {
            data,
            pos: 0,
            pool: None,
            version: 0,
            sink,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(AinbError::OutOfBounds {
                position: pos,
                requested: 0,
                len: self.data.len(),
            }
            .into());
        }
        self.pos = pos;
        Ok(())
    }

    /// Runs `f` with the cursor moved to `pos`, restoring the previous
    /// position on every exit path.
    pub fn temp_seek<T>(
        &mut self,
        pos: usize,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let saved = self.pos;
        self.seek(pos)?;
        let result = f(self);
        self.pos = saved;
        result
    }

    pub fn warn(&mut self, kind: WarningKind, message: String) {
        self.sink.emit(Warning {
            kind,
            message,
            position: Some(self.pos),
        });
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(AinbError::OutOfBounds {
                position: self.pos,
                requested: n,
                len: self.data.len(),
            })?;
        let start = self.pos;
        self.pos = end;
        Ok(&self.data[start..end])
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.take(n).map(<[u8]>::to_vec)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_s8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_s16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_s32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_vec3(&mut self) -> Result<Vector3f> {
        Ok(Vector3f {
            x: self.read_f32()?,
            y: self.read_f32()?,
            z: self.read_f32()?,
        })
    }

    pub fn read_guid(&mut self) -> Result<Guid> {
        Ok(Guid::from_raw(self.take(16)?.try_into().unwrap()))
    }

    /// Installs the string pool at the given absolute offset. Every string
    /// offset read afterwards resolves relative to this position.
    pub fn init_string_pool(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(AinbError::OutOfBounds {
                position: offset,
                requested: 0,
                len: self.data.len(),
            }
            .into());
        }
        self.pool = Some(offset);
        Ok(())
    }

    /// Materializes the null-terminated string at `offset` within the pool.
    pub fn get_string(&mut self, offset: u32) -> Result<String> {
        let pool = self.pool.ok_or(AinbError::NoStringPool)?;
        let start = pool
            .checked_add(offset as usize)
            .filter(|start| *start < self.data.len())
            .ok_or(AinbError::OutOfBounds {
                position: pool.saturating_add(offset as usize),
                requested: 1,
                len: self.data.len(),
            })?;
        let tail = &self.data[start..];
        let end = tail.iter().position(|b| *b == 0).ok_or(
            AinbError::OutOfBounds {
                position: start,
                requested: tail.len() + 1,
                len: self.data.len(),
            },
        )?;
        std::str::from_utf8(&tail[..end])
            .map(str::to_owned)
            .map_err(|_| AinbError::InvalidUtf8 { position: start }.into())
    }

    pub fn read_string_offset(&mut self) -> Result<String> {
        let offset = self.read_u32()?;
        self.get_string(offset)
    }

    /// Overwrites four bytes at an absolute offset, used by enum
    /// resolution. Patches are total writes so applying one twice is
    /// indistinguishable from applying it once.
    pub fn patch_s32(&mut self, offset: usize, value: i32) -> Result<()> {
        let end = offset.checked_add(4).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            return Err(AinbError::OutOfBounds {
                position: offset,
                requested: 4,
                len: self.data.len(),
            }
            .into());
        };
        self.data[offset..end].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}

impl std::io::Read for AinbReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Offset of a dword written as zero, to be overwritten once the object it
/// points at has been laid out.
#[derive(Debug, Clone, Copy)]
pub struct Patch(usize);

/// Append-only byte sink, the symmetric half of [`AinbReader`].
///
/// Strings are not written inline: `write_string` records the string in the
/// pool and emits its pool offset; the pool itself is appended by
/// `append_string_pool` once everything else is laid out.
pub struct AinbWriter {
    data: Vec<u8>,
    pool: StringPool,
    pub version: u32,
}

impl AinbWriter {
    pub fn new(version: u32) -> Self {
        Self {
            data: Vec::new(),
            pool: StringPool::new(),
            version,
        }
    }

    pub fn pos(&self) -> usize {
        self.data.len()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_s16(&mut self, value: i16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_s32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_vec3(&mut self, value: Vector3f) {
        self.write_f32(value.x);
        self.write_f32(value.y);
        self.write_f32(value.z);
    }

    pub fn write_guid(&mut self, value: Guid) {
        self.data.extend_from_slice(&value.into_raw());
    }

    /// Emits the pool offset of `value`, interning it on first use.
    pub fn write_string(&mut self, value: &str) {
        let offset = self.pool.offset_of(value);
        self.write_u32(offset);
    }

    pub fn string_offset(&mut self, value: &str) -> u32 {
        self.pool.offset_of(value)
    }

    pub fn placeholder_u32(&mut self) -> Patch {
        let patch = Patch(self.data.len());
        self.write_u32(0);
        patch
    }

    pub fn patch_u32(&mut self, patch: Patch, value: u32) {
        self.data[patch.0..patch.0 + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Patches `patch` with the current position and returns that position.
    pub fn patch_here(&mut self, patch: Patch) -> usize {
        let pos = self.pos();
        self.patch_u32(patch, pos as u32);
        pos
    }

    /// Appends the string pool and returns its offset.
    pub fn append_string_pool(&mut self) -> usize {
        let offset = self.data.len();
        self.data.extend_from_slice(&self.pool.buf);
        offset
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Zero-terminated UTF-8 string pool built in first-use order. Offset 0 is
/// always the empty string so zero-initialized offsets stay valid.
struct StringPool {
    buf: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl StringPool {
    fn new() -> Self {
        let mut pool = Self {
            buf: Vec::new(),
            offsets: HashMap::new(),
        };
        pool.offset_of("");
        pool
    }

    fn offset_of(&mut self, value: &str) -> u32 {
        if let Some(offset) = self.offsets.get(value) {
            return *offset;
        }
        let offset = self.buf.len() as u32;
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
        self.offsets.insert(value.to_owned(), offset);
        offset
    }
}
