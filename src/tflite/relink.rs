//! Writes a replacement root in front of an existing flatbuffer.
//!
//! Flatbuffer offsets are unsigned and always point towards the end of the
//! buffer, so new tables can only reference the original objects if they sit
//! before them. [`PrefixWriter`] lays out new objects front to back, records
//! every offset whose target is not final yet, and resolves them in
//! [`PrefixWriter::finish`] once the prefix length is known.
//!
//! ```text
//!  ┌─────────┬──────┬──────────────────────────┬─────────────────────────┐
//!  │ root off│ TFL3 │ new tables / vectors     │ original model          │
//!  └─────────┴──────┴──────────────────────────┴─────────────────────────┘
//!   0         4      8                          prefix_len (16-aligned)
//! ```

use std::ops::Range;

use crate::error::{MetadataError, Result};

/// The prefix is padded to this, so data in the original keeps its alignment.
pub(crate) const PREFIX_ALIGNMENT: usize = 16;

/// Placeholder for an object in the prefix that is written later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Label(usize);

/// What an offset field points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    /// An object written into the prefix.
    New(Label),
    /// Position of an object inside the original buffer.
    Original(usize),
}

/// A table field value, written in vtable slot order.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Field {
    U32(u32),
    U64(u64),
    Offset(Target),
    /// Absolute position in the original file; moves with the prefix.
    FileOffset(u64),
}

impl Field {
    fn size(&self) -> usize {
        match self {
            Field::U32(_) | Field::Offset(_) => 4,
            Field::U64(_) | Field::FileOffset(_) => 8,
        }
    }
}

#[derive(Debug)]
pub(crate) struct PrefixWriter {
    bytes: Vec<u8>,
    labels: Vec<Option<usize>>,
    offsets: Vec<(usize, Target)>,
    file_offsets: Vec<(usize, u64)>,
    scrubbed: Vec<Range<usize>>,
}

impl PrefixWriter {
    pub fn new(file_identifier: &str) -> Self {
        let mut bytes = vec![0u8; 4];
        bytes.extend_from_slice(file_identifier.as_bytes());
        Self {
            bytes,
            labels: Vec::new(),
            offsets: Vec::new(),
            file_offsets: Vec::new(),
            scrubbed: Vec::new(),
        }
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    fn bind(&mut self, label: Option<Label>, pos: usize) {
        if let Some(Label(i)) = label {
            self.labels[i] = Some(pos);
        }
    }

    /// Zero `range` of the original in the output. Used for data that is no
    /// longer referenced and must not survive in the file.
    pub fn scrub_original(&mut self, range: Range<usize>) {
        self.scrubbed.push(range);
    }

    fn pad_to(&mut self, alignment: usize) {
        let pad = (alignment - self.bytes.len() % alignment) % alignment;
        self.bytes.resize(self.bytes.len() + pad, 0);
    }

    fn put_u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn put_offset(&mut self, target: Target) {
        self.offsets.push((self.bytes.len(), target));
        self.put_u32(0);
    }

    /// Write a table followed by its vtable. `fields[i]` fills slot `i`.
    pub fn table(&mut self, label: Option<Label>, fields: &[Option<Field>]) -> usize {
        self.pad_to(4);
        let table = self.bytes.len();
        // soffset to the vtable, patched once the vtable is placed
        self.put_u32(0);

        let mut voffsets = vec![0u16; fields.len()];
        for (slot, field) in fields.iter().enumerate() {
            let Some(field) = *field else { continue };
            self.pad_to(field.size());
            voffsets[slot] = (self.bytes.len() - table) as u16;
            match field {
                Field::U32(v) => self.put_u32(v),
                Field::U64(v) => self.put_u64(v),
                Field::Offset(target) => self.put_offset(target),
                Field::FileOffset(v) => {
                    self.file_offsets.push((self.bytes.len(), v));
                    self.put_u64(v);
                }
            }
        }
        let inline_size = (self.bytes.len() - table) as u16;
        let used = voffsets.iter().rposition(|&v| v != 0).map_or(0, |i| i + 1);

        self.pad_to(2);
        let vtable = self.bytes.len();
        self.put_u16(((used + 2) * 2) as u16);
        self.put_u16(inline_size);
        for &v in &voffsets[..used] {
            self.put_u16(v);
        }
        // vtable = table - soffset
        let soffset = (table as i64 - vtable as i64) as i32;
        self.bytes[table..table + 4].copy_from_slice(&soffset.to_le_bytes());

        self.bind(label, table);
        table
    }

    /// Vector of offsets to tables.
    pub fn offset_vector(&mut self, label: Option<Label>, targets: &[Target]) -> usize {
        self.pad_to(4);
        let pos = self.bytes.len();
        self.put_u32(targets.len() as u32);
        for &target in targets {
            self.put_offset(target);
        }
        self.bind(label, pos);
        pos
    }

    pub fn string(&mut self, label: Option<Label>, s: &str) -> usize {
        self.pad_to(4);
        let pos = self.bytes.len();
        self.put_u32(s.len() as u32);
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        self.bind(label, pos);
        pos
    }

    /// `[ubyte]` vector whose first element lands on `alignment`.
    pub fn byte_vector(&mut self, label: Option<Label>, data: &[u8], alignment: usize) -> usize {
        self.pad_to(4);
        while (self.bytes.len() + 4) % alignment != 0 {
            self.put_u32(0);
        }
        let pos = self.bytes.len();
        self.put_u32(data.len() as u32);
        self.bytes.extend_from_slice(data);
        self.bind(label, pos);
        pos
    }

    /// Resolve every recorded offset, point the root at `root` and append
    /// `original` after the padded prefix, minus any scrubbed ranges.
    pub fn finish(mut self, root: Label, original: &[u8]) -> Result<Vec<u8>> {
        self.pad_to(PREFIX_ALIGNMENT);
        let prefix_len = self.bytes.len();

        let resolve = |labels: &[Option<usize>], target: Target| match target {
            Target::New(Label(i)) => labels
                .get(i)
                .copied()
                .flatten()
                .ok_or(MetadataError::UnresolvedOffset),
            Target::Original(pos) => Ok(prefix_len + pos),
        };

        let root_pos = resolve(&self.labels, Target::New(root))?;
        self.bytes[0..4].copy_from_slice(&(root_pos as u32).to_le_bytes());

        for &(at, target) in &self.offsets {
            let abs = resolve(&self.labels, target)?;
            debug_assert!(abs > at, "flatbuffer offsets must point forward");
            let relative = u32::try_from(abs - at).map_err(|_| MetadataError::TooLarge)?;
            self.bytes[at..at + 4].copy_from_slice(&relative.to_le_bytes());
        }

        for &(at, value) in &self.file_offsets {
            let shifted = value + prefix_len as u64;
            self.bytes[at..at + 8].copy_from_slice(&shifted.to_le_bytes());
        }

        let mut out = self.bytes;
        out.reserve(original.len());
        out.extend_from_slice(original);
        for range in &self.scrubbed {
            if range.end <= original.len() {
                out[prefix_len + range.start..prefix_len + range.end].fill(0);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
    }

    #[test]
    fn prefix_is_padded_and_original_appended() {
        let mut w = PrefixWriter::new("TEST");
        let root = w.label();
        w.table(Some(root), &[Some(Field::U32(7))]);
        let out = w.finish(root, b"tail").unwrap();

        assert_eq!(&out[4..8], b"TEST");
        assert_eq!(out.len() % PREFIX_ALIGNMENT, 4);
        assert_eq!(&out[out.len() - 4..], b"tail");
    }

    #[test]
    fn table_vtable_describes_fields() {
        let mut w = PrefixWriter::new("TEST");
        let root = w.label();
        let table = w.table(Some(root), &[Some(Field::U32(42)), None, Some(Field::U64(9))]);
        let out = w.finish(root, &[]).unwrap();

        assert_eq!(u32_at(&out, 0) as usize, table);
        let soffset = i32::from_le_bytes(out[table..table + 4].try_into().unwrap());
        let vtable = (table as i64 - soffset as i64) as usize;
        let vt = |i: usize| u16::from_le_bytes(out[vtable + 2 * i..vtable + 2 * i + 2].try_into().unwrap());

        assert_eq!(vt(0), 10, "header plus three slots");
        assert_eq!(vt(3), 0, "absent slot");
        assert_eq!(u32_at(&out, table + vt(2) as usize), 42);
        let wide = table + vt(4) as usize;
        assert_eq!(wide % 8, 0);
        assert_eq!(u64::from_le_bytes(out[wide..wide + 8].try_into().unwrap()), 9);
    }

    #[test]
    fn offsets_resolve_into_prefix_and_original() {
        let mut w = PrefixWriter::new("TEST");
        let root = w.label();
        let name = w.label();
        w.table(
            Some(root),
            &[Some(Field::Offset(Target::New(name))), Some(Field::Offset(Target::Original(3)))],
        );
        let name_pos = w.string(Some(name), "hi");
        let out = w.finish(root, b"xyzORIG").unwrap();
        let prefix_len = out.len() - 7;

        let table = u32_at(&out, 0) as usize;
        let first = table + 4;
        assert_eq!(first + u32_at(&out, first) as usize, name_pos);
        let second = table + 8;
        let target = second + u32_at(&out, second) as usize;
        assert_eq!(target, prefix_len + 3);
        assert_eq!(&out[target..target + 4], b"ORIG");
    }

    #[test]
    fn file_offsets_shift_by_prefix_length() {
        let mut w = PrefixWriter::new("TEST");
        let root = w.label();
        let table = w.table(Some(root), &[None, Some(Field::FileOffset(100))]);
        let out = w.finish(root, &[]).unwrap();
        let prefix_len = out.len();

        let field = (table + 8..).find(|p| p % 8 == 0).unwrap();
        let value = u64::from_le_bytes(out[field..field + 8].try_into().unwrap());
        assert_eq!(value, 100 + prefix_len as u64);
    }

    #[test]
    fn unwritten_label_is_an_error() {
        let mut w = PrefixWriter::new("TEST");
        let root = w.label();
        let missing = w.label();
        w.table(Some(root), &[Some(Field::Offset(Target::New(missing)))]);
        assert!(matches!(
            w.finish(root, &[]),
            Err(MetadataError::UnresolvedOffset)
        ));
    }

    #[test]
    fn scrubbed_ranges_are_zeroed_in_the_copy() {
        let mut w = PrefixWriter::new("TEST");
        let root = w.label();
        w.table(Some(root), &[]);
        w.scrub_original(2..6);
        w.scrub_original(5..64);
        let original = b"keepSECRETkeep";
        let out = w.finish(root, original).unwrap();
        let tail = &out[out.len() - original.len()..];
        assert_eq!(tail, b"ke\0\0\0\0CRETkeep");
    }

    #[test]
    fn byte_vector_data_is_aligned() {
        let mut w = PrefixWriter::new("TEST");
        let root = w.label();
        w.table(Some(root), &[]);
        let pos = w.byte_vector(None, &[1, 2, 3], 16);
        assert_eq!((pos + 4) % 16, 0);
        let out = w.finish(root, &[]).unwrap();
        assert_eq!(u32_at(&out, pos), 3);
        assert_eq!(&out[pos + 4..pos + 7], &[1, 2, 3]);
    }
}
