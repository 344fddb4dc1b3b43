//! Hand-maintained views over the FlatBuffer tables this crate touches.
//!
//! Accessors follow the shape `flatc --rust` emits. Only the tables the
//! populator reads are given typed accessors; everything else (operators,
//! subgraphs, signature defs, ...) is carried as an [`Opaque`] table that is
//! checked structurally and never interpreted.

use flatbuffers::{
    Follow, ForwardsUOffset, InvalidFlatbuffer, Table, VOffsetT, Verifiable, Vector, Verifier,
};

use crate::error::{MetadataError, Result};

/// File identifier of the TFLite model schema (v3).
pub const MODEL_FILE_IDENTIFIER: &str = "TFL3";
/// File identifier of the TFLite metadata schema.
pub const METADATA_FILE_IDENTIFIER: &str = "M001";
/// Name of the `Metadata` entry whose buffer holds the metadata flatbuffer.
pub const METADATA_FIELD_NAME: &str = "TFLITE_METADATA";

/// Whether `buf` carries `ident` right after its root offset.
pub fn has_identifier(buf: &[u8], ident: &str) -> bool {
    buf.get(4..8) == Some(ident.as_bytes())
}

/// Read a little-endian `u32` at `at`, if it lies inside `buf`.
pub(crate) fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

/// Absolute position of the object an offset field points at, `None` when
/// the field is absent from the table.
pub(crate) fn offset_field_target(table: &Table<'_>, slot: VOffsetT) -> Option<usize> {
    let voffset = table.vtable().get(slot);
    if voffset == 0 {
        return None;
    }
    let field = table.loc() + usize::from(voffset);
    let relative = read_u32(table.buf(), field)?;
    Some(field + relative as usize)
}

/// Verify `buf` as a TFLite model and return its root table.
pub fn root_as_model(buf: &[u8]) -> Result<Model<'_>> {
    if !has_identifier(buf, MODEL_FILE_IDENTIFIER) {
        return Err(MetadataError::WrongIdentifier {
            expected: MODEL_FILE_IDENTIFIER,
        });
    }
    Ok(flatbuffers::root::<Model>(buf)?)
}

/// Verify `buf` as a metadata flatbuffer and return its root table.
pub fn root_as_model_metadata(buf: &[u8]) -> Result<ModelMetadataTable<'_>> {
    if !has_identifier(buf, METADATA_FILE_IDENTIFIER) {
        return Err(MetadataError::WrongIdentifier {
            expected: METADATA_FILE_IDENTIFIER,
        });
    }
    Ok(flatbuffers::root::<ModelMetadataTable>(buf)?)
}

// ---------------------------------------------------------------------------
// Opaque – any table we carry but never look inside
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug)]
pub struct Opaque<'a> {
    pub _tab: Table<'a>,
}

impl<'a> Follow<'a> for Opaque<'a> {
    type Inner = Opaque<'a>;
    #[inline]
    unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
        Self {
            _tab: Table::new(buf, loc),
        }
    }
}

impl Verifiable for Opaque<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?.finish();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Model – root table of a .tflite file
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug)]
pub struct Model<'a> {
    pub _tab: Table<'a>,
}

impl<'a> Follow<'a> for Model<'a> {
    type Inner = Model<'a>;
    #[inline]
    unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
        Self {
            _tab: Table::new(buf, loc),
        }
    }
}

impl<'a> Model<'a> {
    pub const VT_VERSION: VOffsetT = 4;
    pub const VT_OPERATOR_CODES: VOffsetT = 6;
    pub const VT_SUBGRAPHS: VOffsetT = 8;
    pub const VT_DESCRIPTION: VOffsetT = 10;
    pub const VT_BUFFERS: VOffsetT = 12;
    pub const VT_METADATA_BUFFER: VOffsetT = 14;
    pub const VT_METADATA: VOffsetT = 16;
    pub const VT_SIGNATURE_DEFS: VOffsetT = 18;

    /// Number of fields the schema above describes.
    pub const KNOWN_FIELDS: usize = 8;

    #[inline]
    pub fn version(&self) -> u32 {
        // Safety:
        // Created from valid Table for this object
        // which contains a valid value in this slot
        unsafe { self._tab.get::<u32>(Model::VT_VERSION, Some(0)).unwrap_or(0) }
    }

    #[inline]
    pub fn subgraphs(&self) -> Option<Vector<'a, ForwardsUOffset<Opaque<'a>>>> {
        // Safety:
        // Created from valid Table for this object
        // which contains a valid value in this slot
        unsafe {
            self._tab
                .get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<Opaque>>>>(
                    Model::VT_SUBGRAPHS,
                    None,
                )
        }
    }

    #[inline]
    pub fn description(&self) -> Option<&'a str> {
        // Safety:
        // Created from valid Table for this object
        // which contains a valid value in this slot
        unsafe {
            self._tab
                .get::<ForwardsUOffset<&str>>(Model::VT_DESCRIPTION, None)
        }
    }

    #[inline]
    pub fn buffers(&self) -> Option<Vector<'a, ForwardsUOffset<Buffer<'a>>>> {
        // Safety:
        // Created from valid Table for this object
        // which contains a valid value in this slot
        unsafe {
            self._tab
                .get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<Buffer>>>>(
                    Model::VT_BUFFERS,
                    None,
                )
        }
    }

    #[inline]
    pub fn metadata(&self) -> Option<Vector<'a, ForwardsUOffset<Metadata<'a>>>> {
        // Safety:
        // Created from valid Table for this object
        // which contains a valid value in this slot
        unsafe {
            self._tab
                .get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<Metadata>>>>(
                    Model::VT_METADATA,
                    None,
                )
        }
    }

    /// Number of slots in this table's vtable, including ones newer than
    /// the schema known here.
    pub fn num_fields(&self) -> usize {
        self._tab.vtable().num_fields()
    }

    /// Buffer holding the `TFLITE_METADATA` flatbuffer, with its index.
    pub fn metadata_buffer_index(&self) -> Option<usize> {
        self.metadata()?
            .iter()
            .find(|entry| entry.name() == Some(METADATA_FIELD_NAME))
            .map(|entry| entry.buffer() as usize)
    }
}

impl Verifiable for Model<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<u32>("version", Self::VT_VERSION, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<Opaque>>>>(
                "operator_codes",
                Self::VT_OPERATOR_CODES,
                false,
            )?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<Opaque>>>>(
                "subgraphs",
                Self::VT_SUBGRAPHS,
                false,
            )?
            .visit_field::<ForwardsUOffset<&str>>("description", Self::VT_DESCRIPTION, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<Buffer>>>>(
                "buffers",
                Self::VT_BUFFERS,
                false,
            )?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>(
                "metadata_buffer",
                Self::VT_METADATA_BUFFER,
                false,
            )?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<Metadata>>>>(
                "metadata",
                Self::VT_METADATA,
                false,
            )?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<Opaque>>>>(
                "signature_defs",
                Self::VT_SIGNATURE_DEFS,
                false,
            )?
            .finish();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Buffer – raw tensor data, inline or addressed by file offset
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug)]
pub struct Buffer<'a> {
    pub _tab: Table<'a>,
}

impl<'a> Follow<'a> for Buffer<'a> {
    type Inner = Buffer<'a>;
    #[inline]
    unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
        Self {
            _tab: Table::new(buf, loc),
        }
    }
}

impl<'a> Buffer<'a> {
    pub const VT_DATA: VOffsetT = 4;
    pub const VT_OFFSET: VOffsetT = 6;
    pub const VT_SIZE: VOffsetT = 8;

    #[inline]
    pub fn data(&self) -> Option<Vector<'a, u8>> {
        // Safety:
        // Created from valid Table for this object
        // which contains a valid value in this slot
        unsafe {
            self._tab
                .get::<ForwardsUOffset<Vector<'a, u8>>>(Buffer::VT_DATA, None)
        }
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        // Safety:
        // Created from valid Table for this object
        // which contains a valid value in this slot
        unsafe { self._tab.get::<u64>(Buffer::VT_OFFSET, Some(0)).unwrap_or(0) }
    }

    #[inline]
    pub fn size(&self) -> u64 {
        // Safety:
        // Created from valid Table for this object
        // which contains a valid value in this slot
        unsafe { self._tab.get::<u64>(Buffer::VT_SIZE, Some(0)).unwrap_or(0) }
    }

    /// Data lives after the flatbuffer, at `offset` from the start of the
    /// file. Offsets 0 and 1 are sentinels meaning "no external data".
    pub fn is_external(&self) -> bool {
        self.offset() > 1
    }

    /// Bytes of this buffer inside `file`, whichever way they are stored.
    pub fn bytes_in(&self, file: &'a [u8]) -> Option<&'a [u8]> {
        if self.is_external() {
            let start = usize::try_from(self.offset()).ok()?;
            let len = usize::try_from(self.size()).ok()?;
            return file.get(start..start.checked_add(len)?);
        }
        Some(self.data().map(|d| d.bytes()).unwrap_or(&[]))
    }
}

impl Verifiable for Buffer<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<Vector<'_, u8>>>("data", Self::VT_DATA, false)?
            .visit_field::<u64>("offset", Self::VT_OFFSET, false)?
            .visit_field::<u64>("size", Self::VT_SIZE, false)?
            .finish();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Metadata – named pointer into the buffers vector
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug)]
pub struct Metadata<'a> {
    pub _tab: Table<'a>,
}

impl<'a> Follow<'a> for Metadata<'a> {
    type Inner = Metadata<'a>;
    #[inline]
    unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
        Self {
            _tab: Table::new(buf, loc),
        }
    }
}

impl<'a> Metadata<'a> {
    pub const VT_NAME: VOffsetT = 4;
    pub const VT_BUFFER: VOffsetT = 6;

    #[inline]
    pub fn name(&self) -> Option<&'a str> {
        // Safety:
        // Created from valid Table for this object
        // which contains a valid value in this slot
        unsafe { self._tab.get::<ForwardsUOffset<&str>>(Metadata::VT_NAME, None) }
    }

    #[inline]
    pub fn buffer(&self) -> u32 {
        // Safety:
        // Created from valid Table for this object
        // which contains a valid value in this slot
        unsafe { self._tab.get::<u32>(Metadata::VT_BUFFER, Some(0)).unwrap_or(0) }
    }
}

impl Verifiable for Metadata<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<&str>>("name", Self::VT_NAME, false)?
            .visit_field::<u32>("buffer", Self::VT_BUFFER, false)?
            .finish();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ModelMetadataTable – root of the M001 metadata flatbuffer
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug)]
pub struct ModelMetadataTable<'a> {
    pub _tab: Table<'a>,
}

impl<'a> Follow<'a> for ModelMetadataTable<'a> {
    type Inner = ModelMetadataTable<'a>;
    #[inline]
    unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
        Self {
            _tab: Table::new(buf, loc),
        }
    }
}

impl<'a> ModelMetadataTable<'a> {
    pub const VT_NAME: VOffsetT = 4;
    pub const VT_DESCRIPTION: VOffsetT = 6;
    pub const VT_VERSION: VOffsetT = 8;
    pub const VT_SUBGRAPH_METADATA: VOffsetT = 10;
    pub const VT_AUTHOR: VOffsetT = 12;
    pub const VT_LICENSE: VOffsetT = 14;
    pub const VT_ASSOCIATED_FILES: VOffsetT = 16;
    pub const VT_MIN_PARSER_VERSION: VOffsetT = 18;

    #[inline]
    fn string(&self, slot: VOffsetT) -> Option<&'a str> {
        // Safety:
        // Created from valid Table for this object
        // which contains a valid value in this slot
        unsafe { self._tab.get::<ForwardsUOffset<&str>>(slot, None) }
    }

    pub fn name(&self) -> Option<&'a str> {
        self.string(Self::VT_NAME)
    }

    pub fn description(&self) -> Option<&'a str> {
        self.string(Self::VT_DESCRIPTION)
    }

    pub fn version(&self) -> Option<&'a str> {
        self.string(Self::VT_VERSION)
    }

    pub fn author(&self) -> Option<&'a str> {
        self.string(Self::VT_AUTHOR)
    }

    pub fn license(&self) -> Option<&'a str> {
        self.string(Self::VT_LICENSE)
    }

    pub fn min_parser_version(&self) -> Option<&'a str> {
        self.string(Self::VT_MIN_PARSER_VERSION)
    }
}

impl Verifiable for ModelMetadataTable<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<&str>>("name", Self::VT_NAME, false)?
            .visit_field::<ForwardsUOffset<&str>>("description", Self::VT_DESCRIPTION, false)?
            .visit_field::<ForwardsUOffset<&str>>("version", Self::VT_VERSION, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<Opaque>>>>(
                "subgraph_metadata",
                Self::VT_SUBGRAPH_METADATA,
                false,
            )?
            .visit_field::<ForwardsUOffset<&str>>("author", Self::VT_AUTHOR, false)?
            .visit_field::<ForwardsUOffset<&str>>("license", Self::VT_LICENSE, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<Opaque>>>>(
                "associated_files",
                Self::VT_ASSOCIATED_FILES,
                false,
            )?
            .visit_field::<ForwardsUOffset<&str>>(
                "min_parser_version",
                Self::VT_MIN_PARSER_VERSION,
                false,
            )?
            .finish();
        Ok(())
    }
}
