use anyhow::Result;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde_json::{json, Map, Value};

use crate::dict;
use crate::param::{ParamType, ParamValue};
use crate::stream::{AinbReader, AinbWriter};
use crate::{flag_to_function, murmur3_32};

/// Blackboard parameter type tag. Declaration order matches the on-disk
/// header order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum BBParamType {
    String = 0,
    S32 = 1,
    F32 = 2,
    Bool = 3,
    Vec3f = 4,
    VoidPtr = 5,
}

impl BBParamType {
    pub const ALL: [BBParamType; 6] = [
        BBParamType::String,
        BBParamType::S32,
        BBParamType::F32,
        BBParamType::Bool,
        BBParamType::Vec3f,
        BBParamType::VoidPtr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BBParamType::String => "String",
            BBParamType::S32 => "S32",
            BBParamType::F32 => "F32",
            BBParamType::Bool => "Bool",
            BBParamType::Vec3f => "Vec3f",
            BBParamType::VoidPtr => "VoidPtr",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "String" => Some(BBParamType::String),
            "S32" => Some(BBParamType::S32),
            "F32" => Some(BBParamType::F32),
            "Bool" => Some(BBParamType::Bool),
            "Vec3f" => Some(BBParamType::Vec3f),
            "VoidPtr" => Some(BBParamType::VoidPtr),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        u8::from(self) as usize
    }

    /// Value tag used to read/write the default-value block.
    fn value_type(self) -> ParamType {
        match self {
            BBParamType::String => ParamType::String,
            BBParamType::S32 => ParamType::Int,
            BBParamType::F32 => ParamType::Float,
            BBParamType::Bool => ParamType::Bool,
            BBParamType::Vec3f => ParamType::Vector3F,
            BBParamType::VoidPtr => ParamType::Pointer,
        }
    }

    fn value_size(self) -> usize {
        match self {
            BBParamType::Vec3f => 0xc,
            BBParamType::VoidPtr => 0,
            _ => 4,
        }
    }
}

/// Descriptor flag word overlay: file-reference presence and index, the two
/// BBParam flag bits, and the name string offset.
#[derive(Debug, Clone, Copy)]
struct BBParamDescriptor(u32);

impl BBParamDescriptor {
    fn from_raw(value: u32) -> Self {
        Self(value)
    }

    flag_to_function!(31 has_file_ref "The parameter references an external file");

    fn file_ref_index(&self) -> u32 {
        (self.0 >> 24) & 0x7f
    }

    fn param_flags(&self) -> u8 {
        ((self.0 >> 22) & 3) as u8
    }

    fn name_offset(&self) -> u32 {
        self.0 & 0x3f_ffff
    }

    fn compose(
        name_offset: u32,
        flags: u8,
        file_ref_index: Option<u32>,
    ) -> u32 {
        let mut raw =
            (name_offset & 0x3f_ffff) | (u32::from(flags & 3) << 22);
        if let Some(index) = file_ref_index {
            raw |= 1 << 31 | (index & 0x7f) << 24;
        }
        raw
    }
}

/// A blackboard entry.
///
/// The two flag bits: the lower marks the parameter inheritable between
/// modules; when not inheriting, both must be zero for the parameter to be
/// auto-matched between modules.
#[derive(Debug, Clone, PartialEq)]
pub struct BBParam {
    pub name: String,
    pub param_type: BBParamType,
    pub notes: String,
    /// Filename of the external file reference, empty when absent.
    pub file_ref: String,
    pub flags: u8,
    pub default_value: ParamValue,
}

impl BBParam {
    pub fn new(name: &str, param_type: BBParamType) -> Self {
        Self {
            name: name.to_owned(),
            param_type,
            notes: String::new(),
            file_ref: String::new(),
            flags: 0,
            default_value: ParamValue::default_for(param_type.value_type()),
        }
    }

    fn as_dict(&self, index: usize) -> Value {
        let mut out = Map::new();
        out.insert("Blackboard Index".to_owned(), json!(index));
        out.insert("Name".to_owned(), json!(self.name));
        out.insert("Notes".to_owned(), json!(self.notes));
        if !self.file_ref.is_empty() {
            out.insert("Source File".to_owned(), json!(self.file_ref));
        }
        out.insert("Flags".to_owned(), json!(self.flags));
        out.insert("Default Value".to_owned(), self.default_value.as_json());
        Value::Object(out)
    }

    fn from_dict(data: &Value, param_type: BBParamType) -> Result<Self> {
        let mut param = Self::new(&dict::get_str(data, "Name")?, param_type);
        param.notes = dict::get_str(data, "Notes")?;
        if data.get("Source File").is_some() {
            param.file_ref = dict::get_str(data, "Source File")?;
        }
        param.flags = dict::get_u16(data, "Flags")? as u8;
        param.default_value = ParamValue::from_json(
            dict::get(data, "Default Value")?,
            param_type.value_type(),
        )?;
        Ok(param)
    }
}

struct BBParamHeader {
    param_count: u16,
    _base_index: u16,
    offset: u16,
}

struct BBParamInfo {
    file_ref_index: Option<u32>,
    name: String,
    notes: String,
    flags: u8,
}

/// Six disjoint, ordered lists of typed parameters with default values and
/// optional external-file references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blackboard {
    params: [Vec<BBParam>; 6],
}

impl Blackboard {
    pub fn params(&self, param_type: BBParamType) -> &[BBParam] {
        &self.params[param_type.index()]
    }

    pub fn push(&mut self, param: BBParam) {
        self.params[param.param_type.index()].push(param);
    }

    pub fn is_empty(&self) -> bool {
        self.params.iter().all(Vec::is_empty)
    }

    pub(crate) fn read(reader: &mut AinbReader) -> Result<Self> {
        let headers: Vec<BBParamHeader> = (0..BBParamType::ALL.len())
            .map(|_| Self::read_header(reader))
            .collect::<Result<_>>()?;
        let mut info: Vec<Vec<BBParamInfo>> = Vec::new();
        for header in &headers {
            info.push(
                (0..header.param_count)
                    .map(|_| Self::read_param_info(reader))
                    .collect::<Result<_>>()?,
            );
        }

        // offsets referenced in the headers are relative to this point
        let base_offset = reader.tell();

        // file references come after all the default values (ptr types
        // store nothing, their default is implicitly null)
        let vec3_header = &headers[BBParamType::Vec3f.index()];
        let file_ref_offset = base_offset
            + vec3_header.offset as usize
            + vec3_header.param_count as usize * 0xc;

        let mut bb = Blackboard::default();
        for param_type in BBParamType::ALL {
            let header = &headers[param_type.index()];
            let start = base_offset + header.offset as usize;
            bb.params[param_type.index()] = reader.temp_seek(start, |r| {
                info[param_type.index()]
                    .iter()
                    .map(|info| {
                        Self::create_param(r, info, param_type, file_ref_offset)
                    })
                    .collect()
            })?;
        }
        Ok(bb)
    }

    fn read_header(reader: &mut AinbReader) -> Result<BBParamHeader> {
        let header = BBParamHeader {
            param_count: reader.read_u16()?,
            _base_index: reader.read_u16()?,
            offset: reader.read_u16()?,
        };
        let _padding = reader.read_u16()?;
        Ok(header)
    }

    fn read_param_info(reader: &mut AinbReader) -> Result<BBParamInfo> {
        let descriptor = BBParamDescriptor::from_raw(reader.read_u32()?);
        Ok(BBParamInfo {
            file_ref_index: descriptor
                .has_file_ref()
                .then(|| descriptor.file_ref_index()),
            name: reader.get_string(descriptor.name_offset())?,
            notes: reader.read_string_offset()?,
            flags: descriptor.param_flags(),
        })
    }

    fn create_param(
        reader: &mut AinbReader,
        info: &BBParamInfo,
        param_type: BBParamType,
        file_ref_offset: usize,
    ) -> Result<BBParam> {
        let mut param = BBParam::new(&info.name, param_type);
        param.notes = info.notes.clone();
        param.flags = info.flags;
        param.default_value =
            ParamValue::read(reader, param_type.value_type())?;
        if let Some(index) = info.file_ref_index {
            // each file reference entry is 0x10 bytes
            let offset = file_ref_offset + 0x10 * index as usize;
            param.file_ref = reader.temp_seek(offset, |r| {
                let filename = r.read_string_offset()?;
                let _path_hash = r.read_u32()?;
                let _filename_hash = r.read_u32()?;
                let _extension_hash = r.read_u32()?;
                Ok(filename)
            })?;
        }
        Ok(param)
    }

    pub(crate) fn write(&self, writer: &mut AinbWriter) {
        let mut file_refs: Vec<String> = Vec::new();
        let mut ref_index_of = |file_ref: &str| -> Option<u32> {
            if file_ref.is_empty() {
                return None;
            }
            let index = file_refs
                .iter()
                .position(|r| r == file_ref)
                .unwrap_or_else(|| {
                    file_refs.push(file_ref.to_owned());
                    file_refs.len() - 1
                });
            Some(index as u32)
        };

        let mut base_index = 0u16;
        let mut offset = 0u16;
        for param_type in BBParamType::ALL {
            let count = self.params(param_type).len() as u16;
            writer.write_u16(count);
            writer.write_u16(base_index);
            writer.write_u16(offset);
            writer.write_u16(0);
            base_index += count;
            offset += count * param_type.value_size() as u16;
        }
        for param_type in BBParamType::ALL {
            for param in self.params(param_type) {
                let name_offset = writer.string_offset(&param.name);
                let descriptor = BBParamDescriptor::compose(
                    name_offset,
                    param.flags,
                    ref_index_of(&param.file_ref),
                );
                writer.write_u32(descriptor);
                writer.write_string(&param.notes);
            }
        }
        for param_type in BBParamType::ALL {
            for param in self.params(param_type) {
                param.default_value.write(writer);
            }
        }
        for file_ref in &file_refs {
            let stem = file_ref.rsplit_once('.').map_or(
                file_ref.as_str(),
                |(stem, _)| stem,
            );
            let extension =
                file_ref.rsplit_once('.').map_or("", |(_, ext)| ext);
            writer.write_string(file_ref);
            writer.write_u32(murmur3_32(file_ref.as_bytes(), 0));
            writer.write_u32(murmur3_32(stem.as_bytes(), 0));
            writer.write_u32(murmur3_32(extension.as_bytes(), 0));
        }
    }

    pub(crate) fn as_dict(&self) -> Value {
        let mut out = Map::new();
        for param_type in BBParamType::ALL {
            let params = self.params(param_type);
            if params.is_empty() {
                continue;
            }
            let entries: Vec<Value> = params
                .iter()
                .enumerate()
                .map(|(i, param)| param.as_dict(i))
                .collect();
            out.insert(param_type.name().to_owned(), json!(entries));
        }
        Value::Object(out)
    }

    pub(crate) fn from_dict(data: &Value) -> Result<Self> {
        let mut bb = Blackboard::default();
        for param_type in BBParamType::ALL {
            let Some(entries) = data.get(param_type.name()) else {
                continue;
            };
            bb.params[param_type.index()] = dict::as_array(entries)?
                .iter()
                .map(|entry| BBParam::from_dict(entry, param_type))
                .collect::<Result<_>>()?;
        }
        Ok(bb)
    }
}
