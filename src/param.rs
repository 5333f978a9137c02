use anyhow::Result;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde_json::{json, Map, Value};

use crate::dict;
use crate::error::AinbError;
use crate::stream::{AinbReader, AinbWriter};
use crate::{flag_to_function, Vector3f};

/// Value type tag shared by properties and I/O parameters.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum ParamType {
    Int = 0,
    Bool = 1,
    Float = 2,
    String = 3,
    Vector3F = 4,
    Pointer = 5,
}

impl ParamType {
    pub const ALL: [ParamType; 6] = [
        ParamType::Int,
        ParamType::Bool,
        ParamType::Float,
        ParamType::String,
        ParamType::Vector3F,
        ParamType::Pointer,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ParamType::Int => "Int",
            ParamType::Bool => "Bool",
            ParamType::Float => "Float",
            ParamType::String => "String",
            ParamType::Vector3F => "Vector3F",
            ParamType::Pointer => "Pointer",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Int" => Some(ParamType::Int),
            "Bool" => Some(ParamType::Bool),
            "Float" => Some(ParamType::Float),
            "String" => Some(ParamType::String),
            "Vector3F" => Some(ParamType::Vector3F),
            "Pointer" => Some(ParamType::Pointer),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        u8::from(self) as usize
    }
}

/// A typed default value. `None` is the only value a Pointer entry can
/// carry.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    S32(i32),
    Bool(bool),
    F32(f32),
    String(String),
    Vec3f(Vector3f),
    None,
}

impl ParamValue {
    pub fn default_for(param_type: ParamType) -> Self {
        match param_type {
            ParamType::Int => ParamValue::S32(0),
            ParamType::Bool => ParamValue::Bool(false),
            ParamType::Float => ParamValue::F32(0.0),
            ParamType::String => ParamValue::String(String::new()),
            ParamType::Vector3F => ParamValue::Vec3f(Vector3f::default()),
            ParamType::Pointer => ParamValue::None,
        }
    }

    pub(crate) fn read(
        reader: &mut AinbReader,
        param_type: ParamType,
    ) -> Result<Self> {
        match param_type {
            ParamType::Int => reader.read_s32().map(ParamValue::S32),
            ParamType::Bool => {
                reader.read_u32().map(|v| ParamValue::Bool(v != 0))
            }
            ParamType::Float => reader.read_f32().map(ParamValue::F32),
            ParamType::String => {
                reader.read_string_offset().map(ParamValue::String)
            }
            ParamType::Vector3F => reader.read_vec3().map(ParamValue::Vec3f),
            ParamType::Pointer => Ok(ParamValue::None),
        }
    }

    pub(crate) fn write(&self, writer: &mut AinbWriter) {
        match self {
            ParamValue::S32(value) => writer.write_s32(*value),
            ParamValue::Bool(value) => writer.write_u32(u32::from(*value)),
            ParamValue::F32(value) => writer.write_f32(*value),
            ParamValue::String(value) => writer.write_string(value),
            ParamValue::Vec3f(value) => writer.write_vec3(*value),
            ParamValue::None => (),
        }
    }

    pub(crate) fn as_json(&self) -> Value {
        match self {
            ParamValue::S32(value) => json!(value),
            ParamValue::Bool(value) => json!(value),
            ParamValue::F32(value) => json!(value),
            ParamValue::String(value) => json!(value),
            ParamValue::Vec3f(value) => json!([value.x, value.y, value.z]),
            ParamValue::None => Value::Null,
        }
    }

    pub(crate) fn from_json(
        value: &Value,
        param_type: ParamType,
    ) -> Result<Self> {
        let invalid = || {
            AinbError::DictDecode(format!(
                "Default value {value} does not fit a {} parameter",
                param_type.name()
            ))
        };
        match param_type {
            ParamType::Int => value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(ParamValue::S32)
                .ok_or_else(|| invalid().into()),
            ParamType::Bool => value
                .as_bool()
                .map(ParamValue::Bool)
                .ok_or_else(|| invalid().into()),
            ParamType::Float => value
                .as_f64()
                .map(|v| ParamValue::F32(v as f32))
                .ok_or_else(|| invalid().into()),
            ParamType::String => value
                .as_str()
                .map(|v| ParamValue::String(v.to_owned()))
                .ok_or_else(|| invalid().into()),
            ParamType::Vector3F => {
                let components = value.as_array().ok_or_else(invalid)?;
                let [x, y, z] = &components[..] else {
                    return Err(invalid().into());
                };
                match (x.as_f64(), y.as_f64(), z.as_f64()) {
                    (Some(x), Some(y), Some(z)) => {
                        Ok(ParamValue::Vec3f(Vector3f::new(
                            x as f32, y as f32, z as f32,
                        )))
                    }
                    _ => Err(invalid().into()),
                }
            }
            ParamType::Pointer => {
                if value.is_null() {
                    Ok(ParamValue::None)
                } else {
                    Err(AinbError::DictDecode(
                        "Pointer params must have a default value of null"
                            .to_owned(),
                    )
                    .into())
                }
            }
        }
    }
}

/// Opaque per-entry flag word carried by properties and output parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamFlag(u32);

impl ParamFlag {
    pub fn from_raw(value: u32) -> Self {
        Self(value)
    }

    pub fn into_raw(&self) -> u32 {
        self.0
    }
}

/// Source flag word of an input parameter or multi-source entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceFlag(u32);

impl SourceFlag {
    pub fn from_raw(value: u32) -> Self {
        Self(value)
    }

    pub fn into_raw(&self) -> u32 {
        self.0
    }

    flag_to_function!(31 is_blackboard "The value comes from a blackboard parameter, `index` holds the BBParam index");
    flag_to_function!(30 is_expression "The value is transformed by an expression, `index` holds the expression index");
    flag_to_function!(29 is_multi "The source field is a (base, count) pair into the multi-source table");

    /// Blackboard or expression index, depending on the bits above.
    pub fn index(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    /// Operator combining the sub-sources of a multi-sourced input.
    pub fn operator(&self) -> u8 {
        ((self.0 >> 24) & 0x1f) as u8
    }

    /// Arity recorded alongside the operator for multi-sourced inputs.
    pub fn arity(&self) -> u8 {
        ((self.0 >> 16) & 0xff) as u8
    }
}

/// One resolved sub-source of a multi-sourced input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSource {
    pub node_index: i16,
    pub output_index: i16,
    pub flags: SourceFlag,
}

impl ParamSource {
    pub(crate) fn read(reader: &mut AinbReader) -> Result<Self> {
        Ok(Self {
            node_index: reader.read_s16()?,
            output_index: reader.read_s16()?,
            flags: SourceFlag::from_raw(reader.read_u32()?),
        })
    }

    pub(crate) fn write(&self, writer: &mut AinbWriter) {
        writer.write_s16(self.node_index);
        writer.write_s16(self.output_index);
        writer.write_u32(self.flags.into_raw());
    }

    pub(crate) fn as_dict(&self) -> Value {
        json!({
            "Source Node Index": self.node_index,
            "Source Output Index": self.output_index,
            "Flags": self.flags.into_raw(),
        })
    }

    pub(crate) fn from_dict(data: &Value) -> Result<Self> {
        Ok(Self {
            node_index: dict::get_i16(data, "Source Node Index")?,
            output_index: dict::get_i16(data, "Source Output Index")?,
            flags: SourceFlag::from_raw(dict::get_u32(data, "Flags")?),
        })
    }
}

/// Input parameter: a typed slot fed by a literal default, a blackboard
/// entry, an expression, another node's output, or several of those at
/// once.
#[derive(Debug, Clone, PartialEq)]
pub struct InputParam {
    pub name: String,
    /// Only meaningful for Pointer-typed entries.
    pub classname: String,
    pub param_type: ParamType,
    pub default_value: ParamValue,
    pub node_index: i16,
    pub output_index: i16,
    pub flags: SourceFlag,
    /// Sub-sources resolved through the multi-source table, non-empty only
    /// when `flags.is_multi()`.
    pub sources: Vec<ParamSource>,
}

impl InputParam {
    pub fn new(name: &str, param_type: ParamType) -> Self {
        Self {
            name: name.to_owned(),
            classname: String::new(),
            param_type,
            default_value: ParamValue::default_for(param_type),
            node_index: -1,
            output_index: -1,
            flags: SourceFlag::default(),
            sources: Vec::new(),
        }
    }

    fn binary_size(param_type: ParamType) -> usize {
        match param_type {
            ParamType::Vector3F => 0x18,
            _ => 0x10,
        }
    }

    fn read(reader: &mut AinbReader, param_type: ParamType) -> Result<Self> {
        let name = reader.read_string_offset()?;
        let classname = if param_type == ParamType::Pointer {
            reader.read_string_offset()?
        } else {
            String::new()
        };
        Ok(Self {
            name,
            classname,
            param_type,
            node_index: reader.read_s16()?,
            output_index: reader.read_s16()?,
            flags: SourceFlag::from_raw(reader.read_u32()?),
            default_value: ParamValue::read(reader, param_type)?,
            sources: Vec::new(),
        })
    }

    fn write(
        &self,
        writer: &mut AinbWriter,
        multi_sources: &mut Vec<ParamSource>,
    ) {
        writer.write_string(&self.name);
        if self.param_type == ParamType::Pointer {
            writer.write_string(&self.classname);
        }
        if self.flags.is_multi() {
            writer.write_s16(multi_sources.len() as i16);
            writer.write_s16(self.sources.len() as i16);
            multi_sources.extend_from_slice(&self.sources);
        } else {
            writer.write_s16(self.node_index);
            writer.write_s16(self.output_index);
        }
        writer.write_u32(self.flags.into_raw());
        self.default_value.write(writer);
    }

    fn resolve_multi(&mut self, multi_sources: &[ParamSource]) -> Result<()> {
        if !self.flags.is_multi() {
            return Ok(());
        }
        let base = usize::try_from(self.node_index).unwrap_or(usize::MAX);
        let count = usize::try_from(self.output_index).unwrap_or(usize::MAX);
        self.sources = multi_sources
            .get(base..base.saturating_add(count).min(multi_sources.len()))
            .filter(|slice| slice.len() == count)
            .map(<[ParamSource]>::to_vec)
            .ok_or(AinbError::InvalidReference {
                what: "multi-source",
                index: base,
                len: multi_sources.len(),
            })?;
        Ok(())
    }

    fn as_dict(&self) -> Value {
        let mut out = Map::new();
        out.insert("Name".to_owned(), json!(self.name));
        if self.param_type == ParamType::Pointer {
            out.insert("Classname".to_owned(), json!(self.classname));
        } else {
            out.insert(
                "Default Value".to_owned(),
                self.default_value.as_json(),
            );
        }
        out.insert("Flags".to_owned(), json!(self.flags.into_raw()));
        if self.flags.is_multi() {
            let sources: Vec<Value> =
                self.sources.iter().map(ParamSource::as_dict).collect();
            out.insert("Sources".to_owned(), json!(sources));
        } else {
            out.insert("Source Node Index".to_owned(), json!(self.node_index));
            out.insert(
                "Source Output Index".to_owned(),
                json!(self.output_index),
            );
        }
        Value::Object(out)
    }

    fn from_dict(data: &Value, param_type: ParamType) -> Result<Self> {
        let mut param = Self::new(&dict::get_str(data, "Name")?, param_type);
        if param_type == ParamType::Pointer {
            param.classname = dict::get_str(data, "Classname")?;
        } else {
            param.default_value = ParamValue::from_json(
                dict::get(data, "Default Value")?,
                param_type,
            )?;
        }
        param.flags = SourceFlag::from_raw(dict::get_u32(data, "Flags")?);
        if param.flags.is_multi() {
            param.sources = dict::get_array(data, "Sources")?
                .iter()
                .map(ParamSource::from_dict)
                .collect::<Result<_>>()?;
            param.node_index = 0;
            param.output_index = 0;
        } else {
            param.node_index = dict::get_i16(data, "Source Node Index")?;
            param.output_index = dict::get_i16(data, "Source Output Index")?;
        }
        Ok(param)
    }
}

/// Output parameter: a typed value a node exposes to its consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputParam {
    pub name: String,
    /// Only meaningful for Pointer-typed entries.
    pub classname: String,
    pub param_type: ParamType,
    pub flags: ParamFlag,
}

impl OutputParam {
    pub fn new(name: &str, param_type: ParamType) -> Self {
        Self {
            name: name.to_owned(),
            classname: String::new(),
            param_type,
            flags: ParamFlag::default(),
        }
    }

    fn binary_size(param_type: ParamType) -> usize {
        match param_type {
            ParamType::Pointer => 0xc,
            _ => 8,
        }
    }

    fn read(reader: &mut AinbReader, param_type: ParamType) -> Result<Self> {
        let name = reader.read_string_offset()?;
        let classname = if param_type == ParamType::Pointer {
            reader.read_string_offset()?
        } else {
            String::new()
        };
        Ok(Self {
            name,
            classname,
            param_type,
            flags: ParamFlag::from_raw(reader.read_u32()?),
        })
    }

    fn write(&self, writer: &mut AinbWriter) {
        writer.write_string(&self.name);
        if self.param_type == ParamType::Pointer {
            writer.write_string(&self.classname);
        }
        writer.write_u32(self.flags.into_raw());
    }

    fn as_dict(&self) -> Value {
        if self.param_type == ParamType::Pointer {
            json!({
                "Name": self.name,
                "Classname": self.classname,
                "Flags": self.flags.into_raw(),
            })
        } else {
            json!({
                "Name": self.name,
                "Flags": self.flags.into_raw(),
            })
        }
    }

    fn from_dict(data: &Value, param_type: ParamType) -> Result<Self> {
        let mut param = Self::new(&dict::get_str(data, "Name")?, param_type);
        if param_type == ParamType::Pointer {
            param.classname = dict::get_str(data, "Classname")?;
        }
        param.flags = ParamFlag::from_raw(dict::get_u32(data, "Flags")?);
        Ok(param)
    }
}

/// Six typed input tables plus six typed output tables. The file holds one
/// global set; each node owns a copied slice of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSet {
    inputs: [Vec<InputParam>; 6],
    outputs: [Vec<OutputParam>; 6],
}

impl ParamSet {
    pub fn inputs(&self, param_type: ParamType) -> &[InputParam] {
        &self.inputs[param_type.index()]
    }

    pub fn outputs(&self, param_type: ParamType) -> &[OutputParam] {
        &self.outputs[param_type.index()]
    }

    pub fn push_input(&mut self, param: InputParam) {
        self.inputs[param.param_type.index()].push(param);
    }

    pub fn push_output(&mut self, param: OutputParam) {
        self.outputs[param.param_type.index()].push(param);
    }

    pub fn has_inputs(&self) -> bool {
        self.inputs.iter().any(|table| !table.is_empty())
    }

    pub fn has_outputs(&self) -> bool {
        self.outputs.iter().any(|table| !table.is_empty())
    }

    pub(crate) fn input_slice(
        &self,
        param_type: ParamType,
        base: usize,
        count: usize,
    ) -> Result<Vec<InputParam>> {
        let table = self.inputs(param_type);
        table
            .get(base..base + count)
            .map(<[InputParam]>::to_vec)
            .ok_or_else(|| {
                AinbError::InvalidReference {
                    what: "input parameter",
                    index: base + count,
                    len: table.len(),
                }
                .into()
            })
    }

    pub(crate) fn output_slice(
        &self,
        param_type: ParamType,
        base: usize,
        count: usize,
    ) -> Result<Vec<OutputParam>> {
        let table = self.outputs(param_type);
        table
            .get(base..base + count)
            .map(<[OutputParam]>::to_vec)
            .ok_or_else(|| {
                AinbError::InvalidReference {
                    what: "output parameter",
                    index: base + count,
                    len: table.len(),
                }
                .into()
            })
    }

    /// Reads the file-level I/O parameter section. Table extents are
    /// inferred from the next table's offset; the last output table ends at
    /// the multi-source table.
    pub(crate) fn read(
        reader: &mut AinbReader,
        end_offset: usize,
        multi_sources: &[ParamSource],
    ) -> Result<Self> {
        let offsets: [u32; 12] = bincode::deserialize_from(&mut *reader)?;
        let mut set = ParamSet::default();
        for param_type in ParamType::ALL {
            let start = offsets[param_type.index()] as usize;
            let end = match param_type {
                ParamType::Pointer => offsets[6] as usize,
                _ => offsets[param_type.index() + 1] as usize,
            };
            let count = end.saturating_sub(start)
                / InputParam::binary_size(param_type);
            set.inputs[param_type.index()] = reader.temp_seek(start, |r| {
                (0..count)
                    .map(|_| InputParam::read(r, param_type))
                    .collect()
            })?;
        }
        for param_type in ParamType::ALL {
            let start = offsets[6 + param_type.index()] as usize;
            let end = match param_type {
                ParamType::Pointer => end_offset,
                _ => offsets[6 + param_type.index() + 1] as usize,
            };
            let count = end.saturating_sub(start)
                / OutputParam::binary_size(param_type);
            set.outputs[param_type.index()] = reader.temp_seek(start, |r| {
                (0..count)
                    .map(|_| OutputParam::read(r, param_type))
                    .collect()
            })?;
        }
        for table in &mut set.inputs {
            for param in table {
                param.resolve_multi(multi_sources)?;
            }
        }
        Ok(set)
    }

    /// Writes the file-level I/O parameter section and fills the
    /// multi-source table as multi-sourced inputs are laid out.
    pub(crate) fn write(
        &self,
        writer: &mut AinbWriter,
        multi_sources: &mut Vec<ParamSource>,
    ) {
        let patches: Vec<_> =
            (0..12).map(|_| writer.placeholder_u32()).collect();
        for param_type in ParamType::ALL {
            let patch = patches[param_type.index()];
            writer.patch_here(patch);
            for param in self.inputs(param_type) {
                param.write(writer, multi_sources);
            }
        }
        for param_type in ParamType::ALL {
            let patch = patches[6 + param_type.index()];
            writer.patch_here(patch);
            for param in self.outputs(param_type) {
                param.write(writer);
            }
        }
    }

    pub(crate) fn as_dict(&self) -> Value {
        let mut out = Map::new();
        let mut inputs = Map::new();
        for param_type in ParamType::ALL {
            let table = self.inputs(param_type);
            if table.is_empty() {
                continue;
            }
            let entries: Vec<Value> =
                table.iter().map(InputParam::as_dict).collect();
            inputs.insert(param_type.name().to_owned(), json!(entries));
        }
        if !inputs.is_empty() {
            out.insert("Inputs".to_owned(), Value::Object(inputs));
        }
        let mut outputs = Map::new();
        for param_type in ParamType::ALL {
            let table = self.outputs(param_type);
            if table.is_empty() {
                continue;
            }
            let entries: Vec<Value> =
                table.iter().map(OutputParam::as_dict).collect();
            outputs.insert(param_type.name().to_owned(), json!(entries));
        }
        if !outputs.is_empty() {
            out.insert("Outputs".to_owned(), Value::Object(outputs));
        }
        Value::Object(out)
    }

    pub(crate) fn from_dict(data: &Value) -> Result<Self> {
        let mut set = ParamSet::default();
        for param_type in ParamType::ALL {
            if let Some(entries) =
                data.get("Inputs").and_then(|v| v.get(param_type.name()))
            {
                set.inputs[param_type.index()] = dict::as_array(entries)?
                    .iter()
                    .map(|entry| InputParam::from_dict(entry, param_type))
                    .collect::<Result<_>>()?;
            }
            if let Some(entries) =
                data.get("Outputs").and_then(|v| v.get(param_type.name()))
            {
                set.outputs[param_type.index()] = dict::as_array(entries)?
                    .iter()
                    .map(|entry| OutputParam::from_dict(entry, param_type))
                    .collect::<Result<_>>()?;
            }
        }
        Ok(set)
    }
}
