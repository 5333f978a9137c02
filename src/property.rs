use anyhow::Result;
use serde_json::{json, Map, Value};

use crate::dict;
use crate::error::AinbError;
use crate::param::{ParamFlag, ParamType, ParamValue};
use crate::stream::{AinbReader, AinbWriter};

/// A typed static value attached to a node or attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    /// Only meaningful for Pointer-typed entries.
    pub classname: String,
    pub param_type: ParamType,
    pub flags: ParamFlag,
    pub default_value: ParamValue,
}

impl Property {
    pub fn new(name: &str, param_type: ParamType) -> Self {
        Self {
            name: name.to_owned(),
            classname: String::new(),
            param_type,
            flags: ParamFlag::default(),
            default_value: ParamValue::default_for(param_type),
        }
    }

    fn binary_size(param_type: ParamType) -> usize {
        match param_type {
            ParamType::Vector3F => 0x14,
            _ => 0xc,
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
            default_value: ParamValue::read(reader, param_type)?,
        })
    }

    fn write(&self, writer: &mut AinbWriter) {
        writer.write_string(&self.name);
        if self.param_type == ParamType::Pointer {
            writer.write_string(&self.classname);
        }
        writer.write_u32(self.flags.into_raw());
        self.default_value.write(writer);
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
                "Default Value": self.default_value.as_json(),
                "Flags": self.flags.into_raw(),
            })
        }
    }

    fn from_dict(data: &Value, param_type: ParamType) -> Result<Self> {
        let mut property =
            Self::new(&dict::get_str(data, "Name")?, param_type);
        if param_type == ParamType::Pointer {
            property.classname = dict::get_str(data, "Classname")?;
        } else {
            property.default_value = ParamValue::from_json(
                dict::get(data, "Default Value")?,
                param_type,
            )?;
        }
        property.flags = ParamFlag::from_raw(dict::get_u32(data, "Flags")?);
        Ok(property)
    }
}

/// Six typed property tables. The file holds one global set; nodes and
/// attachments own copied slices of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertySet {
    properties: [Vec<Property>; 6],
}

impl PropertySet {
    pub fn properties(&self, param_type: ParamType) -> &[Property] {
        &self.properties[param_type.index()]
    }

    pub fn push(&mut self, property: Property) {
        self.properties[property.param_type.index()].push(property);
    }

    pub fn is_empty(&self) -> bool {
        self.properties.iter().all(Vec::is_empty)
    }

    pub(crate) fn slice(
        &self,
        param_type: ParamType,
        base: usize,
        count: usize,
    ) -> Result<Vec<Property>> {
        let table = self.properties(param_type);
        table
            .get(base..base + count)
            .map(<[Property]>::to_vec)
            .ok_or_else(|| {
                AinbError::InvalidReference {
                    what: "property",
                    index: base + count,
                    len: table.len(),
                }
                .into()
            })
    }

    /// Reads the file-level property section: six table offsets, entries
    /// packed behind them. A table's extent runs to the next offset; the
    /// last one ends at `end_offset`.
    pub(crate) fn read(
        reader: &mut AinbReader,
        end_offset: usize,
    ) -> Result<Self> {
        let offsets: [u32; 6] = bincode::deserialize_from(&mut *reader)?;
        let mut set = PropertySet::default();
        for param_type in ParamType::ALL {
            let start = offsets[param_type.index()] as usize;
            let end = match param_type {
                ParamType::Pointer => end_offset,
                _ => offsets[param_type.index() + 1] as usize,
            };
            let count =
                end.saturating_sub(start) / Property::binary_size(param_type);
            set.properties[param_type.index()] =
                reader.temp_seek(start, |r| {
                    (0..count)
                        .map(|_| Property::read(r, param_type))
                        .collect()
                })?;
        }
        Ok(set)
    }

    pub(crate) fn write(&self, writer: &mut AinbWriter) {
        let patches: Vec<_> =
            (0..6).map(|_| writer.placeholder_u32()).collect();
        for param_type in ParamType::ALL {
            let patch = patches[param_type.index()];
            writer.patch_here(patch);
            for property in self.properties(param_type) {
                property.write(writer);
            }
        }
    }

    pub(crate) fn as_dict(&self) -> Value {
        let mut out = Map::new();
        for param_type in ParamType::ALL {
            let table = self.properties(param_type);
            if table.is_empty() {
                continue;
            }
            let entries: Vec<Value> =
                table.iter().map(Property::as_dict).collect();
            out.insert(param_type.name().to_owned(), json!(entries));
        }
        Value::Object(out)
    }

    pub(crate) fn from_dict(data: &Value) -> Result<Self> {
        let mut set = PropertySet::default();
        for param_type in ParamType::ALL {
            let Some(entries) = data.get(param_type.name()) else {
                continue;
            };
            set.properties[param_type.index()] = dict::as_array(entries)?
                .iter()
                .map(|entry| Property::from_dict(entry, param_type))
                .collect::<Result<_>>()?;
        }
        Ok(set)
    }
}
