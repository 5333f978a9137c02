use anyhow::Result;
use serde_json::{json, Value};

use crate::dict;
use crate::param::ParamType;
use crate::property::PropertySet;
use crate::stream::{AinbReader, AinbWriter, Patch};
use crate::murmur3_32;

/// Auxiliary bundle of properties attached to a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attachment {
    pub name: String,
    // these aren't necessary to store, we can calculate them later
    pub(crate) expression_count: u16,
    pub(crate) expression_io_size: u16,
    pub properties: PropertySet,
}

impl Attachment {
    pub(crate) fn read(
        reader: &mut AinbReader,
        properties: &PropertySet,
    ) -> Result<Self> {
        let mut attachment = Attachment {
            name: reader.read_string_offset()?,
            ..Attachment::default()
        };
        let offset = reader.read_u32()? as usize;
        attachment.expression_count = reader.read_u16()?;
        attachment.expression_io_size = reader.read_u16()?;
        if reader.version >= 0x407 {
            let _name_hash = reader.read_u32()?;
        }

        reader.temp_seek(offset, |r| {
            let _unk = r.read_u32()?;
            for param_type in ParamType::ALL {
                let base = r.read_u32()? as usize;
                let count = r.read_u32()? as usize;
                for property in properties.slice(param_type, base, count)? {
                    attachment.properties.push(property);
                }
            }
            // 0x30 unknown bytes follow
            Ok(())
        })?;

        Ok(attachment)
    }

    /// Writes the fixed-size attachment record, returning the patch for the
    /// parameter-block offset.
    pub(crate) fn write_record(&self, writer: &mut AinbWriter) -> Patch {
        writer.write_string(&self.name);
        let block = writer.placeholder_u32();
        writer.write_u16(self.expression_count);
        writer.write_u16(self.expression_io_size);
        if writer.version >= 0x407 {
            writer.write_u32(murmur3_32(self.name.as_bytes(), 0));
        }
        block
    }

    /// Writes the parameter block: the property slices of this attachment
    /// were already appended to the global set at `slices`.
    pub(crate) fn write_block(
        writer: &mut AinbWriter,
        slices: &[(u32, u32); 6],
    ) {
        writer.write_u32(0);
        for (base, count) in slices {
            writer.write_u32(*base);
            writer.write_u32(*count);
        }
        writer.write_bytes(&[0u8; 0x30]);
    }

    pub(crate) fn as_dict(&self) -> Value {
        json!({
            "Name": self.name,
            "Properties": self.properties.as_dict(),
        })
    }

    pub(crate) fn from_dict(data: &Value) -> Result<Self> {
        Ok(Attachment {
            name: dict::get_str(data, "Name")?,
            properties: PropertySet::from_dict(dict::get(
                data,
                "Properties",
            )?)?,
            ..Attachment::default()
        })
    }
}
