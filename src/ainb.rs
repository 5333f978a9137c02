use anyhow::Result;
use serde_json::{json, Map, Value};

use std::collections::HashMap;

use crate::attachment::Attachment;
use crate::blackboard::Blackboard;
use crate::dict;
use crate::enum_resolve::{self, EnumDb, EnumEntry};
use crate::error::{AinbError, StderrSink, WarningKind, WarningSink};
use crate::expression::ExpressionModule;
use crate::node::{Node, NodeDecodeContext, NodeRecordCounters, PlugType, Plug, Transition};
use crate::param::{ParamSet, ParamSource, ParamType};
use crate::property::PropertySet;
use crate::stream::{AinbReader, AinbWriter};
use crate::{FileCategory, Guid, SUPPORTED_VERSIONS};

/// Named entry point into the node graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    pub name: String,
    pub root_node_index: u32,
    pub guid_1: Guid,
    pub guid_2: Guid,
}

impl Command {
    fn read(reader: &mut AinbReader) -> Result<Self> {
        Ok(Self {
            name: reader.read_string_offset()?,
            root_node_index: reader.read_u32()?,
            guid_1: reader.read_guid()?,
            guid_2: reader.read_guid()?,
        })
    }

    fn write(&self, writer: &mut AinbWriter) {
        writer.write_string(&self.name);
        writer.write_u32(self.root_node_index);
        writer.write_guid(self.guid_1);
        writer.write_guid(self.guid_2);
    }

    fn as_dict(&self) -> Value {
        json!({
            "Name": self.name,
            "Root Node Index": self.root_node_index,
            "GUID 1": self.guid_1.to_string(),
            "GUID 2": self.guid_2.to_string(),
        })
    }

    fn from_dict(data: &Value) -> Result<Self> {
        Ok(Self {
            name: dict::get_str(data, "Name")?,
            root_node_index: dict::get_u32(data, "Root Node Index")?,
            guid_1: Guid::parse(&dict::get_str(data, "GUID 1")?)?,
            guid_2: Guid::parse(&dict::get_str(data, "GUID 2")?)?,
        })
    }
}

/// An XLink action triggered by a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Action {
    pub action_slot: String,
    pub action: String,
}

impl Action {
    pub(crate) fn as_dict(&self) -> Value {
        json!({
            "Action Slot": self.action_slot,
            "Action": self.action,
        })
    }

    pub(crate) fn from_dict(data: &Value) -> Result<Self> {
        Ok(Self {
            action_slot: dict::get_str(data, "Action Slot")?,
            action: dict::get_str(data, "Action")?,
        })
    }
}

/// An external AI node module invoked as a sub-graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub path: String,
    pub category: String,
    pub instance_count: u32,
}

impl Module {
    fn read(reader: &mut AinbReader) -> Result<Self> {
        Ok(Self {
            path: reader.read_string_offset()?,
            category: reader.read_string_offset()?,
            instance_count: reader.read_u32()?,
        })
    }

    fn write(&self, writer: &mut AinbWriter) {
        writer.write_string(&self.path);
        writer.write_string(&self.category);
        writer.write_u32(self.instance_count);
    }

    fn as_dict(&self) -> Value {
        json!({
            "Path": self.path,
            "Category": self.category,
            "Instance Count": self.instance_count,
        })
    }

    fn from_dict(data: &Value) -> Result<Self> {
        Ok(Self {
            path: dict::get_str(data, "Path")?,
            category: dict::get_str(data, "Category")?,
            instance_count: dict::get_u32(data, "Instance Count")?,
        })
    }
}

/// Runtime mutation directive, v0x407 and later only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementType {
    RemoveChild = 0,
    ReplaceChild = 1,
    RemoveAttachment = 2,
}

impl ReplacementType {
    fn from_raw(value: u8, position: usize) -> Result<Self> {
        match value {
            0 => Ok(Self::RemoveChild),
            1 => Ok(Self::ReplaceChild),
            2 => Ok(Self::RemoveAttachment),
            value => Err(AinbError::InvalidEnumValue {
                what: "replacement type",
                value: value.into(),
                position,
            }
            .into()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::RemoveChild => "RemoveChild",
            Self::ReplaceChild => "ReplaceChild",
            Self::RemoveAttachment => "RemoveAttachment",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "RemoveChild" => Some(Self::RemoveChild),
            "ReplaceChild" => Some(Self::ReplaceChild),
            "RemoveAttachment" => Some(Self::RemoveAttachment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplacementEntry {
    pub replace_type: ReplacementType,
    pub node_index: i16,
    /// Child plug index or attachment index, depending on the type.
    pub replace_index: i16,
    /// Replacement node index, for ReplaceChild entries.
    pub new_index: i16,
}

impl ReplacementEntry {
    fn read(reader: &mut AinbReader) -> Result<Self> {
        let position = reader.tell();
        let replace_type =
            ReplacementType::from_raw(reader.read_u8()?, position)?;
        let _padding = reader.read_u8()?;
        Ok(Self {
            replace_type,
            node_index: reader.read_s16()?,
            replace_index: reader.read_s16()?,
            new_index: reader.read_s16()?,
        })
    }

    fn write(&self, writer: &mut AinbWriter) {
        writer.write_u8(self.replace_type as u8);
        writer.write_u8(0);
        writer.write_s16(self.node_index);
        writer.write_s16(self.replace_index);
        writer.write_s16(self.new_index);
    }

    fn as_dict(&self) -> Value {
        let mut out = Map::new();
        out.insert("Type".to_owned(), json!(self.replace_type.name()));
        out.insert("Node Index".to_owned(), json!(self.node_index));
        if self.replace_type != ReplacementType::RemoveAttachment {
            out.insert(
                "Child Plug Index".to_owned(),
                json!(self.replace_index),
            );
            if self.replace_type == ReplacementType::ReplaceChild {
                out.insert(
                    "Replacement Node Index".to_owned(),
                    json!(self.new_index),
                );
            }
        } else {
            out.insert(
                "Attachment Index".to_owned(),
                json!(self.replace_index),
            );
        }
        Value::Object(out)
    }

    fn from_dict(data: &Value) -> Result<Self> {
        let type_name = dict::get_str(data, "Type")?;
        let replace_type =
            ReplacementType::from_name(&type_name).ok_or_else(|| {
                AinbError::DictDecode(format!(
                    "Unknown replacement type: {type_name:?}"
                ))
            })?;
        let mut entry = Self {
            replace_type,
            node_index: dict::get_i16(data, "Node Index")?,
            replace_index: -1,
            new_index: -1,
        };
        if replace_type != ReplacementType::RemoveAttachment {
            entry.replace_index = dict::get_i16(data, "Child Plug Index")?;
            if replace_type == ReplacementType::ReplaceChild {
                entry.new_index =
                    dict::get_i16(data, "Replacement Node Index")?;
            }
        } else {
            entry.replace_index = dict::get_i16(data, "Attachment Index")?;
        }
        Ok(entry)
    }
}

/// Record pointed to by header word 0x58. Semantics unknown, preserved
/// verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnknownSection0x58 {
    pub description: String,
    pub unk04: u32,
    pub unk08: u32,
    pub unk0c: u32,
}

impl UnknownSection0x58 {
    fn as_dict(&self) -> Value {
        json!({
            "Description": self.description,
            "Unknown04": self.unk04,
            "Unknown08": self.unk08,
            "Unknown0C": self.unk0c,
        })
    }

    fn from_dict(data: &Value) -> Result<Self> {
        Ok(Self {
            description: dict::get_str(data, "Description")?,
            unk04: dict::get_u32(data, "Unknown04")?,
            unk08: dict::get_u32(data, "Unknown08")?,
            unk0c: dict::get_u32(data, "Unknown0C")?,
        })
    }
}

/// An AINB file: a directed graph of typed nodes connected by plugs,
/// parameterized by a blackboard, optionally carrying an embedded
/// expression module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ainb {
    pub version: u32,
    pub filename: String,
    pub category: String,
    pub commands: Vec<Command>,
    pub nodes: Vec<Node>,
    pub blackboard: Option<Blackboard>,
    pub expressions: Option<ExpressionModule>,
    pub replacement_table: Vec<ReplacementEntry>,
    pub modules: Vec<Module>,
    pub unk_section_0x58: Option<UnknownSection0x58>,
    pub blackboard_id: u32,
    /// Id of the parent module to inherit the blackboard from (only
    /// inherits if non-zero). Blackboards can be inherited even if the ids
    /// don't match, so long as the parent module calls this module.
    pub parent_blackboard_id: u32,
}

impl Ainb {
    /// Decodes an AINB file, writing diagnostics to stderr.
    pub fn from_binary(data: Vec<u8>, enum_db: &EnumDb) -> Result<Self> {
        let mut sink = StderrSink;
        Self::from_binary_with(data, enum_db, &mut sink)
    }

    /// Decodes an AINB file, sending diagnostics to the given sink.
    pub fn from_binary_with(
        data: Vec<u8>,
        enum_db: &EnumDb,
        sink: &mut dyn WarningSink,
    ) -> Result<Self> {
        let mut reader = AinbReader::new(data, sink);
        Self::read(&mut reader, enum_db)
    }

    fn read(reader: &mut AinbReader, enum_db: &EnumDb) -> Result<Self> {
        let mut this = Ainb::default();

        let magic: [u8; 4] = reader.read_bytes(4)?.try_into().unwrap();
        if &magic != b"AIB " {
            return Err(AinbError::InvalidMagic {
                expected: "AIB ",
                found: magic,
            }
            .into());
        }
        this.version = reader.read_u32()?;
        if !SUPPORTED_VERSIONS.contains(&this.version) {
            return Err(AinbError::UnsupportedVersion {
                version: this.version,
            }
            .into());
        }
        reader.version = this.version;

        let counts: [u32; 8] = bincode::deserialize_from(&mut *reader)?;
        let [filename_offset, command_count, node_count, _query_count, attachment_count, _output_count, blackboard_offset, string_pool_offset] =
            counts.map(|v| v as usize);

        reader.init_string_pool(string_pool_offset)?;
        this.filename = reader.get_string(filename_offset as u32)?;

        let sections: [u32; 19] = bincode::deserialize_from(&mut *reader)?;
        let [enum_resolve_offset, property_offset, transition_offset, io_param_offset, multi_param_offset, attachment_offset, attachment_index_offset, expression_offset, replacement_offset, query_offset, x50, x54, x58, module_offset, category_name_offset, category, action_offset, x6c, blackboard_id_offset] =
            sections.map(|v| v as usize);

        this.category = reader.get_string(category_name_offset as u32)?;
        if this.version > 0x404 {
            let category = FileCategory::from_raw(category as u32)?;
            if this.category != category.name() {
                reader.warn(
                    WarningKind::CategoryMismatch,
                    format!(
                        "Category name string and category enum do not \
                         match: {} vs. {}",
                        this.category,
                        category.name()
                    ),
                );
            }
        } else if category != 0 {
            reader.warn(
                WarningKind::ReservedFieldSet,
                format!(
                    "Unused category field has a non-zero value: {category}"
                ),
            );
        }

        this.commands = (0..command_count)
            .map(|_| Command::read(reader))
            .collect::<Result<_>>()?;

        // defer node parsing until the rest of the file is filled out
        let node_offset = reader.tell();

        // enum resolution rewrites bytes in place, so it has to run before
        // anything that reads a patched site
        reader.seek(enum_resolve_offset)?;
        let enum_count = reader.read_u32()?;
        let enum_entries: Vec<EnumEntry> = (0..enum_count)
            .map(|_| EnumEntry::read(reader))
            .collect::<Result<_>>()?;
        enum_resolve::apply_patches(reader, &enum_entries, enum_db)?;

        reader.seek(blackboard_offset)?;
        this.blackboard = Some(Blackboard::read(reader)?);

        if expression_offset != 0 {
            reader.seek(expression_offset)?;
            let exb_data = reader
                .read_bytes(module_offset.saturating_sub(expression_offset))?;
            this.expressions = Some(ExpressionModule::from_binary(exb_data)?);
        }

        reader.seek(property_offset)?;
        let properties = PropertySet::read(reader, io_param_offset)?;

        reader.seek(attachment_offset)?;
        let attachments: Vec<Attachment> = (0..attachment_count)
            .map(|_| Attachment::read(reader, &properties))
            .collect::<Result<_>>()?;

        reader.seek(attachment_index_offset)?;
        let attachment_indices: Vec<u32> = (0..attachment_offset
            .saturating_sub(attachment_index_offset)
            / 4)
            .map(|_| reader.read_u32())
            .collect::<Result<_>>()?;

        reader.seek(multi_param_offset)?;
        let multi_sources: Vec<ParamSource> = (0..transition_offset
            .saturating_sub(multi_param_offset)
            / 8)
            .map(|_| ParamSource::read(reader))
            .collect::<Result<_>>()?;

        reader.seek(io_param_offset)?;
        let io_params =
            ParamSet::read(reader, multi_param_offset, &multi_sources)?;

        let mut transitions: Vec<Transition> = Vec::new();
        if transition_offset < query_offset {
            reader.seek(transition_offset)?;
            transitions = Self::read_transitions(reader)?;
        }

        // the header's query count is the number of nodes that are
        // queries, not the number of entries in this list
        let mut queries: Vec<u16> = Vec::new();
        let end = if expression_offset != 0 {
            expression_offset
        } else {
            module_offset
        };
        if query_offset < end {
            reader.seek(query_offset)?;
            queries = (0..(end - query_offset) / 4)
                .map(|_| {
                    let index = reader.read_u16()?;
                    // always 0, maybe padding? but why would it exist
                    let _unk = reader.read_u16()?;
                    Ok(index)
                })
                .collect::<Result<_>>()?;
        }

        let mut actions: HashMap<i32, Vec<Action>> = HashMap::new();
        reader.seek(action_offset)?;
        let action_count = reader.read_u32()?;
        for _ in 0..action_count {
            let index = reader.read_s32()?;
            let action = Action {
                action_slot: reader.read_string_offset()?,
                action: reader.read_string_offset()?,
            };
            actions.entry(index).or_default().push(action);
        }

        reader.seek(module_offset)?;
        let module_count = reader.read_u32()?;
        this.modules = (0..module_count)
            .map(|_| Module::read(reader))
            .collect::<Result<_>>()?;

        reader.seek(blackboard_id_offset)?;
        this.blackboard_id = reader.read_u32()?;
        this.parent_blackboard_id = reader.read_u32()?;

        // versions < 0x407 don't seem to actually apply these, but the
        // header structure looks the same at least
        if this.version >= 0x407 {
            reader.seek(replacement_offset)?;
            let replaced = reader.read_u8()?;
            if replaced != 0 {
                reader.warn(
                    WarningKind::ReplacementsAlreadyApplied,
                    "File indicates that replacements were already processed"
                        .to_owned(),
                );
            }
            let _padding = reader.read_u8()?;
            let replace_count = reader.read_u16()?;
            let _node_entry_count = reader.read_u16()?;
            let _attachment_entry_count = reader.read_u16()?;
            this.replacement_table = (0..replace_count)
                .map(|_| ReplacementEntry::read(reader))
                .collect::<Result<_>>()?;
        } else if replacement_offset != 0 {
            reader.warn(
                WarningKind::UnsupportedReplacementTable,
                format!(
                    "Replacement table found in file with version {:#x} \
                     which is unsupported (minimum version with replacement \
                     table support: 0x407)",
                    this.version
                ),
            );
        }

        reader.seek(node_offset)?;
        let module_paths: Vec<String> =
            this.modules.iter().map(|m| m.path.clone()).collect();
        let ctx = NodeDecodeContext {
            attachments: &attachments,
            attachment_indices: &attachment_indices,
            properties: &properties,
            io_params: &io_params,
            transitions: &transitions,
            queries: &queries,
            actions: &actions,
            module_paths: &module_paths,
        };
        this.nodes = (0..node_count)
            .map(|i| Node::read(reader, &ctx, i))
            .collect::<Result<_>>()?;

        // convert query registry indices to canonical node indices
        let query_indices: Vec<u16> = this
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.flags.is_query())
            .map(|(i, _)| i as u16)
            .collect();
        for node in &mut this.nodes {
            for query in &mut node.queries {
                *query = *query_indices.get(*query as usize).ok_or(
                    AinbError::InvalidReference {
                        what: "query registry",
                        index: *query as usize,
                        len: query_indices.len(),
                    },
                )?;
            }
        }

        if x50 != transition_offset {
            reader.warn(
                WarningKind::ReservedFieldSet,
                "Section 0x50 of the header appears to exist".to_owned(),
            );
        }

        if x54 != 0 {
            reader.warn(
                WarningKind::ReservedFieldSet,
                format!("Offset 0x54 of the header is non-zero: {x54}"),
            );
        }

        // this section only seems to appear in version 0x404, but it
        // should be allowable in later versions
        if x58 != 0 {
            reader.seek(x58)?;
            this.unk_section_0x58 = Some(UnknownSection0x58 {
                description: reader.read_string_offset()?,
                unk04: reader.read_u32()?,
                unk08: reader.read_u32()?,
                unk0c: reader.read_u32()?,
            });
        }

        if x6c != 0 {
            reader.seek(x6c)?;
            let count_maybe = reader.read_u32()?;
            if count_maybe != 0 {
                reader.warn(
                    WarningKind::ReservedFieldSet,
                    format!(
                        "Section 0x6c of the header appears to exist with \
                         value: {count_maybe}"
                    ),
                );
            }
        }

        Ok(this)
    }

    fn read_transitions(reader: &mut AinbReader) -> Result<Vec<Transition>> {
        // the offset run extends to the first pointed-to record
        let first = reader.read_u32()? as usize;
        let mut offsets = vec![first];
        while reader.tell() < first {
            offsets.push(reader.read_u32()? as usize);
        }
        offsets
            .into_iter()
            .map(|offset| {
                reader.seek(offset)?;
                Transition::read(reader)
            })
            .collect()
    }

    /// Encodes the graph back to bytes, the formal dual of the decoder.
    /// The string pool is laid out in first-use order, so the output is
    /// structurally (not byte-for-byte) equal to the input it was decoded
    /// from.
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        let mut writer = AinbWriter::new(self.version);

        // rebuild the global tables the per-node slices point into
        let query_positions: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.flags.is_query())
            .map(|(i, _)| i)
            .collect();
        let registry_of: HashMap<usize, u16> = query_positions
            .iter()
            .enumerate()
            .map(|(registry, canonical)| (*canonical, registry as u16))
            .collect();

        let mut global_props = PropertySet::default();
        let mut global_params = ParamSet::default();
        let mut flat_attachments: Vec<&Attachment> = Vec::new();
        let mut attachment_slices: Vec<[(u32, u32); 6]> = Vec::new();
        let mut attachment_indices: Vec<u32> = Vec::new();
        let mut query_entries: Vec<u16> = Vec::new();
        let mut transitions: Vec<Transition> = Vec::new();

        struct NodeLayout {
            prop_slices: [(u32, u32); 6],
            input_slices: [(u32, u32); 6],
            output_slices: [(u32, u32); 6],
            counters: NodeRecordCounters,
        }
        let mut layouts: Vec<NodeLayout> = Vec::new();

        for node in &self.nodes {
            let base_attachment_index = attachment_indices.len() as u32;
            for attachment in &node.attachments {
                let mut slices = [(0u32, 0u32); 6];
                for param_type in ParamType::ALL {
                    let base =
                        global_props.properties(param_type).len() as u32;
                    let entries = attachment.properties.properties(param_type);
                    for property in entries {
                        global_props.push(property.clone());
                    }
                    slices[param_type.index()] =
                        (base, entries.len() as u32);
                }
                attachment_indices.push(flat_attachments.len() as u32);
                attachment_slices.push(slices);
                flat_attachments.push(attachment);
            }

            let base_query_index = query_entries.len() as u16;
            for query in &node.queries {
                let registry = registry_of.get(&(*query as usize)).ok_or(
                    AinbError::InvalidReference {
                        what: "query node",
                        index: *query as usize,
                        len: self.nodes.len(),
                    },
                )?;
                query_entries.push(*registry);
            }

            let mut prop_slices = [(0u32, 0u32); 6];
            let mut input_slices = [(0u32, 0u32); 6];
            let mut output_slices = [(0u32, 0u32); 6];
            let mut expression_count = 0u16;
            let mut expression_io_size = 0u16;
            let mut multi_param_count = 0u16;
            for param_type in ParamType::ALL {
                let base = global_props.properties(param_type).len() as u32;
                let entries = node.properties.properties(param_type);
                for property in entries {
                    global_props.push(property.clone());
                }
                prop_slices[param_type.index()] = (base, entries.len() as u32);

                let base = global_params.inputs(param_type).len() as u32;
                let entries = node.params.inputs(param_type);
                for input in entries {
                    if input.flags.is_expression() {
                        expression_count += 1;
                        if let Some(exb) = &self.expressions {
                            if let Some(expr) =
                                exb.expressions.get(input.flags.index() as usize)
                            {
                                expression_io_size +=
                                    (expr.input_datatype.size()
                                        + expr.output_datatype.size())
                                        as u16;
                            }
                        }
                    }
                    if input.flags.is_multi() {
                        multi_param_count += input.sources.len() as u16;
                    }
                    global_params.push_input(input.clone());
                }
                input_slices[param_type.index()] =
                    (base, entries.len() as u32);

                let base = global_params.outputs(param_type).len() as u32;
                let entries = node.params.outputs(param_type);
                for output in entries {
                    global_params.push_output(output.clone());
                }
                output_slices[param_type.index()] =
                    (base, entries.len() as u32);
            }

            for plug in node.plugs(PlugType::Transition) {
                if let Plug::Transition(plug) = plug {
                    transitions.push(plug.transition.clone());
                }
            }

            layouts.push(NodeLayout {
                prop_slices,
                input_slices,
                output_slices,
                counters: NodeRecordCounters {
                    expression_count,
                    expression_io_size,
                    multi_param_count,
                    base_attachment_index,
                    base_query_index,
                },
            });
        }

        let output_count: usize = ParamType::ALL
            .iter()
            .map(|t| global_params.outputs(*t).len())
            .sum();

        // --- header ---
        writer.write_bytes(b"AIB ");
        writer.write_u32(self.version);
        writer.write_string(&self.filename);
        writer.write_u32(self.commands.len() as u32);
        writer.write_u32(self.nodes.len() as u32);
        writer.write_u32(query_positions.len() as u32);
        writer.write_u32(flat_attachments.len() as u32);
        writer.write_u32(output_count as u32);
        let blackboard_patch = writer.placeholder_u32();
        let string_pool_patch = writer.placeholder_u32();
        let enum_resolve_patch = writer.placeholder_u32();
        let property_patch = writer.placeholder_u32();
        let transition_patch = writer.placeholder_u32();
        let io_param_patch = writer.placeholder_u32();
        let multi_param_patch = writer.placeholder_u32();
        let attachment_patch = writer.placeholder_u32();
        let attachment_index_patch = writer.placeholder_u32();
        let expression_patch = writer.placeholder_u32();
        let replacement_patch = writer.placeholder_u32();
        let query_patch = writer.placeholder_u32();
        let x50_patch = writer.placeholder_u32();
        writer.write_u32(0); // 0x54
        let x58_patch = writer.placeholder_u32();
        let module_patch = writer.placeholder_u32();
        writer.write_string(&self.category);
        if self.version > 0x404 {
            let category = FileCategory::from_name(&self.category)
                .ok_or_else(|| {
                    AinbError::DictDecode(format!(
                        "Unknown file category: {}",
                        self.category
                    ))
                })?;
            writer.write_u32(category as u32);
        } else {
            writer.write_u32(0);
        }
        let action_patch = writer.placeholder_u32();
        writer.write_u32(0); // 0x6c
        let blackboard_id_patch = writer.placeholder_u32();

        for command in &self.commands {
            command.write(&mut writer);
        }

        let node_patches: Vec<_> = self
            .nodes
            .iter()
            .zip(&layouts)
            .map(|(node, layout)| {
                node.write_record(&mut writer, &layout.counters)
            })
            .collect();

        writer.patch_here(blackboard_patch);
        self.blackboard.clone().unwrap_or_default().write(&mut writer);

        writer.patch_here(property_patch);
        global_props.write(&mut writer);

        // the I/O parameter tables end where the multi-source table
        // begins, which in turn ends at the transition section
        writer.patch_here(io_param_patch);
        let mut multi_sources: Vec<ParamSource> = Vec::new();
        global_params.write(&mut writer, &mut multi_sources);

        writer.patch_here(multi_param_patch);
        for source in &multi_sources {
            source.write(&mut writer);
        }

        let transition_offset = writer.patch_here(transition_patch);
        writer.patch_u32(x50_patch, transition_offset as u32);
        if !transitions.is_empty() {
            let mut record_offset =
                writer.pos() + transitions.len() * 4;
            for transition in &transitions {
                writer.write_u32(record_offset as u32);
                record_offset += transition.binary_size();
            }
            for transition in &transitions {
                transition.write(&mut writer);
            }
        }

        writer.patch_here(query_patch);
        for entry in &query_entries {
            writer.write_u16(*entry);
            writer.write_u16(0);
        }

        match &self.expressions {
            Some(expressions) => {
                writer.patch_here(expression_patch);
                let exb = expressions.to_binary();
                writer.write_bytes(&exb);
            }
            None => writer.patch_u32(expression_patch, 0),
        }

        writer.patch_here(module_patch);
        writer.write_u32(self.modules.len() as u32);
        for module in &self.modules {
            module.write(&mut writer);
        }

        writer.patch_here(action_patch);
        let action_count: usize =
            self.nodes.iter().map(|node| node.actions.len()).sum();
        writer.write_u32(action_count as u32);
        for node in &self.nodes {
            for action in &node.actions {
                writer.write_s32(i32::from(node.index));
                writer.write_string(&action.action_slot);
                writer.write_string(&action.action);
            }
        }

        writer.patch_here(blackboard_id_patch);
        writer.write_u32(self.blackboard_id);
        writer.write_u32(self.parent_blackboard_id);

        if self.version >= 0x407 {
            writer.patch_here(replacement_patch);
            writer.write_u8(0);
            writer.write_u8(0);
            writer.write_u16(self.replacement_table.len() as u16);
            let attachment_entries = self
                .replacement_table
                .iter()
                .filter(|entry| {
                    entry.replace_type == ReplacementType::RemoveAttachment
                })
                .count();
            writer.write_u16(
                (self.replacement_table.len() - attachment_entries) as u16,
            );
            writer.write_u16(attachment_entries as u16);
            for entry in &self.replacement_table {
                entry.write(&mut writer);
            }
        } else {
            writer.patch_u32(replacement_patch, 0);
        }

        // the enum table is consumed at decode (the patches are applied in
        // place), so nothing survives to re-emit
        writer.patch_here(enum_resolve_patch);
        writer.write_u32(0);

        writer.patch_here(attachment_index_patch);
        for index in &attachment_indices {
            writer.write_u32(*index);
        }
        writer.patch_here(attachment_patch);
        let attachment_block_patches: Vec<_> = flat_attachments
            .iter()
            .map(|attachment| attachment.write_record(&mut writer))
            .collect();
        for (patch, slices) in
            attachment_block_patches.iter().zip(&attachment_slices)
        {
            writer.patch_here(*patch);
            Attachment::write_block(&mut writer, slices);
        }

        let mut next_transition_index = 0u32;
        for (node, (layout, patches)) in self
            .nodes
            .iter()
            .zip(layouts.iter().zip(&node_patches))
        {
            writer.patch_here(patches.param_block);
            node.write_param_block(
                &mut writer,
                &layout.prop_slices,
                &layout.input_slices,
                &layout.output_slices,
                &mut next_transition_index,
            );
        }

        if self.version < 0x407 {
            for (node, patches) in self.nodes.iter().zip(&node_patches) {
                if let Some(patch) = patches.state_info {
                    writer.patch_here(patch);
                    node.state_info
                        .clone()
                        .unwrap_or_default()
                        .write(&mut writer);
                }
            }
        }

        match &self.unk_section_0x58 {
            Some(section) => {
                writer.patch_here(x58_patch);
                writer.write_string(&section.description);
                writer.write_u32(section.unk04);
                writer.write_u32(section.unk08);
                writer.write_u32(section.unk0c);
            }
            None => writer.patch_u32(x58_patch, 0),
        }

        let pool = writer.append_string_pool();
        writer.patch_u32(string_pool_patch, pool as u32);
        Ok(writer.into_bytes())
    }

    /// Returns the file in dictionary form.
    pub fn as_dict(&self) -> Value {
        let mut out = Map::new();
        out.insert("Version".to_owned(), json!(self.version));
        out.insert("Filename".to_owned(), json!(self.filename));
        out.insert("Category".to_owned(), json!(self.category));
        out.insert("Blackboard ID".to_owned(), json!(self.blackboard_id));
        out.insert(
            "Parent Blackboard ID".to_owned(),
            json!(self.parent_blackboard_id),
        );
        let commands: Vec<Value> =
            self.commands.iter().map(Command::as_dict).collect();
        out.insert("Commands".to_owned(), json!(commands));
        let nodes: Vec<Value> = self
            .nodes
            .iter()
            .map(|node| node.as_dict(self.version))
            .collect();
        out.insert("Nodes".to_owned(), json!(nodes));
        out.insert(
            "Blackboard".to_owned(),
            self.blackboard
                .as_ref()
                .map(Blackboard::as_dict)
                .unwrap_or_else(|| json!({})),
        );
        out.insert(
            "Expressions".to_owned(),
            self.expressions
                .as_ref()
                .map(ExpressionModule::as_dict)
                .unwrap_or_else(|| json!({})),
        );
        if self.version >= 0x407 {
            let entries: Vec<Value> = self
                .replacement_table
                .iter()
                .map(ReplacementEntry::as_dict)
                .collect();
            out.insert("Replacement Table".to_owned(), json!(entries));
        }
        let modules: Vec<Value> =
            self.modules.iter().map(Module::as_dict).collect();
        out.insert("Modules".to_owned(), json!(modules));
        out.insert(
            "Unknown Section 0x58".to_owned(),
            self.unk_section_0x58
                .as_ref()
                .map(UnknownSection0x58::as_dict)
                .unwrap_or_else(|| json!({})),
        );
        Value::Object(out)
    }

    /// Converts the file to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.as_dict())
            .expect("JSON view is always serializable")
    }

    /// Deserializes a dictionary into an AINB object.
    pub fn from_dict(data: &Value) -> Result<Self> {
        let mut this = Ainb {
            version: dict::get_u32(data, "Version")?,
            ..Ainb::default()
        };
        if !SUPPORTED_VERSIONS.contains(&this.version) {
            return Err(AinbError::DictDecode(format!(
                "Unsupported AINB version: {}",
                this.version
            ))
            .into());
        }
        this.filename = dict::get_str(data, "Filename")?;
        this.category = dict::get_str(data, "Category")?;
        if this.version > 0x404
            && FileCategory::from_name(&this.category).is_none()
        {
            return Err(AinbError::DictDecode(format!(
                "Unknown file category: {}",
                this.category
            ))
            .into());
        }
        this.blackboard_id = dict::get_u32(data, "Blackboard ID")?;
        this.parent_blackboard_id =
            dict::get_u32(data, "Parent Blackboard ID")?;
        this.commands = dict::get_array(data, "Commands")?
            .iter()
            .map(Command::from_dict)
            .collect::<Result<_>>()?;
        this.nodes = dict::get_array(data, "Nodes")?
            .iter()
            .enumerate()
            .map(|(i, node)| Node::from_dict(node, i))
            .collect::<Result<_>>()?;
        let blackboard = dict::get(data, "Blackboard")?;
        if !dict::as_object(blackboard)?.is_empty() {
            this.blackboard = Some(Blackboard::from_dict(blackboard)?);
        }
        let expressions = dict::get(data, "Expressions")?;
        if !dict::as_object(expressions)?.is_empty() {
            this.expressions =
                Some(ExpressionModule::from_dict(expressions)?);
        }
        if this.version >= 0x407 {
            this.replacement_table =
                dict::get_array(data, "Replacement Table")?
                    .iter()
                    .map(ReplacementEntry::from_dict)
                    .collect::<Result<_>>()?;
        }
        this.modules = dict::get_array(data, "Modules")?
            .iter()
            .map(Module::from_dict)
            .collect::<Result<_>>()?;
        let unknown = dict::get(data, "Unknown Section 0x58")?;
        if !dict::as_object(unknown)?.is_empty() {
            this.unk_section_0x58 =
                Some(UnknownSection0x58::from_dict(unknown)?);
        }
        Ok(this)
    }

    /// Deserializes a JSON string into an AINB object.
    pub fn from_json_text(text: &str) -> Result<Self> {
        let data: Value = serde_json::from_str(text)
            .map_err(|e| AinbError::DictDecode(e.to_string()))?;
        Self::from_dict(&data)
    }

    pub fn get_node(&self, node_index: usize) -> Option<&Node> {
        self.nodes.get(node_index)
    }

    pub fn get_command(&self, cmd_index: usize) -> Option<&Command> {
        self.commands.get(cmd_index)
    }

    pub fn get_command_by_name(&self, cmd_name: &str) -> Option<&Command> {
        self.commands.iter().find(|cmd| cmd.name == cmd_name)
    }
}
