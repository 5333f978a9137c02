use anyhow::Result;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde_json::{json, Map, Value};

use std::collections::HashMap;

use crate::ainb::Action;
use crate::attachment::Attachment;
use crate::dict;
use crate::error::{AinbError, WarningKind};
use crate::flag_to_function;
use crate::murmur3_32;
use crate::param::{ParamSet, ParamType};
use crate::property::PropertySet;
use crate::stream::{AinbReader, AinbWriter, Patch};
use crate::Guid;

pub const NULL_INDEX: i32 = 0x7fff;

/// Returns the value representing a null (ignored) node index.
pub fn get_null_index() -> i32 {
    NULL_INDEX
}

/// Sentinel string marking the default case of F32/String selectors.
pub const DEFAULT_CASE_STRING: &str = "その他";

/// A transition entry where the root node of the current context is
/// swapped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    /// 0 = state end transition, 1 = generic transition.
    pub transition_type: u8,
    pub update_post_calc: bool,
    pub command_name: String,
}

impl Transition {
    pub(crate) fn read(reader: &mut AinbReader) -> Result<Self> {
        let flags = reader.read_u32()?;
        let transition_type = (flags & 0xff) as u8;
        Ok(Self {
            transition_type,
            update_post_calc: (flags >> 0x1f) & 1 != 0,
            command_name: if transition_type == 0 {
                reader.read_string_offset()?
            } else {
                String::new()
            },
        })
    }

    pub(crate) fn write(&self, writer: &mut AinbWriter) {
        let mut flags = u32::from(self.transition_type);
        if self.update_post_calc {
            flags |= 1 << 0x1f;
        }
        writer.write_u32(flags);
        if self.transition_type == 0 {
            writer.write_string(&self.command_name);
        }
    }

    pub(crate) fn binary_size(&self) -> usize {
        if self.transition_type == 0 {
            8
        } else {
            4
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u16)]
#[allow(non_camel_case_types)]
pub enum NodeType {
    UserDefined = 0,
    Element_S32Selector = 1,
    Element_Sequential = 2,
    Element_Simultaneous = 3,
    Element_F32Selector = 4,
    Element_StringSelector = 5,
    Element_RandomSelector = 6,
    Element_BoolSelector = 7,
    Element_Fork = 8,
    Element_Join = 9,
    Element_Alert = 10,
    Element_Expression = 20,
    Element_ModuleIF_Input_S32 = 100,
    Element_ModuleIF_Input_F32 = 101,
    Element_ModuleIF_Input_Vec3f = 102,
    Element_ModuleIF_Input_String = 103,
    Element_ModuleIF_Input_Bool = 104,
    Element_ModuleIF_Input_Ptr = 105,
    Element_ModuleIF_Output_S32 = 200,
    Element_ModuleIF_Output_F32 = 201,
    Element_ModuleIF_Output_Vec3f = 202,
    Element_ModuleIF_Output_String = 203,
    Element_ModuleIF_Output_Bool = 204,
    Element_ModuleIF_Output_Ptr = 205,
    Element_ModuleIF_Child = 300,
    Element_StateEnd = 400,
    Element_SplitTiming = 500,
}

const NODE_TYPE_NAMES: [(NodeType, &str); 27] = [
    (NodeType::UserDefined, "UserDefined"),
    (NodeType::Element_S32Selector, "Element_S32Selector"),
    (NodeType::Element_Sequential, "Element_Sequential"),
    (NodeType::Element_Simultaneous, "Element_Simultaneous"),
    (NodeType::Element_F32Selector, "Element_F32Selector"),
    (NodeType::Element_StringSelector, "Element_StringSelector"),
    (NodeType::Element_RandomSelector, "Element_RandomSelector"),
    (NodeType::Element_BoolSelector, "Element_BoolSelector"),
    (NodeType::Element_Fork, "Element_Fork"),
    (NodeType::Element_Join, "Element_Join"),
    (NodeType::Element_Alert, "Element_Alert"),
    (NodeType::Element_Expression, "Element_Expression"),
    (NodeType::Element_ModuleIF_Input_S32, "Element_ModuleIF_Input_S32"),
    (NodeType::Element_ModuleIF_Input_F32, "Element_ModuleIF_Input_F32"),
    (
        NodeType::Element_ModuleIF_Input_Vec3f,
        "Element_ModuleIF_Input_Vec3f",
    ),
    (
        NodeType::Element_ModuleIF_Input_String,
        "Element_ModuleIF_Input_String",
    ),
    (NodeType::Element_ModuleIF_Input_Bool, "Element_ModuleIF_Input_Bool"),
    (NodeType::Element_ModuleIF_Input_Ptr, "Element_ModuleIF_Input_Ptr"),
    (NodeType::Element_ModuleIF_Output_S32, "Element_ModuleIF_Output_S32"),
    (NodeType::Element_ModuleIF_Output_F32, "Element_ModuleIF_Output_F32"),
    (
        NodeType::Element_ModuleIF_Output_Vec3f,
        "Element_ModuleIF_Output_Vec3f",
    ),
    (
        NodeType::Element_ModuleIF_Output_String,
        "Element_ModuleIF_Output_String",
    ),
    (
        NodeType::Element_ModuleIF_Output_Bool,
        "Element_ModuleIF_Output_Bool",
    ),
    (NodeType::Element_ModuleIF_Output_Ptr, "Element_ModuleIF_Output_Ptr"),
    (NodeType::Element_ModuleIF_Child, "Element_ModuleIF_Child"),
    (NodeType::Element_StateEnd, "Element_StateEnd"),
    (NodeType::Element_SplitTiming, "Element_SplitTiming"),
];

impl NodeType {
    pub fn name(self) -> &'static str {
        NODE_TYPE_NAMES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, name)| *name)
            .unwrap()
    }

    pub fn from_name(name: &str) -> Option<Self> {
        NODE_TYPE_NAMES
            .iter()
            .find(|(_, candidate)| *candidate == name)
            .map(|(kind, _)| *kind)
    }
}

/// The ten per-node plug slots. Slots 1 and 6 through 9 are reserved and
/// observed empty; they still round-trip as empty lists.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
#[allow(non_camel_case_types)]
pub enum PlugType {
    Generic = 0,
    _01 = 1,
    Child = 2,
    Transition = 3,
    String = 4,
    Int = 5,
    _06 = 6,
    _07 = 7,
    _08 = 8,
    _09 = 9,
}

impl PlugType {
    pub const ALL: [PlugType; 10] = [
        PlugType::Generic,
        PlugType::_01,
        PlugType::Child,
        PlugType::Transition,
        PlugType::String,
        PlugType::Int,
        PlugType::_06,
        PlugType::_07,
        PlugType::_08,
        PlugType::_09,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PlugType::Generic => "Generic",
            PlugType::_01 => "_01",
            PlugType::Child => "Child",
            PlugType::Transition => "Transition",
            PlugType::String => "String",
            PlugType::Int => "Int",
            PlugType::_06 => "_06",
            PlugType::_07 => "_07",
            PlugType::_08 => "_08",
            PlugType::_09 => "_09",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        PlugType::ALL
            .iter()
            .find(|slot| slot.name() == name)
            .copied()
    }

    pub fn index(self) -> usize {
        u8::from(self) as usize
    }
}

/// Node flag byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeFlag(u8);

impl NodeFlag {
    pub fn from_raw(value: u8) -> Self {
        Self(value)
    }

    pub fn into_raw(&self) -> u8 {
        self.0
    }

    flag_to_function!(0 is_query "The node is a read-only query");
    flag_to_function!(1 is_module "The node calls an external module");
    flag_to_function!(2 is_root_node "The node is a command root");
    flag_to_function!(3 is_multi_param_type2 "The node uses the second multi-param layout");

    pub fn set_query(self, value: bool) -> Self {
        Self(self.0 & 0xfe | u8::from(value))
    }

    pub fn set_module(self, value: bool) -> Self {
        Self(self.0 & 0xfd | u8::from(value) << 1)
    }

    pub fn set_root_node(self, value: bool) -> Self {
        Self(self.0 & 0xfb | u8::from(value) << 2)
    }

    pub fn set_multi_param_type2(self, value: bool) -> Self {
        Self(self.0 & 0xf7 | u8::from(value) << 3)
    }

    fn flag_list(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.is_query() {
            out.push("Is Query");
        }
        if self.is_module() {
            out.push("Is Module");
        }
        if self.is_root_node() {
            out.push("Is Root Node");
        }
        if self.is_multi_param_type2() {
            out.push("Use MultiParam Type 2");
        }
        out
    }

    fn from_flag_list(data: &[Value]) -> Self {
        let mut flag = NodeFlag::default();
        for name in data.iter().filter_map(Value::as_str) {
            flag = match name {
                "Is Query" => flag.set_query(true),
                "Is Module" => flag.set_module(true),
                "Is Root Node" => flag.set_root_node(true),
                "Use MultiParam Type 2" => flag.set_multi_param_type2(true),
                _ => flag,
            };
        }
        flag
    }
}

/// Splatoon 3 specific per-node record identifying a desired game state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateInfo {
    pub desired_state: String,
    pub unk04: u32,
    pub unk08: u32,
    pub unk0c: u32,
    pub unk10: u32,
}

impl StateInfo {
    fn as_dict(&self) -> Value {
        json!({
            "Desired State": self.desired_state,
            "Unknown04": self.unk04,
            "Unknown08": self.unk08,
            "Unknown0C": self.unk0c,
            "Unknown10": self.unk10,
        })
    }

    fn from_dict(data: &Value) -> Result<Self> {
        Ok(Self {
            desired_state: dict::get_str(data, "Desired State")?,
            unk04: dict::get_u32(data, "Unknown04")?,
            unk08: dict::get_u32(data, "Unknown08")?,
            unk0c: dict::get_u32(data, "Unknown0C")?,
            unk10: dict::get_u32(data, "Unknown10")?,
        })
    }

    pub(crate) fn write(&self, writer: &mut AinbWriter) {
        writer.write_string(&self.desired_state);
        writer.write_u32(self.unk04);
        writer.write_u32(self.unk08);
        writer.write_u32(self.unk0c);
        writer.write_u32(self.unk10);
    }
}

/// A typed connection from a node to another node. The concrete payload is
/// selected by the plug slot and, for child plugs, the owning node's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Plug {
    Generic(GenericPlug),
    Child(ChildPlug),
    S32Selector(S32SelectorPlug),
    F32Selector(F32SelectorPlug),
    StringSelector(StringSelectorPlug),
    RandomSelector(RandomSelectorPlug),
    BsaSelectorUpdater(BsaSelectorUpdaterPlug),
    Transition(TransitionPlug),
    StringInput(StringInputPlug),
    IntInput(IntInputPlug),
}

impl Plug {
    /// Target node index of this plug.
    pub fn node_index(&self) -> i32 {
        match self {
            Plug::Generic(p) => p.node_index,
            Plug::Child(p) => p.node_index,
            Plug::S32Selector(p) => p.node_index,
            Plug::F32Selector(p) => p.node_index,
            Plug::StringSelector(p) => p.node_index,
            Plug::RandomSelector(p) => p.node_index,
            Plug::BsaSelectorUpdater(p) => p.node_index,
            Plug::Transition(p) => p.node_index,
            Plug::StringInput(p) => p.node_index,
            Plug::IntInput(p) => p.node_index,
        }
    }

    fn as_dict(&self, version: u32) -> Value {
        match self {
            Plug::Generic(p) => p.as_dict(),
            Plug::Child(p) => p.as_dict(),
            Plug::S32Selector(p) => p.as_dict(),
            Plug::F32Selector(p) => p.as_dict(),
            Plug::StringSelector(p) => p.as_dict(),
            Plug::RandomSelector(p) => p.as_dict(),
            Plug::BsaSelectorUpdater(p) => p.as_dict(),
            Plug::Transition(p) => p.as_dict(),
            Plug::StringInput(p) => p.as_dict(version),
            Plug::IntInput(p) => p.as_dict(version),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenericPlug {
    pub node_index: i32,
    pub name: String,
}

impl GenericPlug {
    fn read(reader: &mut AinbReader) -> Result<Self> {
        Ok(Self {
            node_index: reader.read_s32()?,
            name: reader.read_string_offset()?,
        })
    }

    fn write(&self, writer: &mut AinbWriter) {
        writer.write_s32(self.node_index);
        writer.write_string(&self.name);
    }

    fn as_dict(&self) -> Value {
        json!({
            "Node Index": self.node_index,
            "Name": self.name,
        })
    }

    fn from_dict(data: &Value) -> Result<Self> {
        Ok(Self {
            node_index: dict::get_i32(data, "Node Index")?,
            name: dict::get_str(data, "Name")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildPlug {
    pub node_index: i32,
    pub name: String,
}

impl ChildPlug {
    fn read(reader: &mut AinbReader) -> Result<Self> {
        Ok(Self {
            node_index: reader.read_s32()?,
            name: reader.read_string_offset()?,
        })
    }

    fn write(&self, writer: &mut AinbWriter) {
        writer.write_s32(self.node_index);
        writer.write_string(&self.name);
    }

    fn as_dict(&self) -> Value {
        json!({
            "Node Index": self.node_index,
            "Name": self.name,
        })
    }

    fn from_dict(data: &Value) -> Result<Self> {
        Ok(Self {
            node_index: dict::get_i32(data, "Node Index")?,
            name: dict::get_str(data, "Name")?,
        })
    }
}

/// Reads the `(index, flag)` pair that may redirect a selector condition
/// to a blackboard entry. Returns the blackboard index or -1.
fn read_blackboard_index(reader: &mut AinbReader) -> Result<i16> {
    let index = reader.read_s16()?;
    let flag = reader.read_u16()?;
    if flag >> 0xf != 0 {
        Ok(index)
    } else {
        Ok(-1)
    }
}

fn write_blackboard_index(writer: &mut AinbWriter, index: i16) {
    if index >= 0 {
        writer.write_s16(index);
        writer.write_u16(0x8000);
    } else {
        writer.write_s16(0);
        writer.write_u16(0);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct S32SelectorPlug {
    pub node_index: i32,
    pub name: String,
    pub condition: i32,
    /// Whether this is the default condition for the selector.
    pub is_default: bool,
    pub blackboard_index: i16,
}

impl Default for S32SelectorPlug {
    fn default() -> Self {
        Self {
            node_index: NULL_INDEX,
            name: String::new(),
            condition: 0,
            is_default: false,
            blackboard_index: -1,
        }
    }
}

impl S32SelectorPlug {
    fn read(reader: &mut AinbReader, is_last: bool) -> Result<Self> {
        let mut plug = Self {
            node_index: reader.read_s32()?,
            name: reader.read_string_offset()?,
            ..Self::default()
        };
        plug.blackboard_index = read_blackboard_index(reader)?;
        if is_last {
            plug.is_default = true;
            let position = reader.tell();
            let value = reader.read_s32()?;
            if value != 0 {
                return Err(AinbError::InvalidDefaultCase {
                    message: format!(
                        "S32 selector expected empty padding for default \
                         case, got {value}"
                    ),
                    position,
                }
                .into());
            }
        } else {
            plug.condition = reader.read_s32()?;
        }
        Ok(plug)
    }

    fn write(&self, writer: &mut AinbWriter) {
        writer.write_s32(self.node_index);
        writer.write_string(&self.name);
        write_blackboard_index(writer, self.blackboard_index);
        if self.is_default {
            writer.write_s32(0);
        } else {
            writer.write_s32(self.condition);
        }
    }

    fn as_dict(&self) -> Value {
        if self.is_default {
            json!({
                "Node Index": self.node_index,
                "Name": self.name,
                "Is Default": self.is_default,
            })
        } else {
            json!({
                "Node Index": self.node_index,
                "Name": self.name,
                "Condition": self.condition,
            })
        }
    }

    fn from_dict(data: &Value) -> Result<Self> {
        let mut plug = Self {
            node_index: dict::get_i32(data, "Node Index")?,
            name: dict::get_str(data, "Name")?,
            ..Self::default()
        };
        if data.get("Condition").is_some() {
            plug.condition = dict::get_i32(data, "Condition")?;
        } else {
            plug.is_default = dict::get_bool(data, "Is Default")?;
        }
        Ok(plug)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct F32SelectorPlug {
    pub node_index: i32,
    pub name: String,
    pub condition_min: f32,
    pub blackboard_index_min: i16,
    pub condition_max: f32,
    pub blackboard_index_max: i16,
    /// Whether this is the default condition for the selector.
    pub is_default: bool,
}

impl Default for F32SelectorPlug {
    fn default() -> Self {
        Self {
            node_index: NULL_INDEX,
            name: String::new(),
            condition_min: 0.0,
            blackboard_index_min: -1,
            condition_max: 0.0,
            blackboard_index_max: -1,
            is_default: false,
        }
    }
}

impl F32SelectorPlug {
    fn read(reader: &mut AinbReader, is_last: bool) -> Result<Self> {
        let mut plug = Self {
            node_index: reader.read_s32()?,
            name: reader.read_string_offset()?,
            ..Self::default()
        };
        if is_last {
            plug.is_default = true;
            let position = reader.tell();
            let sentinel = reader.read_string_offset()?;
            if sentinel != DEFAULT_CASE_STRING {
                return Err(AinbError::InvalidDefaultCase {
                    message: format!(
                        "F32 selector expected {DEFAULT_CASE_STRING:?} as \
                         default case string, got {sentinel:?}"
                    ),
                    position,
                }
                .into());
            }
        } else {
            plug.blackboard_index_min = read_blackboard_index(reader)?;
            let min = reader.read_f32()?;
            if plug.blackboard_index_min < 0 {
                plug.condition_min = min;
            }
            plug.blackboard_index_max = read_blackboard_index(reader)?;
            let max = reader.read_f32()?;
            if plug.blackboard_index_max < 0 {
                plug.condition_max = max;
            }
        }
        Ok(plug)
    }

    fn write(&self, writer: &mut AinbWriter) {
        writer.write_s32(self.node_index);
        writer.write_string(&self.name);
        if self.is_default {
            writer.write_string(DEFAULT_CASE_STRING);
        } else {
            write_blackboard_index(writer, self.blackboard_index_min);
            writer.write_f32(self.condition_min);
            write_blackboard_index(writer, self.blackboard_index_max);
            writer.write_f32(self.condition_max);
        }
    }

    fn format_condition(
        out: &mut Map<String, Value>,
        condition: f32,
        blackboard_index: i16,
        is_min: bool,
    ) {
        let (value_key, index_key) = if is_min {
            ("Condition Min", "Condition Min Blackboard Index")
        } else {
            ("Condition Max", "Condition Max Blackboard Index")
        };
        if blackboard_index == -1 {
            out.insert(value_key.to_owned(), json!(condition));
        } else {
            out.insert(index_key.to_owned(), json!(blackboard_index));
        }
    }

    fn as_dict(&self) -> Value {
        if self.is_default {
            json!({
                "Node Index": self.node_index,
                "Name": self.name,
                "Is Default": self.is_default,
            })
        } else {
            let mut out = Map::new();
            out.insert("Node Index".to_owned(), json!(self.node_index));
            out.insert("Name".to_owned(), json!(self.name));
            Self::format_condition(
                &mut out,
                self.condition_min,
                self.blackboard_index_min,
                true,
            );
            Self::format_condition(
                &mut out,
                self.condition_max,
                self.blackboard_index_max,
                false,
            );
            Value::Object(out)
        }
    }

    fn from_dict(data: &Value) -> Result<Self> {
        let mut plug = Self {
            node_index: dict::get_i32(data, "Node Index")?,
            name: dict::get_str(data, "Name")?,
            ..Self::default()
        };
        if data.get("Is Default").is_some() {
            plug.is_default = dict::get_bool(data, "Is Default")?;
        } else {
            if data.get("Condition Min").is_some() {
                plug.condition_min = dict::get_f32(data, "Condition Min")?;
            } else {
                plug.blackboard_index_min =
                    dict::get_i16(data, "Condition Min Blackboard Index")?;
            }
            if data.get("Condition Max").is_some() {
                plug.condition_max = dict::get_f32(data, "Condition Max")?;
            } else {
                plug.blackboard_index_max =
                    dict::get_i16(data, "Condition Max Blackboard Index")?;
            }
        }
        Ok(plug)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringSelectorPlug {
    pub node_index: i32,
    pub name: String,
    pub condition: String,
    /// Whether this is the default condition for the selector.
    pub is_default: bool,
    pub blackboard_index: i16,
}

impl Default for StringSelectorPlug {
    fn default() -> Self {
        Self {
            node_index: NULL_INDEX,
            name: String::new(),
            condition: String::new(),
            is_default: false,
            blackboard_index: -1,
        }
    }
}

impl StringSelectorPlug {
    fn read(reader: &mut AinbReader, is_last: bool) -> Result<Self> {
        let mut plug = Self {
            node_index: reader.read_s32()?,
            name: reader.read_string_offset()?,
            ..Self::default()
        };
        plug.blackboard_index = read_blackboard_index(reader)?;
        if is_last {
            plug.is_default = true;
            let position = reader.tell();
            let sentinel = reader.read_string_offset()?;
            if sentinel != DEFAULT_CASE_STRING {
                return Err(AinbError::InvalidDefaultCase {
                    message: format!(
                        "String selector expected {DEFAULT_CASE_STRING:?} \
                         as default case string, got {sentinel:?}"
                    ),
                    position,
                }
                .into());
            }
        } else {
            plug.condition = reader.read_string_offset()?;
        }
        Ok(plug)
    }

    fn write(&self, writer: &mut AinbWriter) {
        writer.write_s32(self.node_index);
        writer.write_string(&self.name);
        write_blackboard_index(writer, self.blackboard_index);
        if self.is_default {
            writer.write_string(DEFAULT_CASE_STRING);
        } else {
            writer.write_string(&self.condition);
        }
    }

    fn as_dict(&self) -> Value {
        if self.is_default {
            json!({
                "Node Index": self.node_index,
                "Name": self.name,
                "Is Default": self.is_default,
            })
        } else {
            json!({
                "Node Index": self.node_index,
                "Name": self.name,
                "Condition": self.condition,
            })
        }
    }

    fn from_dict(data: &Value) -> Result<Self> {
        let mut plug = Self {
            node_index: dict::get_i32(data, "Node Index")?,
            name: dict::get_str(data, "Name")?,
            ..Self::default()
        };
        if data.get("Condition").is_some() {
            plug.condition = dict::get_str(data, "Condition")?;
        } else {
            plug.is_default = dict::get_bool(data, "Is Default")?;
        }
        Ok(plug)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RandomSelectorPlug {
    pub node_index: i32,
    pub name: String,
    pub weight: f32,
}

impl RandomSelectorPlug {
    fn read(reader: &mut AinbReader) -> Result<Self> {
        Ok(Self {
            node_index: reader.read_s32()?,
            name: reader.read_string_offset()?,
            weight: reader.read_f32()?,
        })
    }

    fn write(&self, writer: &mut AinbWriter) {
        writer.write_s32(self.node_index);
        writer.write_string(&self.name);
        writer.write_f32(self.weight);
    }

    fn as_dict(&self) -> Value {
        json!({
            "Node Index": self.node_index,
            "Name": self.name,
            "Weight": self.weight,
        })
    }

    fn from_dict(data: &Value) -> Result<Self> {
        Ok(Self {
            node_index: dict::get_i32(data, "Node Index")?,
            name: dict::get_str(data, "Name")?,
            weight: dict::get_f32(data, "Weight")?,
        })
    }
}

/// Child plug of the BSA selector-updater nodes, carrying two words whose
/// meaning is unknown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BsaSelectorUpdaterPlug {
    pub node_index: i32,
    pub name: String,
    pub unk0: u32,
    pub unk1: u32,
}

impl BsaSelectorUpdaterPlug {
    fn read(reader: &mut AinbReader) -> Result<Self> {
        Ok(Self {
            node_index: reader.read_s32()?,
            name: reader.read_string_offset()?,
            unk0: reader.read_u32()?,
            unk1: reader.read_u32()?,
        })
    }

    fn write(&self, writer: &mut AinbWriter) {
        writer.write_s32(self.node_index);
        writer.write_string(&self.name);
        writer.write_u32(self.unk0);
        writer.write_u32(self.unk1);
    }

    fn as_dict(&self) -> Value {
        json!({
            "Node Index": self.node_index,
            "Name": self.name,
            "Unknown0": self.unk0,
            "Unknown1": self.unk1,
        })
    }

    fn from_dict(data: &Value) -> Result<Self> {
        Ok(Self {
            node_index: dict::get_i32(data, "Node Index")?,
            name: dict::get_str(data, "Name")?,
            unk0: dict::get_u32(data, "Unknown0")?,
            unk1: dict::get_u32(data, "Unknown1")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionPlug {
    pub node_index: i32,
    pub transition: Transition,
}

impl TransitionPlug {
    fn read(
        reader: &mut AinbReader,
        transitions: &[Transition],
    ) -> Result<Self> {
        let node_index = reader.read_s32()?;
        let index = reader.read_u32()? as usize;
        let transition = transitions.get(index).cloned().ok_or(
            AinbError::InvalidReference {
                what: "transition",
                index,
                len: transitions.len(),
            },
        )?;
        Ok(Self {
            node_index,
            transition,
        })
    }

    fn write(&self, writer: &mut AinbWriter, transition_index: u32) {
        writer.write_s32(self.node_index);
        writer.write_u32(transition_index);
    }

    fn as_dict(&self) -> Value {
        if self.transition.transition_type == 0 {
            json!({
                "Node Index": self.node_index,
                "Transition Type": self.transition.transition_type,
                "Update Post Calc": self.transition.update_post_calc,
                "Transition Name": self.transition.command_name,
            })
        } else {
            json!({
                "Node Index": self.node_index,
                "Transition Type": self.transition.transition_type,
                "Update Post Calc": self.transition.update_post_calc,
            })
        }
    }

    fn from_dict(data: &Value) -> Result<Self> {
        let mut transition = Transition {
            transition_type: dict::get_u16(data, "Transition Type")? as u8,
            update_post_calc: dict::get_bool(data, "Update Post Calc")?,
            command_name: String::new(),
        };
        if data.get("Transition Name").is_some() {
            transition.command_name = dict::get_str(data, "Transition Name")?;
        }
        Ok(Self {
            node_index: dict::get_i32(data, "Node Index")?,
            transition,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringInputPlug {
    pub node_index: i32,
    pub name: String,
    pub unknown: u32,
    pub default_value: String,
}

impl StringInputPlug {
    fn read(reader: &mut AinbReader) -> Result<Self> {
        let mut plug = Self {
            node_index: reader.read_s32()?,
            name: reader.read_string_offset()?,
            ..Self::default()
        };
        if reader.version > 0x404 {
            plug.unknown = reader.read_u32()?;
            plug.default_value = reader.read_string_offset()?;
        }
        Ok(plug)
    }

    fn write(&self, writer: &mut AinbWriter) {
        writer.write_s32(self.node_index);
        writer.write_string(&self.name);
        if writer.version > 0x404 {
            writer.write_u32(self.unknown);
            writer.write_string(&self.default_value);
        }
    }

    fn as_dict(&self, version: u32) -> Value {
        if version > 0x404 {
            json!({
                "Node Index": self.node_index,
                "Name": self.name,
                "Unknown": self.unknown,
                "Default Value": self.default_value,
            })
        } else {
            json!({
                "Node Index": self.node_index,
                "Name": self.name,
            })
        }
    }

    fn from_dict(data: &Value) -> Result<Self> {
        let mut plug = Self {
            node_index: dict::get_i32(data, "Node Index")?,
            name: dict::get_str(data, "Name")?,
            ..Self::default()
        };
        if data.get("Unknown").is_some() {
            plug.unknown = dict::get_u32(data, "Unknown")?;
            plug.default_value = dict::get_str(data, "Default Value")?;
        }
        Ok(plug)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntInputPlug {
    pub node_index: i32,
    pub name: String,
    pub unknown: u32,
    pub default_value: i32,
}

impl IntInputPlug {
    fn read(reader: &mut AinbReader) -> Result<Self> {
        let mut plug = Self {
            node_index: reader.read_s32()?,
            name: reader.read_string_offset()?,
            ..Self::default()
        };
        if reader.version > 0x404 {
            plug.unknown = reader.read_u32()?;
            plug.default_value = reader.read_s32()?;
        }
        Ok(plug)
    }

    fn write(&self, writer: &mut AinbWriter) {
        writer.write_s32(self.node_index);
        writer.write_string(&self.name);
        if writer.version > 0x404 {
            writer.write_u32(self.unknown);
            writer.write_s32(self.default_value);
        }
    }

    fn as_dict(&self, version: u32) -> Value {
        if version > 0x404 {
            json!({
                "Node Index": self.node_index,
                "Name": self.name,
                "Unknown": self.unknown,
                "Default Value": self.default_value,
            })
        } else {
            json!({
                "Node Index": self.node_index,
                "Name": self.name,
            })
        }
    }

    fn from_dict(data: &Value) -> Result<Self> {
        let mut plug = Self {
            node_index: dict::get_i32(data, "Node Index")?,
            name: dict::get_str(data, "Name")?,
            ..Self::default()
        };
        if data.get("Unknown").is_some() {
            plug.unknown = dict::get_u32(data, "Unknown")?;
            plug.default_value = dict::get_i32(data, "Default Value")?;
        }
        Ok(plug)
    }
}

/// Context tables a node record slices into. All of them are file-level
/// tables decoded before the node section.
pub(crate) struct NodeDecodeContext<'a> {
    pub attachments: &'a [Attachment],
    pub attachment_indices: &'a [u32],
    pub properties: &'a PropertySet,
    pub io_params: &'a ParamSet,
    pub transitions: &'a [Transition],
    pub queries: &'a [u16],
    pub actions: &'a HashMap<i32, Vec<Action>>,
    pub module_paths: &'a [String],
}

/// Patches left dangling by a node record, resolved once the node's
/// parameter block (and, in v0x404, state-info record) is laid out.
pub(crate) struct NodeRecordPatches {
    pub param_block: Patch,
    pub state_info: Option<Patch>,
}

/// Derived counters written into a node record.
pub(crate) struct NodeRecordCounters {
    pub expression_count: u16,
    pub expression_io_size: u16,
    pub multi_param_count: u16,
    pub base_attachment_index: u32,
    pub base_query_index: u16,
}

/// A single AI node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub kind: NodeType,
    pub index: i16,
    pub flags: NodeFlag,
    /// Canonical node indices of this node's queries (resolved from the
    /// query registry in a post-pass).
    pub queries: Vec<u16>,
    pub attachments: Vec<Attachment>,
    pub properties: PropertySet,
    pub params: ParamSet,
    pub actions: Vec<Action>,
    pub guid: Guid,
    pub state_info: Option<StateInfo>,
    plugs: [Vec<Plug>; 10],
}

impl Node {
    pub fn new(kind: NodeType) -> Self {
        Self {
            name: String::new(),
            kind,
            index: -1,
            flags: NodeFlag::default(),
            queries: Vec::new(),
            attachments: Vec::new(),
            properties: PropertySet::default(),
            params: ParamSet::default(),
            actions: Vec::new(),
            guid: Guid::default(),
            state_info: None,
            plugs: Default::default(),
        }
    }

    pub fn plugs(&self, plug_type: PlugType) -> &[Plug] {
        &self.plugs[plug_type.index()]
    }

    pub fn plugs_mut(&mut self, plug_type: PlugType) -> &mut Vec<Plug> {
        &mut self.plugs[plug_type.index()]
    }

    /// Generic plugs used for inputs (bool/float) and outputs.
    pub fn generic_plugs(&self) -> &[Plug] {
        self.plugs(PlugType::Generic)
    }

    /// Plugs used for control flow.
    pub fn child_plugs(&self) -> &[Plug] {
        self.plugs(PlugType::Child)
    }

    pub fn transition_plugs(&self) -> &[Plug] {
        self.plugs(PlugType::Transition)
    }

    pub fn string_plugs(&self) -> &[Plug] {
        self.plugs(PlugType::String)
    }

    pub fn int_plugs(&self) -> &[Plug] {
        self.plugs(PlugType::Int)
    }

    pub fn has_inputs(&self) -> bool {
        self.params.has_inputs()
    }

    pub fn has_outputs(&self) -> bool {
        self.params.has_outputs()
    }

    pub(crate) fn read(
        reader: &mut AinbReader,
        ctx: &NodeDecodeContext,
        index: usize,
    ) -> Result<Self> {
        let position = reader.tell();
        let kind_raw = reader.read_u16()?;
        let kind = NodeType::try_from(kind_raw).map_err(|_| {
            AinbError::InvalidEnumValue {
                what: "node type",
                value: kind_raw.into(),
                position,
            }
        })?;
        let mut node = Node::new(kind);
        node.index = reader.read_s16()?;
        if node.index != index as i16 {
            reader.warn(
                WarningKind::InconsistentNodeIndex,
                format!(
                    "Node claims it is index {} when it is index {index}",
                    node.index
                ),
            );
        }
        let attachment_count = reader.read_u16()? as usize;
        node.flags = NodeFlag::from_raw(reader.read_u8()?);
        let _padding = reader.read_u8()?;
        node.name = reader.read_string_offset()?;
        if node.flags.is_module() {
            let module_name = format!("{}.ainb", node.name);
            if !ctx.module_paths.iter().any(|path| *path == module_name) {
                reader.warn(
                    WarningKind::MissingModule,
                    format!(
                        "Node {} is a module ({}) but corresponding module \
                         does not exist in file",
                        node.index, node.name
                    ),
                );
            }
        }
        if reader.version >= 0x407 {
            // murmur3 hash of the node name
            let _name_hash = reader.read_u32()?;
        }
        let _unk1 = reader.read_u32()?;
        let node_param_offset = reader.read_u32()? as usize;
        // number of expressions used by this node
        let _expression_count = reader.read_u16()?;
        // size of the input/output memory reserved for expressions
        let _expression_io_size = reader.read_u16()?;
        // number of multi-params used by this node
        let _multi_param_count = reader.read_u16()?;
        let _padding = reader.read_u16()?;
        let base_attachment_index = reader.read_u32()? as usize;
        let base_query_index = reader.read_u16()? as usize;
        let query_count = reader.read_u16()? as usize;
        let state_info_offset = reader.read_u32()? as usize;
        if reader.version < 0x407 {
            node.state_info =
                Some(reader.temp_seek(state_info_offset, |r| {
                    Ok(StateInfo {
                        desired_state: r.read_string_offset()?,
                        unk04: r.read_u32()?,
                        unk08: r.read_u32()?,
                        unk0c: r.read_u32()?,
                        unk10: r.read_u32()?,
                    })
                })?);
        } else if state_info_offset != 0 {
            reader.warn(
                WarningKind::UnexpectedStateInfo,
                format!(
                    "Non-zero state info offset in file version that does \
                     not support node state info: {state_info_offset}"
                ),
            );
        }
        node.guid = reader.read_guid()?;

        // stored as indices into the query registry, converted to
        // canonical node indices in a post-pass
        node.queries = ctx
            .queries
            .get(base_query_index..base_query_index + query_count)
            .map(<[u16]>::to_vec)
            .ok_or(AinbError::InvalidReference {
                what: "query",
                index: base_query_index + query_count,
                len: ctx.queries.len(),
            })?;
        let indices = ctx
            .attachment_indices
            .get(
                base_attachment_index..base_attachment_index + attachment_count,
            )
            .ok_or(AinbError::InvalidReference {
                what: "attachment index",
                index: base_attachment_index + attachment_count,
                len: ctx.attachment_indices.len(),
            })?;
        for i in indices {
            node.attachments.push(
                ctx.attachments
                    .get(*i as usize)
                    .cloned()
                    .ok_or(AinbError::InvalidReference {
                        what: "attachment",
                        index: *i as usize,
                        len: ctx.attachments.len(),
                    })?,
            );
        }

        node.read_param_block(reader, ctx, node_param_offset)?;

        node.actions = ctx
            .actions
            .get(&i32::from(node.index))
            .cloned()
            .unwrap_or_default();

        Ok(node)
    }

    fn read_param_block(
        &mut self,
        reader: &mut AinbReader,
        ctx: &NodeDecodeContext,
        offset: usize,
    ) -> Result<()> {
        let mut properties = PropertySet::default();
        let mut params = ParamSet::default();
        let mut plugs: [Vec<Plug>; 10] = Default::default();
        let kind = self.kind;
        let name = self.name.clone();
        reader.temp_seek(offset, |r| {
            for param_type in ParamType::ALL {
                let base = r.read_u32()? as usize;
                let count = r.read_u32()? as usize;
                for property in
                    ctx.properties.slice(param_type, base, count)?
                {
                    properties.push(property);
                }
            }
            for param_type in ParamType::ALL {
                let base = r.read_u32()? as usize;
                let count = r.read_u32()? as usize;
                for input in ctx.io_params.input_slice(param_type, base, count)?
                {
                    params.push_input(input);
                }
                let base = r.read_u32()? as usize;
                let count = r.read_u32()? as usize;
                for output in
                    ctx.io_params.output_slice(param_type, base, count)?
                {
                    params.push_output(output);
                }
            }

            let plug_info: Vec<(u8, u8)> = (0..PlugType::ALL.len())
                .map(|_| Ok((r.read_u8()?, r.read_u8()?)))
                .collect::<Result<_>>()?;
            let base_offset = r.tell();
            for plug_type in PlugType::ALL {
                let (count, base) = plug_info[plug_type.index()];
                let offsets = r.temp_seek(
                    base_offset + base as usize * 4,
                    |r| -> Result<Vec<u32>> {
                        (0..count).map(|_| r.read_u32()).collect()
                    },
                )?;
                for (i, plug_offset) in offsets.iter().enumerate() {
                    r.seek(*plug_offset as usize)?;
                    plugs[plug_type.index()].push(Self::read_plug(
                        r,
                        plug_type,
                        kind,
                        &name,
                        i == offsets.len() - 1,
                        ctx.transitions,
                    )?);
                }
            }
            Ok(())
        })?;
        self.properties = properties;
        self.params = params;
        self.plugs = plugs;
        Ok(())
    }

    fn read_plug(
        reader: &mut AinbReader,
        plug_type: PlugType,
        kind: NodeType,
        name: &str,
        is_last: bool,
        transitions: &[Transition],
    ) -> Result<Plug> {
        match plug_type {
            PlugType::Generic => {
                GenericPlug::read(reader).map(Plug::Generic)
            }
            PlugType::Child => match kind {
                NodeType::Element_S32Selector => {
                    S32SelectorPlug::read(reader, is_last)
                        .map(Plug::S32Selector)
                }
                NodeType::Element_F32Selector => {
                    F32SelectorPlug::read(reader, is_last)
                        .map(Plug::F32Selector)
                }
                NodeType::Element_StringSelector => {
                    StringSelectorPlug::read(reader, is_last)
                        .map(Plug::StringSelector)
                }
                NodeType::Element_RandomSelector => {
                    RandomSelectorPlug::read(reader)
                        .map(Plug::RandomSelector)
                }
                _ if name == "SelectorBSABrainVerbUpdater"
                    || name == "SelectorBSAFormChangeUpdater" =>
                {
                    BsaSelectorUpdaterPlug::read(reader)
                        .map(Plug::BsaSelectorUpdater)
                }
                _ => ChildPlug::read(reader).map(Plug::Child),
            },
            PlugType::Transition => {
                TransitionPlug::read(reader, transitions)
                    .map(Plug::Transition)
            }
            PlugType::String => {
                StringInputPlug::read(reader).map(Plug::StringInput)
            }
            PlugType::Int => IntInputPlug::read(reader).map(Plug::IntInput),
            _ => Err(AinbError::InvalidEnumValue {
                what: "plug slot",
                value: plug_type.index() as i64,
                position: reader.tell(),
            }
            .into()),
        }
    }

    /// Writes the fixed-size node record. The parameter-block offset (and
    /// the state-info offset in v0x404) are left for later patching.
    pub(crate) fn write_record(
        &self,
        writer: &mut AinbWriter,
        counters: &NodeRecordCounters,
    ) -> NodeRecordPatches {
        writer.write_u16(self.kind.into());
        writer.write_s16(self.index);
        writer.write_u16(self.attachments.len() as u16);
        writer.write_u8(self.flags.into_raw());
        writer.write_u8(0);
        writer.write_string(&self.name);
        if writer.version >= 0x407 {
            writer.write_u32(murmur3_32(self.name.as_bytes(), 0));
        }
        writer.write_u32(0);
        let param_block = writer.placeholder_u32();
        writer.write_u16(counters.expression_count);
        writer.write_u16(counters.expression_io_size);
        writer.write_u16(counters.multi_param_count);
        writer.write_u16(0);
        writer.write_u32(counters.base_attachment_index);
        writer.write_u16(counters.base_query_index);
        writer.write_u16(self.queries.len() as u16);
        let state_info = if writer.version < 0x407 {
            Some(writer.placeholder_u32())
        } else {
            writer.write_u32(0);
            None
        };
        writer.write_guid(self.guid);
        NodeRecordPatches {
            param_block,
            state_info,
        }
    }

    /// Writes the node parameter block: property and I/O slices into the
    /// global tables, then the plug block.
    pub(crate) fn write_param_block(
        &self,
        writer: &mut AinbWriter,
        prop_slices: &[(u32, u32); 6],
        input_slices: &[(u32, u32); 6],
        output_slices: &[(u32, u32); 6],
        next_transition_index: &mut u32,
    ) {
        for (base, count) in prop_slices {
            writer.write_u32(*base);
            writer.write_u32(*count);
        }
        for param_type in ParamType::ALL {
            let (base, count) = input_slices[param_type.index()];
            writer.write_u32(base);
            writer.write_u32(count);
            let (base, count) = output_slices[param_type.index()];
            writer.write_u32(base);
            writer.write_u32(count);
        }

        let mut base = 0u8;
        for plug_type in PlugType::ALL {
            let count = self.plugs(plug_type).len() as u8;
            writer.write_u8(count);
            writer.write_u8(base);
            base += count;
        }
        let offset_patches: Vec<Patch> = (0..base)
            .map(|_| writer.placeholder_u32())
            .collect();
        let mut next = 0;
        for plug_type in PlugType::ALL {
            for plug in self.plugs(plug_type) {
                let patch = offset_patches[next];
                next += 1;
                writer.patch_here(patch);
                match plug {
                    Plug::Generic(p) => p.write(writer),
                    Plug::Child(p) => p.write(writer),
                    Plug::S32Selector(p) => p.write(writer),
                    Plug::F32Selector(p) => p.write(writer),
                    Plug::StringSelector(p) => p.write(writer),
                    Plug::RandomSelector(p) => p.write(writer),
                    Plug::BsaSelectorUpdater(p) => p.write(writer),
                    Plug::Transition(p) => {
                        p.write(writer, *next_transition_index);
                        *next_transition_index += 1;
                    }
                    Plug::StringInput(p) => p.write(writer),
                    Plug::IntInput(p) => p.write(writer),
                }
            }
        }
    }

    pub(crate) fn as_dict(&self, version: u32) -> Value {
        let mut out = Map::new();
        out.insert("Node Type".to_owned(), json!(self.kind.name()));
        out.insert("Node Index".to_owned(), json!(self.index));
        out.insert("Name".to_owned(), json!(self.name));
        out.insert("GUID".to_owned(), json!(self.guid.to_string()));
        out.insert("Flags".to_owned(), json!(self.flags.flag_list()));
        out.insert("Queries".to_owned(), json!(self.queries));
        let attachments: Vec<Value> =
            self.attachments.iter().map(Attachment::as_dict).collect();
        out.insert("Attachments".to_owned(), json!(attachments));
        out.insert("Properties".to_owned(), self.properties.as_dict());
        out.insert("Parameters".to_owned(), self.params.as_dict());
        let actions: Vec<Value> =
            self.actions.iter().map(Action::as_dict).collect();
        out.insert("XLink Actions".to_owned(), json!(actions));
        if let Some(state_info) = &self.state_info {
            out.insert("State Info".to_owned(), state_info.as_dict());
        }
        let mut plugs = Map::new();
        for plug_type in PlugType::ALL {
            let slot = self.plugs(plug_type);
            if slot.is_empty() {
                continue;
            }
            let entries: Vec<Value> =
                slot.iter().map(|plug| plug.as_dict(version)).collect();
            plugs.insert(plug_type.name().to_owned(), json!(entries));
        }
        out.insert("Plugs".to_owned(), Value::Object(plugs));
        Value::Object(out)
    }

    fn plug_from_dict(
        &self,
        data: &Value,
        plug_type: PlugType,
    ) -> Result<Plug> {
        match plug_type {
            PlugType::Generic => {
                GenericPlug::from_dict(data).map(Plug::Generic)
            }
            PlugType::Child => match self.kind {
                NodeType::Element_S32Selector => {
                    S32SelectorPlug::from_dict(data).map(Plug::S32Selector)
                }
                NodeType::Element_F32Selector => {
                    F32SelectorPlug::from_dict(data).map(Plug::F32Selector)
                }
                NodeType::Element_StringSelector => {
                    StringSelectorPlug::from_dict(data)
                        .map(Plug::StringSelector)
                }
                NodeType::Element_RandomSelector => {
                    RandomSelectorPlug::from_dict(data)
                        .map(Plug::RandomSelector)
                }
                _ if self.name == "SelectorBSABrainVerbUpdater"
                    || self.name == "SelectorBSAFormChangeUpdater" =>
                {
                    BsaSelectorUpdaterPlug::from_dict(data)
                        .map(Plug::BsaSelectorUpdater)
                }
                _ => ChildPlug::from_dict(data).map(Plug::Child),
            },
            PlugType::Transition => {
                TransitionPlug::from_dict(data).map(Plug::Transition)
            }
            PlugType::String => {
                StringInputPlug::from_dict(data).map(Plug::StringInput)
            }
            PlugType::Int => {
                IntInputPlug::from_dict(data).map(Plug::IntInput)
            }
            _ => Err(AinbError::DictDecode(format!(
                "Unsupported plug type: {}",
                plug_type.name()
            ))
            .into()),
        }
    }

    pub(crate) fn from_dict(data: &Value, index: usize) -> Result<Self> {
        let kind_name = dict::get_str(data, "Node Type")?;
        let kind = NodeType::from_name(&kind_name).ok_or_else(|| {
            AinbError::DictDecode(format!("Unknown node type: {kind_name:?}"))
        })?;
        let mut node = Node::new(kind);
        node.index = dict::get_i16(data, "Node Index")?;
        if node.index != index as i16 {
            return Err(AinbError::DictDecode(format!(
                "Node index {index} claims it has index {}",
                node.index
            ))
            .into());
        }
        node.name = dict::get_str(data, "Name")?;
        node.guid = Guid::parse(&dict::get_str(data, "GUID")?)?;
        node.flags = NodeFlag::from_flag_list(dict::get_array(data, "Flags")?);
        node.queries = dict::get_array(data, "Queries")?
            .iter()
            .map(|v| {
                v.as_u64()
                    .and_then(|v| u16::try_from(v).ok())
                    .ok_or_else(|| {
                        AinbError::DictDecode(
                            "Query entry is not a node index".to_owned(),
                        )
                        .into()
                    })
            })
            .collect::<Result<_>>()?;
        node.attachments = dict::get_array(data, "Attachments")?
            .iter()
            .map(Attachment::from_dict)
            .collect::<Result<_>>()?;
        node.properties =
            PropertySet::from_dict(dict::get(data, "Properties")?)?;
        node.params = ParamSet::from_dict(dict::get(data, "Parameters")?)?;
        node.actions = dict::get_array(data, "XLink Actions")?
            .iter()
            .map(Action::from_dict)
            .collect::<Result<_>>()?;
        let plugs = dict::get(data, "Plugs")?;
        for plug_type in PlugType::ALL {
            let Some(entries) = plugs.get(plug_type.name()) else {
                continue;
            };
            node.plugs[plug_type.index()] = dict::as_array(entries)?
                .iter()
                .map(|entry| node.plug_from_dict(entry, plug_type))
                .collect::<Result<_>>()?;
        }
        if let Some(state_info) = data.get("State Info") {
            node.state_info = Some(StateInfo::from_dict(state_info)?);
        }
        Ok(node)
    }
}
