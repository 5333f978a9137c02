use anyhow::Result;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::AinbError;
use crate::stream::{AinbReader, AinbWriter};

/// Instruction opcode. One instruction is always 8 bytes; the opcode
/// selects how the remaining 7 are interpreted and formatted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum InstType {
    /// Terminates a command.
    END = 1,
    /// Stores RHS into LHS.
    STR = 2,
    NEG = 3,
    NOT = 4,
    ADD = 5,
    SUB = 6,
    MUL = 7,
    DIV = 8,
    MOD = 9,
    INC = 10,
    DEC = 11,
    /// Vector by scalar multiplication.
    VMS = 12,
    /// Vector by scalar division.
    VDS = 13,
    LSH = 14,
    RSH = 15,
    LST = 16,
    LTE = 17,
    GRT = 18,
    GTE = 19,
    EQL = 20,
    NEQ = 21,
    AND = 22,
    XOR = 23,
    ORR = 24,
    LAN = 25,
    LOR = 26,
    /// Calls a function from the signature table.
    CFN = 27,
    /// Jumps when LHS is zero.
    JZE = 28,
    JMP = 29,
}

impl InstType {
    pub fn mnemonic(self) -> &'static str {
        match self {
            InstType::END => "end",
            InstType::STR => "str",
            InstType::NEG => "neg",
            InstType::NOT => "not",
            InstType::ADD => "add",
            InstType::SUB => "sub",
            InstType::MUL => "mul",
            InstType::DIV => "div",
            InstType::MOD => "mod",
            InstType::INC => "inc",
            InstType::DEC => "dec",
            InstType::VMS => "vms",
            InstType::VDS => "vds",
            InstType::LSH => "lsh",
            InstType::RSH => "rsh",
            InstType::LST => "lst",
            InstType::LTE => "lte",
            InstType::GRT => "grt",
            InstType::GTE => "gte",
            InstType::EQL => "eql",
            InstType::NEQ => "neq",
            InstType::AND => "and",
            InstType::XOR => "xor",
            InstType::ORR => "orr",
            InstType::LAN => "lan",
            InstType::LOR => "lor",
            InstType::CFN => "cfn",
            InstType::JZE => "jze",
            InstType::JMP => "jmp",
        }
    }

    fn from_mnemonic(text: &str) -> Option<Self> {
        match text {
            "end" => Some(InstType::END),
            "str" => Some(InstType::STR),
            "neg" => Some(InstType::NEG),
            "not" => Some(InstType::NOT),
            "add" => Some(InstType::ADD),
            "sub" => Some(InstType::SUB),
            "mul" => Some(InstType::MUL),
            "div" => Some(InstType::DIV),
            "mod" => Some(InstType::MOD),
            "inc" => Some(InstType::INC),
            "dec" => Some(InstType::DEC),
            "vms" => Some(InstType::VMS),
            "vds" => Some(InstType::VDS),
            "lsh" => Some(InstType::LSH),
            "rsh" => Some(InstType::RSH),
            "lst" => Some(InstType::LST),
            "lte" => Some(InstType::LTE),
            "grt" => Some(InstType::GRT),
            "gte" => Some(InstType::GTE),
            "eql" => Some(InstType::EQL),
            "neq" => Some(InstType::NEQ),
            "and" => Some(InstType::AND),
            "xor" => Some(InstType::XOR),
            "orr" => Some(InstType::ORR),
            "lan" => Some(InstType::LAN),
            "lor" => Some(InstType::LOR),
            "cfn" => Some(InstType::CFN),
            "jze" => Some(InstType::JZE),
            "jmp" => Some(InstType::JMP),
            _ => None,
        }
    }
}

/// Data type an instruction or expression operates on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum InstDataType {
    None = 0,
    ImmOrUser = 1,
    Bool = 2,
    S32 = 3,
    F32 = 4,
    String = 5,
    Vec3f = 6,
}

impl Default for InstDataType {
    fn default() -> Self {
        InstDataType::None
    }
}

impl InstDataType {
    pub fn name(self) -> &'static str {
        match self {
            InstDataType::None => "None",
            InstDataType::ImmOrUser => "ImmOrUser",
            InstDataType::Bool => "Bool",
            InstDataType::S32 => "S32",
            InstDataType::F32 => "F32",
            InstDataType::String => "String",
            InstDataType::Vec3f => "Vec3f",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "None" => Some(InstDataType::None),
            "ImmOrUser" => Some(InstDataType::ImmOrUser),
            "Bool" => Some(InstDataType::Bool),
            "S32" => Some(InstDataType::S32),
            "F32" => Some(InstDataType::F32),
            "String" => Some(InstDataType::String),
            "Vec3f" => Some(InstDataType::Vec3f),
            _ => None,
        }
    }

    fn short(self) -> &'static str {
        match self {
            InstDataType::None => "none",
            InstDataType::ImmOrUser => "immuser",
            InstDataType::Bool => "bool",
            InstDataType::S32 => "s32",
            InstDataType::F32 => "f32",
            InstDataType::String => "str",
            InstDataType::Vec3f => "vec3f",
        }
    }

    fn from_short(text: &str) -> Option<Self> {
        match text {
            "none" => Some(InstDataType::None),
            "immuser" => Some(InstDataType::ImmOrUser),
            "bool" => Some(InstDataType::Bool),
            "s32" => Some(InstDataType::S32),
            "f32" => Some(InstDataType::F32),
            "str" => Some(InstDataType::String),
            "vec3f" => Some(InstDataType::Vec3f),
            _ => None,
        }
    }

    /// Footprint of one value of this type in the 32-bit memory areas.
    pub(crate) fn size(self) -> u32 {
        match self {
            InstDataType::Vec3f => 12,
            _ => 4,
        }
    }
}

/// Where an operand's value lives.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum InstOpType {
    Imm = 0,
    ImmStr = 1,
    StaticMem = 2,
    ParamTbl = 3,
    ParamTblStr = 4,
    Output = 5,
    Input = 6,
    Scratch32 = 7,
    Scratch64 = 8,
    UserOut = 9,
    UserIn = 10,
}

impl InstOpType {
    fn token(self) -> &'static str {
        match self {
            InstOpType::Imm => "imm",
            InstOpType::ImmStr => "immstr",
            InstOpType::StaticMem => "static",
            InstOpType::ParamTbl => "param",
            InstOpType::ParamTblStr => "paramstr",
            InstOpType::Output => "out",
            InstOpType::Input => "in",
            InstOpType::Scratch32 => "scratch32",
            InstOpType::Scratch64 => "scratch64",
            InstOpType::UserOut => "userout",
            InstOpType::UserIn => "userin",
        }
    }

    fn from_token(text: &str) -> Option<Self> {
        match text {
            "imm" => Some(InstOpType::Imm),
            "immstr" => Some(InstOpType::ImmStr),
            "static" => Some(InstOpType::StaticMem),
            "param" => Some(InstOpType::ParamTbl),
            "paramstr" => Some(InstOpType::ParamTblStr),
            "out" => Some(InstOpType::Output),
            "in" => Some(InstOpType::Input),
            "scratch32" => Some(InstOpType::Scratch32),
            "scratch64" => Some(InstOpType::Scratch64),
            "userout" => Some(InstOpType::UserOut),
            "userin" => Some(InstOpType::UserIn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub source: InstOpType,
    pub value: u16,
}

impl Operand {
    const NONE: Operand = Operand {
        source: InstOpType::Imm,
        value: 0,
    };

    fn format(&self) -> String {
        format!("{}[{}]", self.source.token(), self.value)
    }

    fn parse(text: &str) -> Result<Self> {
        let err = || {
            AinbError::DictDecode(format!("Invalid operand: {text:?}"))
        };
        let (token, rest) = text.split_once('[').ok_or_else(err)?;
        let value = rest.strip_suffix(']').ok_or_else(err)?;
        Ok(Self {
            source: InstOpType::from_token(token).ok_or_else(err)?,
            value: value.parse().map_err(|_| err())?,
        })
    }
}

/// One decoded 8-byte instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub inst_type: InstType,
    pub data_type: InstDataType,
    pub lhs: Operand,
    pub rhs: Operand,
}

impl Instruction {
    pub(crate) fn read(reader: &mut AinbReader) -> Result<Self> {
        let position = reader.tell();
        let opcode = reader.read_u8()?;
        let inst_type = InstType::try_from(opcode).map_err(|_| {
            AinbError::InvalidEnumValue {
                what: "instruction opcode",
                value: opcode.into(),
                position,
            }
        })?;
        let data_type_raw = reader.read_u8()?;
        let data_type =
            InstDataType::try_from(data_type_raw).map_err(|_| {
                AinbError::InvalidEnumValue {
                    what: "instruction data type",
                    value: data_type_raw.into(),
                    position,
                }
            })?;
        let mut operand = |reader: &mut AinbReader| -> Result<InstOpType> {
            let raw = reader.read_u8()?;
            InstOpType::try_from(raw).map_err(|_| {
                AinbError::InvalidEnumValue {
                    what: "instruction operand source",
                    value: raw.into(),
                    position,
                }
                .into()
            })
        };
        let lhs_source = operand(reader)?;
        let rhs_source = operand(reader)?;
        Ok(Self {
            inst_type,
            data_type,
            lhs: Operand {
                source: lhs_source,
                value: reader.read_u16()?,
            },
            rhs: Operand {
                source: rhs_source,
                value: reader.read_u16()?,
            },
        })
    }

    pub(crate) fn write(&self, writer: &mut AinbWriter) {
        writer.write_u8(self.inst_type.into());
        writer.write_u8(self.data_type.into());
        writer.write_u8(self.lhs.source.into());
        writer.write_u8(self.rhs.source.into());
        writer.write_u16(self.lhs.value);
        writer.write_u16(self.rhs.value);
    }

    pub fn operands(&self) -> [Operand; 2] {
        [self.lhs, self.rhs]
    }

    /// Formats the instruction in its textual disassembly form, without
    /// the address column.
    pub fn format(&self) -> String {
        match self.inst_type {
            InstType::END => "end".to_owned(),
            InstType::JZE | InstType::JMP => {
                format!(
                    "{} {:#x}",
                    self.inst_type.mnemonic(),
                    self.lhs.value
                )
            }
            InstType::CFN => {
                format!(
                    "cfn {} static[{}], sig[{}]",
                    self.data_type.short(),
                    self.lhs.value,
                    self.rhs.value
                )
            }
            _ => {
                format!(
                    "{} {} {}, {}",
                    self.inst_type.mnemonic(),
                    self.data_type.short(),
                    self.lhs.format(),
                    self.rhs.format()
                )
            }
        }
    }

    /// Parses one line of disassembly, the exact inverse of [`format`].
    /// A leading address column (as emitted into the JSON view) is
    /// tolerated and ignored.
    ///
    /// [`format`]: Instruction::format
    pub fn parse(text: &str) -> Result<Self> {
        let err = |message: String| AinbError::DictDecode(message);
        let mut tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.first().is_some_and(|t| t.starts_with("0x")) {
            tokens.remove(0);
        }
        let Some((mnemonic, args)) = tokens.split_first() else {
            return Err(err("Empty instruction".to_owned()).into());
        };
        let inst_type = InstType::from_mnemonic(mnemonic).ok_or_else(|| {
            err(format!("Unknown instruction mnemonic: {mnemonic:?}"))
        })?;
        let expect_args = |n: usize| -> Result<()> {
            if args.len() == n {
                Ok(())
            } else {
                Err(err(format!(
                    "Instruction {mnemonic} expects {n} arguments, got {}",
                    args.len()
                ))
                .into())
            }
        };
        match inst_type {
            InstType::END => {
                expect_args(0)?;
                Ok(Self {
                    inst_type,
                    data_type: InstDataType::None,
                    lhs: Operand::NONE,
                    rhs: Operand::NONE,
                })
            }
            InstType::JZE | InstType::JMP => {
                expect_args(1)?;
                let target = args[0].strip_prefix("0x").ok_or_else(|| {
                    err(format!("Invalid jump target: {:?}", args[0]))
                })?;
                let value =
                    u16::from_str_radix(target, 16).map_err(|_| {
                        err(format!("Invalid jump target: {:?}", args[0]))
                    })?;
                Ok(Self {
                    inst_type,
                    data_type: InstDataType::None,
                    lhs: Operand {
                        source: InstOpType::Imm,
                        value,
                    },
                    rhs: Operand::NONE,
                })
            }
            InstType::CFN => {
                expect_args(3)?;
                let data_type =
                    InstDataType::from_short(args[0]).ok_or_else(|| {
                        err(format!("Unknown data type: {:?}", args[0]))
                    })?;
                let lhs =
                    Operand::parse(args[1].trim_end_matches(','))?;
                let sig = args[2]
                    .strip_prefix("sig[")
                    .and_then(|v| v.strip_suffix(']'))
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| {
                        err(format!(
                            "Invalid signature operand: {:?}",
                            args[2]
                        ))
                    })?;
                Ok(Self {
                    inst_type,
                    data_type,
                    lhs,
                    rhs: Operand {
                        source: InstOpType::Imm,
                        value: sig,
                    },
                })
            }
            _ => {
                expect_args(3)?;
                let data_type =
                    InstDataType::from_short(args[0]).ok_or_else(|| {
                        err(format!("Unknown data type: {:?}", args[0]))
                    })?;
                Ok(Self {
                    inst_type,
                    data_type,
                    lhs: Operand::parse(args[1].trim_end_matches(','))?,
                    rhs: Operand::parse(args[2])?,
                })
            }
        }
    }
}
