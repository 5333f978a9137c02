pub mod instruction;

use anyhow::Result;
use serde_json::{json, Map, Value};

use crate::dict;
use crate::error::{AinbError, StderrSink};
use crate::expression::instruction::{InstDataType, InstOpType, Instruction};
use crate::stream::{AinbReader, AinbWriter};

pub const SUPPORTED_VERSIONS: [u32; 2] = [1, 2];

/// Returns every EXB version this crate accepts.
pub fn supported_versions() -> &'static [u32] {
    &SUPPORTED_VERSIONS
}

/// A single expression: an optional setup command and a main command, each
/// a run of instructions sliced out of the module's flat instruction
/// array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expression {
    pub setup_command: Vec<Instruction>,
    pub main_command: Vec<Instruction>,
    // these three values can be recalculated from the instructions
    pub global_mem_usage: u32,
    pub local32_mem_usage: u16,
    pub local64_mem_usage: u16,
    pub input_datatype: InstDataType,
    pub output_datatype: InstDataType,
}

impl Expression {
    fn read(
        reader: &mut AinbReader,
        instructions: &[Instruction],
    ) -> Result<Self> {
        let mut expr = Expression::default();
        let setup_base = reader.read_s32()?;
        let setup_count = reader.read_u32()?;
        if setup_base != -1 {
            expr.setup_command =
                Self::slice(instructions, setup_base, setup_count)?;
        }
        let main_base = reader.read_s32()?;
        let main_count = reader.read_u32()?;
        expr.main_command = Self::slice(instructions, main_base, main_count)?;

        expr.global_mem_usage = reader.read_u32()?;
        expr.local32_mem_usage = reader.read_u16()?;
        expr.local64_mem_usage = reader.read_u16()?;

        expr.input_datatype = Self::read_datatype(reader)?;
        expr.output_datatype = Self::read_datatype(reader)?;
        Ok(expr)
    }

    fn read_datatype(reader: &mut AinbReader) -> Result<InstDataType> {
        let position = reader.tell();
        let raw = reader.read_u16()?;
        u8::try_from(raw)
            .ok()
            .and_then(|raw| InstDataType::try_from(raw).ok())
            .ok_or_else(|| {
                AinbError::InvalidEnumValue {
                    what: "expression data type",
                    value: raw.into(),
                    position,
                }
                .into()
            })
    }

    fn slice(
        instructions: &[Instruction],
        base: i32,
        count: u32,
    ) -> Result<Vec<Instruction>> {
        let base = usize::try_from(base).unwrap_or(usize::MAX);
        instructions
            .get(base..base.saturating_add(count as usize))
            .map(<[Instruction]>::to_vec)
            .ok_or_else(|| {
                AinbError::InvalidReference {
                    what: "instruction",
                    index: base,
                    len: instructions.len(),
                }
                .into()
            })
    }

    /// Recomputes the memory usages from the instruction operands. Used
    /// when an expression is rebuilt from its textual form, which does not
    /// carry them.
    pub fn derive_mem_usage(&mut self) {
        let mut global = 0u32;
        let mut local32 = 0u32;
        let mut local64 = 0u32;
        for inst in self.setup_command.iter().chain(&self.main_command) {
            for operand in inst.operands() {
                let end = u32::from(operand.value);
                match operand.source {
                    InstOpType::StaticMem => {
                        global = global.max(end + inst.data_type.size());
                    }
                    InstOpType::Scratch32 => {
                        local32 = local32.max(end + inst.data_type.size());
                    }
                    InstOpType::Scratch64 => {
                        local64 = local64.max(end + 8);
                    }
                    _ => (),
                }
            }
        }
        self.global_mem_usage = global;
        self.local32_mem_usage = local32 as u16;
        self.local64_mem_usage = local64 as u16;
    }

    fn format_instruction(inst: &Instruction, addr: usize) -> String {
        format!("{addr:#06x}    {}", inst.format())
    }

    fn format_instructions(
        instructions: &[Instruction],
        indent: &str,
    ) -> String {
        instructions
            .iter()
            .enumerate()
            .map(|(i, inst)| {
                format!("{indent}{}", Self::format_instruction(inst, i * 8))
            })
            .collect::<Vec<String>>()
            .join("\n")
    }

    /// Returns the disassembled text of the expression.
    pub fn format(&self) -> String {
        if self.setup_command.is_empty() {
            format!(
                ".main\n{}\n",
                Self::format_instructions(&self.main_command, "    ")
            )
        } else {
            format!(
                ".setup\n{}\n.main\n{}\n",
                Self::format_instructions(&self.setup_command, "    "),
                Self::format_instructions(&self.main_command, "    ")
            )
        }
    }

    fn format_nested(&self) -> String {
        if self.setup_command.is_empty() {
            format!(
                "    .main\n{}\n",
                Self::format_instructions(&self.main_command, "        ")
            )
        } else {
            format!(
                "    .setup\n{}\n    .main\n{}\n",
                Self::format_instructions(&self.setup_command, "        "),
                Self::format_instructions(&self.main_command, "        ")
            )
        }
    }

    fn command_lines(instructions: &[Instruction]) -> Vec<Value> {
        instructions
            .iter()
            .enumerate()
            .map(|(i, inst)| json!(Self::format_instruction(inst, i * 8)))
            .collect()
    }

    fn as_dict(&self, index: usize) -> Value {
        let mut out = Map::new();
        out.insert("Expression Index".to_owned(), json!(index));
        out.insert(
            "Input Type".to_owned(),
            json!(self.input_datatype.name()),
        );
        out.insert(
            "Output Type".to_owned(),
            json!(self.output_datatype.name()),
        );
        if !self.setup_command.is_empty() {
            out.insert(
                "Setup".to_owned(),
                json!(Self::command_lines(&self.setup_command)),
            );
        }
        out.insert(
            "Main".to_owned(),
            json!(Self::command_lines(&self.main_command)),
        );
        Value::Object(out)
    }

    fn from_dict(data: &Value) -> Result<Self> {
        let datatype = |key: &str| -> Result<InstDataType> {
            let name = dict::get_str(data, key)?;
            InstDataType::from_name(&name).ok_or_else(|| {
                AinbError::DictDecode(format!(
                    "Unknown expression data type: {name:?}"
                ))
                .into()
            })
        };
        let mut expr = Expression {
            input_datatype: datatype("Input Type")?,
            output_datatype: datatype("Output Type")?,
            ..Expression::default()
        };
        if data.get("Setup").is_some() {
            expr.setup_command = dict::get_array(data, "Setup")?
                .iter()
                .map(|line| Self::parse_line(line))
                .collect::<Result<_>>()?;
        }
        expr.main_command = dict::get_array(data, "Main")?
            .iter()
            .map(|line| Self::parse_line(line))
            .collect::<Result<_>>()?;
        expr.derive_mem_usage();
        Ok(expr)
    }

    fn parse_line(line: &Value) -> Result<Instruction> {
        let text = line.as_str().ok_or_else(|| {
            AinbError::DictDecode(format!(
                "Expression instruction is not a string: {line}"
            ))
        })?;
        Instruction::parse(text)
    }
}

/// Embedded expression bytecode module, a nested binary section with its
/// own magic, version, string pool, signature table, parameter table and
/// instruction stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionModule {
    pub version: u32,
    pub global_mem_size: u32,
    /// How many expression instances exist in the containing file.
    pub instance_count: u32,
    pub local32_mem_size: u32,
    pub local64_mem_size: u32,
    pub signatures: Vec<String>,
    /// Raw parameter table, addressed by instruction operands. Preserved
    /// verbatim.
    pub param_table: Vec<u8>,
    pub expressions: Vec<Expression>,
}

impl ExpressionModule {
    /// Load an ExpressionModule from the bytes of an EXB section.
    pub fn from_binary(data: Vec<u8>) -> Result<Self> {
        let mut sink = StderrSink;
        let mut reader = AinbReader::new(data, &mut sink);
        Self::read(&mut reader)
    }

    fn read(reader: &mut AinbReader) -> Result<Self> {
        let mut module = ExpressionModule::default();
        let magic: [u8; 4] = reader.read_bytes(4)?.try_into().unwrap();
        if &magic != b"EXB " {
            return Err(AinbError::InvalidMagic {
                expected: "EXB ",
                found: magic,
            }
            .into());
        }
        module.version = reader.read_u32()?;
        if !SUPPORTED_VERSIONS.contains(&module.version) {
            return Err(AinbError::UnsupportedVersion {
                version: module.version,
            }
            .into());
        }

        module.global_mem_size = reader.read_u32()?;
        module.instance_count = reader.read_u32()?;
        module.local32_mem_size = reader.read_u32()?;
        module.local64_mem_size = reader.read_u32()?;
        let expression_offset = reader.read_u32()? as usize;
        let instruction_offset = reader.read_u32()? as usize;
        let signature_table_offset = reader.read_u32()? as usize;
        let param_table_offset = reader.read_u32()? as usize;
        let string_pool_offset = reader.read_u32()? as usize;

        reader.init_string_pool(string_pool_offset)?;

        module.param_table = reader.temp_seek(param_table_offset, |r| {
            r.read_bytes(string_pool_offset.saturating_sub(param_table_offset))
        })?;

        reader.seek(signature_table_offset)?;
        let signature_count = reader.read_u32()?;
        module.signatures = (0..signature_count)
            .map(|_| reader.read_string_offset())
            .collect::<Result<_>>()?;

        reader.seek(instruction_offset)?;
        let instruction_count = reader.read_u32()?;
        let instructions: Vec<Instruction> = (0..instruction_count)
            .map(|_| Instruction::read(reader))
            .collect::<Result<_>>()?;

        reader.seek(expression_offset)?;
        let expression_count = reader.read_u32()?;
        module.expressions = (0..expression_count)
            .map(|_| Expression::read(reader, &instructions))
            .collect::<Result<_>>()?;

        Ok(module)
    }

    /// Serializes the module into the bytes of an EXB section. Offsets are
    /// relative to the section start.
    pub fn to_binary(&self) -> Vec<u8> {
        let mut writer = AinbWriter::new(self.version);
        writer.write_bytes(b"EXB ");
        writer.write_u32(self.version);
        writer.write_u32(self.global_mem_size);
        writer.write_u32(self.instance_count);
        writer.write_u32(self.local32_mem_size);
        writer.write_u32(self.local64_mem_size);
        let expression_patch = writer.placeholder_u32();
        let instruction_patch = writer.placeholder_u32();
        let signature_patch = writer.placeholder_u32();
        let param_table_patch = writer.placeholder_u32();
        let string_pool_patch = writer.placeholder_u32();

        writer.patch_here(signature_patch);
        writer.write_u32(self.signatures.len() as u32);
        for signature in &self.signatures {
            writer.write_string(signature);
        }

        // flatten the per-expression commands back into one instruction
        // array, recording the (base, count) runs as we go
        let mut instructions: Vec<Instruction> = Vec::new();
        let mut runs: Vec<(i32, u32, i32, u32)> = Vec::new();
        for expr in &self.expressions {
            let setup_base = if expr.setup_command.is_empty() {
                -1
            } else {
                instructions.len() as i32
            };
            instructions.extend_from_slice(&expr.setup_command);
            let main_base = instructions.len() as i32;
            instructions.extend_from_slice(&expr.main_command);
            runs.push((
                setup_base,
                expr.setup_command.len() as u32,
                main_base,
                expr.main_command.len() as u32,
            ));
        }

        writer.patch_here(instruction_patch);
        writer.write_u32(instructions.len() as u32);
        for inst in &instructions {
            inst.write(&mut writer);
        }

        writer.patch_here(expression_patch);
        writer.write_u32(self.expressions.len() as u32);
        for (expr, run) in self.expressions.iter().zip(&runs) {
            let (setup_base, setup_count, main_base, main_count) = *run;
            writer.write_s32(setup_base);
            writer.write_u32(setup_count);
            writer.write_s32(main_base);
            writer.write_u32(main_count);
            writer.write_u32(expr.global_mem_usage);
            writer.write_u16(expr.local32_mem_usage);
            writer.write_u16(expr.local64_mem_usage);
            writer.write_u16(u8::from(expr.input_datatype).into());
            writer.write_u16(u8::from(expr.output_datatype).into());
        }

        writer.patch_here(param_table_patch);
        writer.write_bytes(&self.param_table);

        let pool = writer.append_string_pool();
        writer.patch_u32(string_pool_patch, pool as u32);
        writer.into_bytes()
    }

    /// Converts this expression module into its disassembled source form.
    pub fn to_text(&self) -> String {
        let body = self
            .expressions
            .iter()
            .enumerate()
            .map(|(i, expr)| {
                format!(".expression{i}\n{}", expr.format_nested())
            })
            .collect::<Vec<String>>()
            .join("\n");
        format!(".version {}\n\n{body}", self.version)
    }

    pub fn as_dict(&self) -> Value {
        json!({
            "Version": self.version,
            "Instance Count": self.instance_count,
            "Global Memory Size": self.global_mem_size,
            "Local 32 Memory Size": self.local32_mem_size,
            "Local 64 Memory Size": self.local64_mem_size,
            "Signatures": self.signatures,
            "Parameter Table": self.param_table,
            "Expressions": self.expressions
                .iter()
                .enumerate()
                .map(|(i, expr)| expr.as_dict(i))
                .collect::<Vec<Value>>(),
        })
    }

    pub fn from_dict(data: &Value) -> Result<Self> {
        let mut module = ExpressionModule {
            version: dict::get_u32(data, "Version")?,
            instance_count: dict::get_u32(data, "Instance Count")?,
            global_mem_size: dict::get_u32(data, "Global Memory Size")?,
            local32_mem_size: dict::get_u32(data, "Local 32 Memory Size")?,
            local64_mem_size: dict::get_u32(data, "Local 64 Memory Size")?,
            ..ExpressionModule::default()
        };
        if !SUPPORTED_VERSIONS.contains(&module.version) {
            return Err(AinbError::DictDecode(format!(
                "Unsupported EXB version: {}",
                module.version
            ))
            .into());
        }
        module.signatures = dict::get_array(data, "Signatures")?
            .iter()
            .map(|s| {
                s.as_str().map(str::to_owned).ok_or_else(|| {
                    AinbError::DictDecode(
                        "Signature is not a string".to_owned(),
                    )
                    .into()
                })
            })
            .collect::<Result<_>>()?;
        module.param_table = dict::get_array(data, "Parameter Table")?
            .iter()
            .map(|b| {
                b.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| {
                        AinbError::DictDecode(
                            "Parameter table entry is not a byte".to_owned(),
                        )
                        .into()
                    })
            })
            .collect::<Result<_>>()?;
        module.expressions = dict::get_array(data, "Expressions")?
            .iter()
            .map(Expression::from_dict)
            .collect::<Result<_>>()?;
        Ok(module)
    }
}
