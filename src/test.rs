use rstest::rstest;

use crate::ainb::{
    Action, Ainb, Command, Module, ReplacementEntry, ReplacementType,
    UnknownSection0x58,
};
use crate::blackboard::{BBParam, BBParamType, Blackboard};
use crate::enum_resolve::{apply_patches, EnumDb, EnumEntry};
use crate::error::{AinbError, CollectSink, WarningKind};
use crate::expression::instruction::{
    InstDataType, InstOpType, InstType, Instruction, Operand,
};
use crate::expression::{Expression, ExpressionModule};
use crate::node::{
    get_null_index, BsaSelectorUpdaterPlug, F32SelectorPlug, GenericPlug,
    IntInputPlug, Node, NodeType, Plug, PlugType, RandomSelectorPlug,
    S32SelectorPlug, StateInfo, StringInputPlug, StringSelectorPlug,
    Transition, TransitionPlug,
};
use crate::param::{
    InputParam, OutputParam, ParamSource, ParamType, ParamValue, SourceFlag,
};
use crate::property::Property;
use crate::stream::AinbReader;
use crate::{murmur3_32, Guid, Vector3f};

fn guid(seed: u8) -> Guid {
    Guid::from_raw([seed; 16])
}

fn imm(value: u16) -> Operand {
    Operand {
        source: InstOpType::Imm,
        value,
    }
}

#[test]
fn murmur3_reference_vectors() {
    assert_eq!(murmur3_32(b"", 0), 0);
    assert_eq!(murmur3_32(b"", 1), 0x514e28b7);
    assert_eq!(murmur3_32(b"test", 0), 0xba6bd213);
    assert_eq!(murmur3_32(b"Hello, world!", 0), 0xc0363e43);
}

#[test]
fn guid_display_and_parse() {
    let text = "01234567-89ab-cdef-0123-456789abcdef";
    let parsed = Guid::parse(text).unwrap();
    assert_eq!(parsed.to_string(), text);
    assert!(Guid::parse("not-a-guid").is_err());
    assert_eq!(
        Guid::default().to_string(),
        "00000000-0000-0000-0000-000000000000"
    );
}

#[test]
fn null_index_constant() {
    assert_eq!(get_null_index(), 0x7fff);
}

#[test]
fn reader_out_of_bounds() {
    let mut sink = CollectSink::new();
    let mut reader = AinbReader::new(vec![1, 2], &mut sink);
    let err = reader.read_u32().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AinbError>(),
        Some(AinbError::OutOfBounds { .. })
    ));
}

#[test]
fn reader_temp_seek_restores_on_error() {
    let mut sink = CollectSink::new();
    let mut reader = AinbReader::new(vec![0; 8], &mut sink);
    let result = reader.temp_seek(6, |r| r.read_u32());
    assert!(result.is_err());
    assert_eq!(reader.tell(), 0);
    let value = reader.temp_seek(4, |r| r.read_u32()).unwrap();
    assert_eq!(value, 0);
    assert_eq!(reader.tell(), 0);
}

#[test]
fn reader_string_pool() {
    let mut sink = CollectSink::new();
    let mut reader =
        AinbReader::new(b"XXXXXhello\0world\0".to_vec(), &mut sink);
    let err = reader.get_string(0).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AinbError>(),
        Some(AinbError::NoStringPool)
    ));
    reader.init_string_pool(5).unwrap();
    assert_eq!(reader.get_string(0).unwrap(), "hello");
    assert_eq!(reader.get_string(6).unwrap(), "world");
    let err = reader.get_string(100).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AinbError>(),
        Some(AinbError::OutOfBounds { .. })
    ));
}

#[test]
fn reader_invalid_utf8() {
    let mut sink = CollectSink::new();
    let mut reader = AinbReader::new(vec![0xff, 0xfe, 0x00], &mut sink);
    reader.init_string_pool(0).unwrap();
    let err = reader.get_string(0).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AinbError>(),
        Some(AinbError::InvalidUtf8 { .. })
    ));
}

#[test]
fn enum_patches_apply_and_are_idempotent() {
    let db = EnumDb::from_json_text(r#"{"Weapon": {"Sword": 4660}}"#)
        .unwrap();
    let entries = vec![EnumEntry {
        patch_offset: 4,
        classname: "Weapon".to_owned(),
        value_name: "Sword".to_owned(),
    }];
    let mut sink = CollectSink::new();
    let mut reader = AinbReader::new(vec![0; 12], &mut sink);
    apply_patches(&mut reader, &entries, &db).unwrap();
    apply_patches(&mut reader, &entries, &db).unwrap();
    reader.seek(4).unwrap();
    assert_eq!(reader.read_s32().unwrap(), 4660);
    assert!(sink.warnings.is_empty());
}

#[test]
fn enum_patches_warn_and_skip() {
    let db = EnumDb::from_json_text(r#"{"Weapon": {"Sword": 1}}"#).unwrap();
    let entries = vec![
        EnumEntry {
            patch_offset: 100,
            classname: "Weapon".to_owned(),
            value_name: "Sword".to_owned(),
        },
        EnumEntry {
            patch_offset: 0,
            classname: "Weapon".to_owned(),
            value_name: "Hammer".to_owned(),
        },
    ];
    let mut sink = CollectSink::new();
    {
        let mut reader = AinbReader::new(vec![0; 8], &mut sink);
        apply_patches(&mut reader, &entries, &db).unwrap();
        reader.seek(0).unwrap();
        assert_eq!(reader.read_s32().unwrap(), 0);
    }
    assert!(sink.contains(WarningKind::OutOfBoundsEnumPatch));
    assert!(sink.contains(WarningKind::UnknownEnumEntry));
}

#[test]
fn enum_patches_warn_on_empty_db() {
    let entries = vec![EnumEntry {
        patch_offset: 0,
        classname: "Weapon".to_owned(),
        value_name: "Sword".to_owned(),
    }];
    let mut sink = CollectSink::new();
    {
        let mut reader = AinbReader::new(vec![0; 8], &mut sink);
        apply_patches(&mut reader, &entries, &EnumDb::default()).unwrap();
    }
    assert!(sink.contains(WarningKind::EmptyEnumDb));
}

#[test]
fn instruction_codec() {
    let data = vec![0x05, 0x03, 0x07, 0x02, 0x04, 0x00, 0x08, 0x00];
    let mut sink = CollectSink::new();
    let mut reader = AinbReader::new(data.clone(), &mut sink);
    let inst = Instruction::read(&mut reader).unwrap();
    assert_eq!(inst.inst_type, InstType::ADD);
    assert_eq!(inst.data_type, InstDataType::S32);
    assert_eq!(inst.lhs.source, InstOpType::Scratch32);
    assert_eq!(inst.lhs.value, 4);
    assert_eq!(inst.rhs.source, InstOpType::StaticMem);
    assert_eq!(inst.rhs.value, 8);
    assert_eq!(inst.format(), "add s32 scratch32[4], static[8]");
    assert_eq!(Instruction::parse(&inst.format()).unwrap(), inst);
}

#[test]
fn instruction_parse_tolerates_address_column() {
    let inst = Instruction::parse("0x0010    jmp 0x18").unwrap();
    assert_eq!(inst.inst_type, InstType::JMP);
    assert_eq!(inst.lhs.value, 0x18);
    assert_eq!(inst.format(), "jmp 0x18");

    let end = Instruction::parse("0x0000    end").unwrap();
    assert_eq!(end.inst_type, InstType::END);

    let cfn = Instruction::parse("cfn f32 static[2], sig[1]").unwrap();
    assert_eq!(cfn.inst_type, InstType::CFN);
    assert_eq!(cfn.data_type, InstDataType::F32);
    assert_eq!(cfn.lhs.source, InstOpType::StaticMem);
    assert_eq!(cfn.lhs.value, 2);
    assert_eq!(cfn.rhs.value, 1);
    assert_eq!(cfn.format(), "cfn f32 static[2], sig[1]");
}

#[test]
fn instruction_rejects_garbage() {
    assert!(Instruction::parse("frobnicate s32 imm[0], imm[1]").is_err());
    assert!(Instruction::parse("add s32 imm[0]").is_err());
    assert!(Instruction::parse("jmp eighteen").is_err());
}

fn sample_expression_module() -> ExpressionModule {
    ExpressionModule {
        version: 2,
        global_mem_size: 16,
        instance_count: 1,
        local32_mem_size: 8,
        local64_mem_size: 0,
        signatures: vec!["f32 fn(f32)".to_owned()],
        param_table: vec![0x00, 0x00, 0x80, 0x3f],
        expressions: vec![
            Expression {
                setup_command: vec![Instruction {
                    inst_type: InstType::STR,
                    data_type: InstDataType::F32,
                    lhs: Operand {
                        source: InstOpType::Scratch32,
                        value: 0,
                    },
                    rhs: Operand {
                        source: InstOpType::ParamTbl,
                        value: 0,
                    },
                }],
                main_command: vec![
                    Instruction {
                        inst_type: InstType::MUL,
                        data_type: InstDataType::F32,
                        lhs: Operand {
                            source: InstOpType::Scratch32,
                            value: 0,
                        },
                        rhs: Operand {
                            source: InstOpType::Input,
                            value: 0,
                        },
                    },
                    Instruction {
                        inst_type: InstType::STR,
                        data_type: InstDataType::F32,
                        lhs: Operand {
                            source: InstOpType::Output,
                            value: 0,
                        },
                        rhs: Operand {
                            source: InstOpType::Scratch32,
                            value: 0,
                        },
                    },
                    Instruction {
                        inst_type: InstType::END,
                        data_type: InstDataType::None,
                        lhs: imm(0),
                        rhs: imm(0),
                    },
                ],
                global_mem_usage: 0,
                local32_mem_usage: 4,
                local64_mem_usage: 0,
                input_datatype: InstDataType::F32,
                output_datatype: InstDataType::F32,
            },
        ],
    }
}

#[test]
fn expression_module_binary_round_trip() {
    let module = sample_expression_module();
    let decoded =
        ExpressionModule::from_binary(module.to_binary()).unwrap();
    assert_eq!(decoded, module);
}

#[test]
fn expression_module_text_rendering() {
    let text = sample_expression_module().to_text();
    assert!(text.starts_with(".version 2\n"));
    assert!(text.contains(".expression0"));
    assert!(text.contains(".setup"));
    assert!(text.contains(".main"));
    assert!(text.contains("str f32 out[0], scratch32[0]"));
}

#[test]
fn expression_module_dict_round_trip() {
    let module = sample_expression_module();
    let restored =
        ExpressionModule::from_dict(&module.as_dict()).unwrap();
    assert_eq!(restored.as_dict(), module.as_dict());
    // the memory usages are rederived from the instruction operands
    assert_eq!(restored.expressions[0].local32_mem_usage, 4);
}

#[test]
fn expression_module_bad_magic() {
    let err = ExpressionModule::from_binary(b"EXB?\x02\0\0\0".to_vec())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AinbError>(),
        Some(AinbError::InvalidMagic { .. })
    ));
}

fn sample_blackboard() -> Blackboard {
    let mut bb = Blackboard::default();
    let mut param = BBParam::new("Target", BBParamType::String);
    param.default_value = ParamValue::String("Player".to_owned());
    param.notes = "current target actor".to_owned();
    bb.push(param);
    let mut param = BBParam::new("Count", BBParamType::S32);
    param.default_value = ParamValue::S32(3);
    param.file_ref = "Shared.ainb".to_owned();
    bb.push(param);
    let mut param = BBParam::new("Speed", BBParamType::F32);
    param.default_value = ParamValue::F32(1.5);
    param.flags = 1;
    bb.push(param);
    let mut param = BBParam::new("Alerted", BBParamType::Bool);
    param.default_value = ParamValue::Bool(true);
    bb.push(param);
    let mut param = BBParam::new("Home", BBParamType::Vec3f);
    param.default_value =
        ParamValue::Vec3f(Vector3f::new(1.0, 2.0, 4.0));
    bb.push(param);
    bb.push(BBParam::new("Handle", BBParamType::VoidPtr));
    bb
}

fn attack_node(version: u32) -> Node {
    let mut node = Node::new(NodeType::UserDefined);
    node.index = 0;
    node.name = "Attack".to_owned();
    node.guid = guid(0x10);
    node.flags = node.flags.set_root_node(true);
    node.queries = vec![1];

    let mut property = Property::new("Power", ParamType::Int);
    property.default_value = ParamValue::S32(10);
    node.properties.push(property);
    let mut property = Property::new("Label", ParamType::String);
    property.default_value = ParamValue::String("idle".to_owned());
    node.properties.push(property);
    let mut property = Property::new("Actor", ParamType::Pointer);
    property.classname = "GameActor".to_owned();
    node.properties.push(property);
    let mut property = Property::new("Anchor", ParamType::Vector3F);
    property.default_value =
        ParamValue::Vec3f(Vector3f::new(0.5, 0.0, 2.0));
    node.properties.push(property);

    // blackboard-sourced input (F32 blackboard entry 0)
    let mut input = InputParam::new("SpeedIn", ParamType::Float);
    input.flags = SourceFlag::from_raw(0x8000_0000);
    node.params.push_input(input);
    // expression-transformed input (expression 0, node 1 output 1)
    let mut input = InputParam::new("CountIn", ParamType::Int);
    input.flags = SourceFlag::from_raw(0x4000_0000);
    input.node_index = 1;
    input.output_index = 1;
    node.params.push_input(input);
    // direct input
    let mut input = InputParam::new("Dist", ParamType::Float);
    input.node_index = 1;
    input.output_index = 0;
    input.default_value = ParamValue::F32(2.0);
    node.params.push_input(input);
    // multi-sourced input, operator 1 over two sub-sources
    let mut input = InputParam::new("Sum", ParamType::Int);
    input.flags = SourceFlag::from_raw(0x2102_0000);
    input.sources = vec![
        ParamSource {
            node_index: 1,
            output_index: 0,
            flags: SourceFlag::from_raw(0),
        },
        ParamSource {
            node_index: 1,
            output_index: 1,
            flags: SourceFlag::from_raw(0),
        },
    ];
    node.params.push_input(input);
    let mut input = InputParam::new("ActorIn", ParamType::Pointer);
    input.classname = "GameActor".to_owned();
    node.params.push_input(input);
    let mut input = InputParam::new("Offset", ParamType::Vector3F);
    input.default_value =
        ParamValue::Vec3f(Vector3f::new(1.0, 2.0, 4.0));
    node.params.push_input(input);

    node.params
        .push_output(OutputParam::new("Result", ParamType::Float));

    node.plugs_mut(PlugType::Generic).push(Plug::Generic(GenericPlug {
        node_index: 1,
        name: "Output".to_owned(),
    }));
    node.plugs_mut(PlugType::Transition).push(Plug::Transition(
        TransitionPlug {
            node_index: 2,
            transition: Transition {
                transition_type: 0,
                update_post_calc: true,
                command_name: "Root".to_owned(),
            },
        },
    ));
    node.plugs_mut(PlugType::Transition).push(Plug::Transition(
        TransitionPlug {
            node_index: 2,
            transition: Transition {
                transition_type: 1,
                update_post_calc: false,
                command_name: String::new(),
            },
        },
    ));
    node.plugs_mut(PlugType::String).push(Plug::StringInput(
        StringInputPlug {
            node_index: 1,
            name: "Phrase".to_owned(),
            unknown: 7,
            default_value: "hello".to_owned(),
        },
    ));
    node.plugs_mut(PlugType::Int).push(Plug::IntInput(IntInputPlug {
        node_index: 1,
        name: "Level".to_owned(),
        unknown: 0,
        default_value: 3,
    }));

    node.actions = vec![Action {
        action_slot: "Demo".to_owned(),
        action: "PlaySound".to_owned(),
    }];

    let mut attachment = crate::attachment::Attachment::default();
    attachment.name = "AttackCheck".to_owned();
    let mut property = Property::new("Range", ParamType::Int);
    property.default_value = ParamValue::S32(5);
    attachment.properties.push(property);
    node.attachments = vec![attachment];

    if version < 0x407 {
        node.state_info = Some(StateInfo {
            desired_state: "Attacking".to_owned(),
            unk04: 1,
            unk08: 2,
            unk0c: 3,
            unk10: 4,
        });
    }
    node
}

fn sample_ainb(version: u32) -> Ainb {
    let mut nodes = Vec::new();
    nodes.push(attack_node(version));

    let mut node = Node::new(NodeType::UserDefined);
    node.index = 1;
    node.name = "IsNearTarget".to_owned();
    node.guid = guid(0x11);
    node.flags = node.flags.set_query(true);
    node.params
        .push_output(OutputParam::new("Distance", ParamType::Float));
    node.params
        .push_output(OutputParam::new("Level", ParamType::Int));
    nodes.push(node);

    let mut node = Node::new(NodeType::Element_S32Selector);
    node.index = 2;
    node.name = "PickByCount".to_owned();
    node.guid = guid(0x12);
    node.plugs_mut(PlugType::Child).push(Plug::S32Selector(
        S32SelectorPlug {
            node_index: 0,
            name: "Case7".to_owned(),
            condition: 7,
            ..S32SelectorPlug::default()
        },
    ));
    node.plugs_mut(PlugType::Child).push(Plug::S32Selector(
        S32SelectorPlug {
            node_index: 1,
            name: "FromBlackboard".to_owned(),
            blackboard_index: 0,
            ..S32SelectorPlug::default()
        },
    ));
    node.plugs_mut(PlugType::Child).push(Plug::S32Selector(
        S32SelectorPlug {
            node_index: 3,
            name: "Default".to_owned(),
            is_default: true,
            ..S32SelectorPlug::default()
        },
    ));
    nodes.push(node);

    let mut node = Node::new(NodeType::UserDefined);
    node.index = 3;
    node.name = "SubGraph".to_owned();
    node.guid = guid(0x13);
    node.flags = node.flags.set_module(true);
    nodes.push(node);

    let mut node = Node::new(NodeType::Element_F32Selector);
    node.index = 4;
    node.name = "PickBySpeed".to_owned();
    node.guid = guid(0x14);
    node.plugs_mut(PlugType::Child).push(Plug::F32Selector(
        F32SelectorPlug {
            node_index: 0,
            name: "Slow".to_owned(),
            condition_min: 0.0,
            condition_max: 1.5,
            ..F32SelectorPlug::default()
        },
    ));
    node.plugs_mut(PlugType::Child).push(Plug::F32Selector(
        F32SelectorPlug {
            node_index: 1,
            name: "Tracked".to_owned(),
            blackboard_index_min: 0,
            condition_max: 8.0,
            ..F32SelectorPlug::default()
        },
    ));
    node.plugs_mut(PlugType::Child).push(Plug::F32Selector(
        F32SelectorPlug {
            node_index: 3,
            name: "Default".to_owned(),
            is_default: true,
            ..F32SelectorPlug::default()
        },
    ));
    nodes.push(node);

    let mut node = Node::new(NodeType::Element_StringSelector);
    node.index = 5;
    node.name = "PickByName".to_owned();
    node.guid = guid(0x15);
    node.plugs_mut(PlugType::Child).push(Plug::StringSelector(
        StringSelectorPlug {
            node_index: 0,
            name: "Named".to_owned(),
            condition: "Player".to_owned(),
            ..StringSelectorPlug::default()
        },
    ));
    node.plugs_mut(PlugType::Child).push(Plug::StringSelector(
        StringSelectorPlug {
            node_index: 1,
            name: "Default".to_owned(),
            is_default: true,
            ..StringSelectorPlug::default()
        },
    ));
    nodes.push(node);

    let mut node = Node::new(NodeType::Element_RandomSelector);
    node.index = 6;
    node.name = "Wander".to_owned();
    node.guid = guid(0x16);
    node.plugs_mut(PlugType::Child).push(Plug::RandomSelector(
        RandomSelectorPlug {
            node_index: 0,
            name: "Left".to_owned(),
            weight: 0.25,
        },
    ));
    node.plugs_mut(PlugType::Child).push(Plug::RandomSelector(
        RandomSelectorPlug {
            node_index: 1,
            name: "Right".to_owned(),
            weight: 0.75,
        },
    ));
    nodes.push(node);

    let mut node = Node::new(NodeType::UserDefined);
    node.index = 7;
    node.name = "SelectorBSABrainVerbUpdater".to_owned();
    node.guid = guid(0x17);
    node.plugs_mut(PlugType::Child).push(Plug::BsaSelectorUpdater(
        BsaSelectorUpdaterPlug {
            node_index: 0,
            name: "Verb".to_owned(),
            unk0: 11,
            unk1: 22,
        },
    ));
    nodes.push(node);

    if version < 0x407 {
        for node in &mut nodes {
            if node.state_info.is_none() {
                node.state_info = Some(StateInfo::default());
            }
        }
    }

    Ainb {
        version,
        filename: "Sample.action.root".to_owned(),
        category: "AI".to_owned(),
        commands: vec![Command {
            name: "Root".to_owned(),
            root_node_index: 2,
            guid_1: guid(1),
            guid_2: guid(2),
        }],
        nodes,
        blackboard: Some(sample_blackboard()),
        expressions: Some(sample_expression_module()),
        replacement_table: if version >= 0x407 {
            vec![
                ReplacementEntry {
                    replace_type: ReplacementType::RemoveChild,
                    node_index: 2,
                    replace_index: 0,
                    new_index: -1,
                },
                ReplacementEntry {
                    replace_type: ReplacementType::ReplaceChild,
                    node_index: 2,
                    replace_index: 1,
                    new_index: 0,
                },
                ReplacementEntry {
                    replace_type: ReplacementType::RemoveAttachment,
                    node_index: 0,
                    replace_index: 0,
                    new_index: -1,
                },
            ]
        } else {
            Vec::new()
        },
        modules: vec![Module {
            path: "SubGraph.ainb".to_owned(),
            category: "AI".to_owned(),
            instance_count: 1,
        }],
        unk_section_0x58: Some(UnknownSection0x58 {
            description: "leftover".to_owned(),
            unk04: 4,
            unk08: 8,
            unk0c: 12,
        }),
        blackboard_id: 0,
        parent_blackboard_id: 42,
    }
}

#[rstest]
#[case(0x404)]
#[case(0x407)]
fn binary_round_trip(#[case] version: u32) {
    let ainb = sample_ainb(version);
    let encoded = ainb.to_binary().unwrap();

    let mut sink = CollectSink::new();
    let decoded = Ainb::from_binary_with(
        encoded,
        &EnumDb::default(),
        &mut sink,
    )
    .unwrap();
    assert!(sink.warnings.is_empty(), "{:?}", sink.warnings);
    assert_eq!(decoded.as_dict(), ainb.as_dict());

    // decode(encode(decode(B))) must keep the structural view stable
    let decoded_again =
        Ainb::from_binary(decoded.to_binary().unwrap(), &EnumDb::default())
            .unwrap();
    assert_eq!(decoded_again.as_dict(), decoded.as_dict());
}

#[rstest]
#[case(0x404)]
#[case(0x407)]
fn json_round_trip(#[case] version: u32) {
    let ainb = sample_ainb(version);
    let restored = Ainb::from_json_text(&ainb.to_json()).unwrap();
    assert_eq!(restored.as_dict(), ainb.as_dict());
}

#[test]
fn selector_default_is_last_child() {
    let ainb = sample_ainb(0x407);
    let decoded =
        Ainb::from_binary(ainb.to_binary().unwrap(), &EnumDb::default())
            .unwrap();
    let selector = decoded.get_node(2).unwrap();
    let children = selector.child_plugs();
    for (i, plug) in children.iter().enumerate() {
        let Plug::S32Selector(plug) = plug else {
            panic!("expected an S32 selector plug");
        };
        assert_eq!(plug.is_default, i == children.len() - 1);
    }
    let dict = decoded.as_dict();
    let last = &dict["Nodes"][2]["Plugs"]["Child"][2];
    assert_eq!(last["Is Default"], serde_json::json!(true));
}

#[test]
fn selector_blackboard_condition_survives_binary() {
    let ainb = sample_ainb(0x407);
    let decoded =
        Ainb::from_binary(ainb.to_binary().unwrap(), &EnumDb::default())
            .unwrap();
    let Plug::S32Selector(plug) =
        &decoded.get_node(2).unwrap().child_plugs()[1]
    else {
        panic!("expected an S32 selector plug");
    };
    assert_eq!(plug.blackboard_index, 0);
}

#[test]
fn query_indices_resolve_to_query_nodes() {
    let ainb = sample_ainb(0x407);
    let decoded =
        Ainb::from_binary(ainb.to_binary().unwrap(), &EnumDb::default())
            .unwrap();
    for node in &decoded.nodes {
        for query in &node.queries {
            let target = decoded.get_node(*query as usize).unwrap();
            assert!(target.flags.is_query());
        }
    }
    assert_eq!(decoded.get_node(0).unwrap().queries, vec![1]);
}

#[test]
fn multi_source_inputs_resolve() {
    let ainb = sample_ainb(0x407);
    let decoded =
        Ainb::from_binary(ainb.to_binary().unwrap(), &EnumDb::default())
            .unwrap();
    let node = decoded.get_node(0).unwrap();
    let sum = node
        .params
        .inputs(ParamType::Int)
        .iter()
        .find(|input| input.name == "Sum")
        .unwrap();
    assert!(sum.flags.is_multi());
    assert_eq!(sum.flags.arity(), 2);
    assert_eq!(sum.flags.operator(), 1);
    assert_eq!(sum.sources.len(), 2);
    assert_eq!(sum.sources[1].output_index, 1);
}

#[test]
fn source_flag_bitfields() {
    let flag = SourceFlag::from_raw(0x8000_0005);
    assert!(flag.is_blackboard());
    assert!(!flag.is_expression());
    assert!(!flag.is_multi());
    assert_eq!(flag.index(), 5);

    let flag = SourceFlag::from_raw(0x2102_0000);
    assert!(flag.is_multi());
    assert_eq!(flag.operator(), 1);
    assert_eq!(flag.arity(), 2);
}

#[test]
fn invalid_magic_is_fatal() {
    let err = Ainb::from_binary(b"XINB\x07\x04\0\0".to_vec(), &EnumDb::default())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AinbError>(),
        Some(AinbError::InvalidMagic { .. })
    ));
}

#[test]
fn unsupported_version_is_fatal() {
    let err = Ainb::from_binary(b"AIB \x08\x04\0\0".to_vec(), &EnumDb::default())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AinbError>(),
        Some(AinbError::UnsupportedVersion { version: 0x408 })
    ));
}

#[test]
fn truncated_header_is_fatal() {
    let err = Ainb::from_binary(b"AIB ".to_vec(), &EnumDb::default())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AinbError>(),
        Some(AinbError::OutOfBounds { .. })
    ));
}

#[test]
fn misplaced_selector_default_is_fatal() {
    let mut ainb = sample_ainb(0x407);
    // a selector whose last child is a live condition has no default case
    let node = &mut ainb.nodes[2];
    node.plugs_mut(PlugType::Child).clear();
    node.plugs_mut(PlugType::Child).push(Plug::S32Selector(
        S32SelectorPlug {
            node_index: 0,
            name: "OnlyCase".to_owned(),
            condition: 5,
            ..S32SelectorPlug::default()
        },
    ));
    let err =
        Ainb::from_binary(ainb.to_binary().unwrap(), &EnumDb::default())
            .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AinbError>(),
        Some(AinbError::InvalidDefaultCase { .. })
    ));
}

#[test]
fn inconsistent_node_index_warns() {
    let mut ainb = sample_ainb(0x407);
    ainb.nodes[7].index = 9;
    let mut sink = CollectSink::new();
    let decoded = Ainb::from_binary_with(
        ainb.to_binary().unwrap(),
        &EnumDb::default(),
        &mut sink,
    )
    .unwrap();
    assert!(sink.contains(WarningKind::InconsistentNodeIndex));
    assert_eq!(decoded.nodes[7].index, 9);
}

#[test]
fn missing_module_warns() {
    let mut ainb = sample_ainb(0x407);
    ainb.modules.clear();
    let mut sink = CollectSink::new();
    let _ = Ainb::from_binary_with(
        ainb.to_binary().unwrap(),
        &EnumDb::default(),
        &mut sink,
    )
    .unwrap();
    assert!(sink.contains(WarningKind::MissingModule));
}

#[test]
fn replacement_table_requires_v407() {
    let ainb = sample_ainb(0x404);
    let dict = ainb.as_dict();
    assert!(dict.get("Replacement Table").is_none());
    let dict = sample_ainb(0x407).as_dict();
    assert_eq!(dict["Replacement Table"].as_array().unwrap().len(), 3);
}

#[test]
fn node_index_mismatch_rejected_from_dict() {
    let ainb = sample_ainb(0x407);
    let mut dict = ainb.as_dict();
    dict["Nodes"][0]["Node Index"] = serde_json::json!(5);
    let err = Ainb::from_dict(&dict).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AinbError>(),
        Some(AinbError::DictDecode(_))
    ));
}

#[test]
fn pointer_blackboard_default_must_be_null() {
    let ainb = sample_ainb(0x407);
    let mut dict = ainb.as_dict();
    dict["Blackboard"]["VoidPtr"][0]["Default Value"] =
        serde_json::json!(1);
    let err = Ainb::from_dict(&dict).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AinbError>(),
        Some(AinbError::DictDecode(_))
    ));
}

#[test]
fn unknown_section_0x58_round_trips() {
    let ainb = sample_ainb(0x404);
    let decoded =
        Ainb::from_binary(ainb.to_binary().unwrap(), &EnumDb::default())
            .unwrap();
    let section = decoded.unk_section_0x58.as_ref().unwrap();
    assert_eq!(section.description, "leftover");
    assert_eq!((section.unk04, section.unk08, section.unk0c), (4, 8, 12));
    let dict = decoded.as_dict();
    assert_eq!(
        dict["Unknown Section 0x58"]["Unknown08"],
        serde_json::json!(8)
    );
}

#[test]
fn module_nodes_match_module_table() {
    let ainb = sample_ainb(0x407);
    let mut sink = CollectSink::new();
    let decoded = Ainb::from_binary_with(
        ainb.to_binary().unwrap(),
        &EnumDb::default(),
        &mut sink,
    )
    .unwrap();
    assert!(!sink.contains(WarningKind::MissingModule));
    for node in &decoded.nodes {
        if node.flags.is_module() {
            let path = format!("{}.ainb", node.name);
            assert!(decoded.modules.iter().any(|m| m.path == path));
        }
    }
}

#[test]
fn command_lookup() {
    let ainb = sample_ainb(0x407);
    assert_eq!(ainb.get_command_by_name("Root").unwrap().root_node_index, 2);
    assert!(ainb.get_command_by_name("Missing").is_none());
    assert!(ainb.get_command(0).is_some());
    assert!(ainb.get_command(1).is_none());
}

#[test]
fn state_info_only_in_v404() {
    let decoded = Ainb::from_binary(
        sample_ainb(0x404).to_binary().unwrap(),
        &EnumDb::default(),
    )
    .unwrap();
    assert!(decoded.nodes.iter().all(|node| node.state_info.is_some()));
    let dict = decoded.as_dict();
    assert_eq!(
        dict["Nodes"][0]["State Info"]["Desired State"],
        serde_json::json!("Attacking")
    );

    let decoded = Ainb::from_binary(
        sample_ainb(0x407).to_binary().unwrap(),
        &EnumDb::default(),
    )
    .unwrap();
    assert!(decoded.nodes.iter().all(|node| node.state_info.is_none()));
}
