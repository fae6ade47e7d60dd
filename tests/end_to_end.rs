use bytecomp::bytecode::{CodeGen, CodeObject, CompileError, Opcode, OpcodeTable, disasm};
use bytecomp::frontend::parse_source;
use bytecomp::lang::node::BinOp;
use bytecomp::lang::value::Constant;
use bytecomp::runtime::{Value, Vm};

const DEMO: &str = "
a = 2+3
print(a, 137)
print(pow(2, 16))
";

fn compile_source(source: &str) -> Result<CodeObject, CompileError> {
    let module = parse_source(source).expect("source should parse");
    CodeGen::new(&OpcodeTable::classic()).compile(&module)
}

fn run(code: &CodeObject) -> String {
    let mut vm = Vm::new(OpcodeTable::classic(), Vec::new());
    assert_eq!(vm.run(code).unwrap(), Value::None);
    String::from_utf8(vm.into_output()).unwrap()
}

fn opcodes(code: &CodeObject) -> Vec<Opcode> {
    code.instructions(&OpcodeTable::classic())
        .unwrap()
        .into_iter()
        .map(|(_, i)| i.opcode())
        .collect()
}

#[test]
fn demo_program_runs() {
    let code = compile_source(DEMO).unwrap();

    assert_eq!(
        code.consts(),
        &[
            Constant::Int(2),
            Constant::Int(3),
            Constant::Int(137),
            Constant::Int(16),
            Constant::None
        ]
    );
    assert_eq!(code.names(), &["a", "print", "pow"]);
    assert_eq!(run(&code), "5 137\n65536\n");
}

#[test]
fn assignment_then_call_matches_expected_stream() {
    let code = compile_source("a = 2 + 3; print(a, 137)").unwrap();

    use Opcode::*;
    assert_eq!(
        opcodes(&code),
        vec![
            LoadConst,
            LoadConst,
            BinaryAdd,
            DupTop,
            StoreGlobal,
            PopTop,
            LoadGlobal,
            LoadGlobal,
            LoadConst,
            CallFunction,
            PopTop,
            LoadConst,
            ReturnValue,
        ]
    );
    assert_eq!(
        code.code(),
        &[
            100, 0, 0, 100, 1, 0, 23, 4, 97, 0, 0, 1, 116, 1, 0, 116, 0, 0, 100, 2, 0, 131, 2,
            0, 1, 100, 3, 0, 83
        ]
    );
}

#[test]
fn empty_source_is_just_a_return() {
    let code = compile_source("\n# nothing here\n").unwrap();

    assert_eq!(opcodes(&code), vec![Opcode::LoadConst, Opcode::ReturnValue]);
    assert_eq!(code.consts(), &[Constant::None]);
    assert_eq!(run(&code), "");
}

#[test]
fn two_calls_have_one_separator_in_the_body() {
    let code = compile_source("f()\ng()").unwrap();
    let ops = opcodes(&code);

    // body: f() POP_TOP g(), then POP_TOP before the trailing return
    let body = &ops[..ops.len() - 3];
    assert_eq!(body.iter().filter(|op| **op == Opcode::PopTop).count(), 1);
    assert_eq!(ops[ops.len() - 3], Opcode::PopTop);
}

#[test]
fn subtraction_is_rejected() {
    let err = compile_source("print(5 - 3)").unwrap_err();
    assert_eq!(err, CompileError::UnsupportedOperator { op: BinOp::Sub });
}

#[test]
fn tuple_assignment_is_rejected() {
    let err = compile_source("a, b = 1").unwrap_err();
    assert!(matches!(
        err,
        CompileError::UnsupportedAssignmentTarget { .. }
    ));
}

#[test]
fn serialized_code_runs_after_reload() {
    let code = compile_source(DEMO).unwrap();
    let reloaded = CodeObject::from_bytes(&code.to_bytes().unwrap()).unwrap();

    assert_eq!(reloaded, code);
    assert_eq!(run(&reloaded), "5 137\n65536\n");
}

#[test]
fn custom_opcode_numbering_round_trips_through_host() {
    let table = OpcodeTable::classic()
        .with_overrides([(Opcode::LoadConst, 10), (Opcode::CallFunction, 11)])
        .unwrap();
    let module = parse_source(DEMO).unwrap();
    let code = CodeGen::new(&table).compile(&module).unwrap();

    let mut vm = Vm::new(table.clone(), Vec::new());
    vm.run(&code).unwrap();
    assert_eq!(String::from_utf8(vm.into_output()).unwrap(), "5 137\n65536\n");

    let listing = disasm::disassemble(&code, &table).unwrap();
    assert!(listing.contains("CALL_FUNCTION"));
}

#[test]
fn long_addition_chain_compiles_and_runs() {
    let source = format!("print({})", vec!["1"; 100_000].join("+"));
    let code = compile_source(&source).unwrap();

    assert_eq!(code.consts(), &[Constant::Int(1), Constant::None]);
    assert_eq!(code.stacksize(), 3);
    assert_eq!(run(&code), "100000\n");
}

#[test]
fn deeply_nested_parentheses_are_a_parse_error() {
    let source = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
    let err = parse_source(&source).unwrap_err();

    assert!(err.to_string().contains("nested more than"));
}
