use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    bytecode::{
        CodeObject,
        compile_error::CompileError,
        ir::CodeFlags,
        op::{Instruction, Opcode, OpcodeTable},
        stack_check::{check_balanced, max_stack_depth},
        table::InternTable,
    },
    lang::{
        node::{BinOp, Node, Target},
        value::Constant,
    },
};

/// Identification fields written into every code object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenOptions {
    /// Source name, e.g. the file the tree was parsed from.
    pub filename: String,
    /// Entry name of the compiled unit.
    pub name: String,
    /// Line number the unit starts at.
    pub firstlineno: u32,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            filename: "<stdin>".to_string(),
            name: "<module>".to_string(),
            firstlineno: 1,
        }
    }
}

/// Work left on the way back up a left spine.
enum Spine<'n> {
    /// Emit the right operand, then `BINARY_ADD`.
    Add(&'n Node),
    /// Emit the arguments, then `CALL_FUNCTION`.
    Call(&'n [Node]),
}

/// Translates one tree into one [`CodeObject`].
///
/// A `CodeGen` owns the constant and name tables for a single compilation;
/// [`CodeGen::compile`] consumes it, so tables are never shared between code
/// objects.
pub struct CodeGen<'t> {
    opcodes: &'t OpcodeTable,
    options: CodegenOptions,

    constants: InternTable<Constant>,
    names: InternTable<String>,
}

impl<'t> CodeGen<'t> {
    pub fn new(opcodes: &'t OpcodeTable) -> Self {
        Self::with_options(opcodes, CodegenOptions::default())
    }

    pub fn with_options(opcodes: &'t OpcodeTable, options: CodegenOptions) -> Self {
        Self {
            opcodes,
            options,
            constants: InternTable::new(),
            names: InternTable::new(),
        }
    }

    /// Compiles `module` into a code object.
    ///
    /// The body is followed by `LOAD_CONST None; RETURN_VALUE`, separated from
    /// it like any other statement, so every unit ends in an explicit return.
    pub fn compile(mut self, module: &Node) -> Result<CodeObject, CompileError> {
        let body = self.emit(module)?;

        let none = self.constants.intern(Constant::None);
        let tail = vec![
            Instruction::with_arg(Opcode::LoadConst, none)
                .map_err(|e| CompileError::operand(e, "constant pool"))?,
            Instruction::RETURN_VALUE,
        ];
        let instrs = sequence([body, tail]);

        let stacksize = max_stack_depth(&instrs)?;
        check_balanced(&instrs)?;

        let mut code = Vec::with_capacity(instrs.iter().map(|i| i.opcode().width()).sum());
        for instr in &instrs {
            instr.write_to(self.opcodes, &mut code);
        }

        let code_object = CodeObject {
            argcount: 0,
            kwonlyargcount: 0,
            nlocals: 0,
            stacksize: stacksize as u32,
            flags: CodeFlags::module_default(),
            code,
            consts: self.constants.into_pool(),
            names: self.names.into_pool(),
            varnames: Vec::new(),
            filename: self.options.filename,
            name: self.options.name,
            firstlineno: self.options.firstlineno,
            lnotab: Vec::new(),
            freevars: Vec::new(),
            cellvars: Vec::new(),
        };

        info!(
            name = %code_object.name,
            bytes = code_object.code.len(),
            consts = code_object.consts.len(),
            names = code_object.names.len(),
            stacksize,
            "assembled code object"
        );

        Ok(code_object)
    }

    /// Emits the instructions for one node.
    ///
    /// Expressions leave exactly one value on the stack.
    pub fn emit(&mut self, node: &Node) -> Result<Vec<Instruction>, CompileError> {
        match node {
            Node::Num(n) => {
                let idx = self.intern_const(Constant::from(*n));
                Ok(vec![self.arg_instr(Opcode::LoadConst, idx, "constant pool")?])
            }

            // All name lookups are global.
            Node::Name(id) => {
                let idx = self.intern_name(id);
                Ok(vec![self.arg_instr(Opcode::LoadGlobal, idx, "name pool")?])
            }

            // Left operands and callees are walked iteratively so that long
            // chains like `1 + 1 + ... + 1` or `f()()...()` emit in constant
            // stack space.
            Node::BinOp { .. } | Node::Call { .. } => {
                let mut pending = Vec::new();
                let mut leaf = node;
                loop {
                    match leaf {
                        Node::BinOp { left, op, right } => {
                            if *op != BinOp::Add {
                                return Err(CompileError::unsupported_operator(*op));
                            }
                            pending.push(Spine::Add(right.as_ref()));
                            leaf = left.as_ref();
                        }
                        Node::Call { func, args } => {
                            pending.push(Spine::Call(args));
                            leaf = func.as_ref();
                        }
                        _ => break,
                    }
                }

                let mut ops = self.emit(leaf)?;
                for step in pending.into_iter().rev() {
                    match step {
                        Spine::Add(right) => {
                            ops.extend(self.emit(right)?);
                            ops.push(Instruction::BINARY_ADD);
                        }
                        Spine::Call(args) => {
                            ops.extend(self.emit_all(args)?);
                            ops.push(self.arg_instr(
                                Opcode::CallFunction,
                                args.len(),
                                "call argument count",
                            )?);
                        }
                    }
                }
                Ok(ops)
            }

            Node::Expr(value) => self.emit(value),

            Node::Assign { targets, value } => {
                let name = match targets.as_slice() {
                    [Target::Name(name)] => name,
                    _ => return Err(CompileError::unsupported_targets(targets)),
                };
                let mut ops = self.emit(value)?;
                // the assignment's own value stays on the stack
                ops.push(Instruction::DUP_TOP);
                let idx = self.intern_name(name);
                ops.push(self.arg_instr(Opcode::StoreGlobal, idx, "name pool")?);
                Ok(ops)
            }

            Node::Module(body) => {
                let mut codes = Vec::with_capacity(body.len());
                for (i, stmt) in body.iter().enumerate() {
                    let ops = self.emit(stmt)?;
                    debug!(stmt = i, kind = stmt.kind(), ops = ops.len(), "emitted statement");
                    codes.push(ops);
                }
                Ok(sequence(codes))
            }
        }
    }

    /// Emits `nodes` back to back, left to right.
    fn emit_all(&mut self, nodes: &[Node]) -> Result<Vec<Instruction>, CompileError> {
        let mut ops = Vec::new();
        for node in nodes {
            ops.extend(self.emit(node)?);
        }
        Ok(ops)
    }

    fn intern_const(&mut self, value: Constant) -> usize {
        match self.constants.lookup(&value) {
            Some(idx) => idx,
            None => {
                debug!(index = self.constants.len(), %value, "constant");
                self.constants.intern(value)
            }
        }
    }

    fn intern_name(&mut self, name: &str) -> usize {
        match self.names.lookup(name) {
            Some(idx) => idx,
            None => {
                let idx = self.names.intern(name.to_string());
                debug!(index = idx, name, "name");
                idx
            }
        }
    }

    fn arg_instr(
        &self,
        opcode: Opcode,
        index: usize,
        context: &'static str,
    ) -> Result<Instruction, CompileError> {
        Instruction::with_arg(opcode, index).map_err(|e| CompileError::operand(e, context))
    }
}

/// Joins statement sequences, discarding each statement's leftover value
/// before the next one starts.
///
/// `POP_TOP` goes between consecutive non-empty inputs only; empty inputs are
/// skipped.
pub fn sequence(codes: impl IntoIterator<Item = Vec<Instruction>>) -> Vec<Instruction> {
    let mut result: Vec<Instruction> = Vec::new();
    for code in codes {
        if code.is_empty() {
            continue;
        }
        if !result.is_empty() {
            result.push(Instruction::POP_TOP);
        }
        result.extend(code);
    }
    result
}

/// Compiles `module` with a fresh [`CodeGen`].
pub fn compile(
    module: &Node,
    opcodes: &OpcodeTable,
    options: CodegenOptions,
) -> Result<CodeObject, CompileError> {
    CodeGen::with_options(opcodes, options).compile(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::Opcode::*;

    fn compile_module(body: Vec<Node>) -> Result<CodeObject, CompileError> {
        CodeGen::new(&OpcodeTable::classic()).compile(&Node::module(body))
    }

    fn listing(code: &CodeObject) -> Vec<(Opcode, Option<u16>)> {
        code.instructions(&OpcodeTable::classic())
            .unwrap()
            .into_iter()
            .map(|(_, i)| (i.opcode(), i.operand()))
            .collect()
    }

    fn emit(node: &Node) -> Result<Vec<Instruction>, CompileError> {
        let table = OpcodeTable::classic();
        CodeGen::new(&table).emit(node)
    }

    fn a_equals_2_plus_3() -> Node {
        Node::assign("a", Node::binop(Node::int(2), BinOp::Add, Node::int(3)))
    }

    #[test]
    fn test_empty_module() {
        let code = compile_module(vec![]).unwrap();

        assert_eq!(listing(&code), vec![(LoadConst, Some(0)), (ReturnValue, None)]);
        assert_eq!(code.consts(), &[Constant::None]);
        assert!(code.names().is_empty());
        assert_eq!(code.stacksize(), 1);
    }

    #[test]
    fn test_assignment_pools() {
        let code = compile_module(vec![a_equals_2_plus_3()]).unwrap();

        assert_eq!(
            code.consts(),
            &[Constant::Int(2), Constant::Int(3), Constant::None]
        );
        assert_eq!(code.names(), &["a".to_string()]);
    }

    #[test]
    fn test_end_to_end_listing() {
        // a = 2 + 3; print(a, 137)
        let code = compile_module(vec![
            a_equals_2_plus_3(),
            Node::expr(Node::call(
                Node::name("print"),
                vec![Node::name("a"), Node::int(137)],
            )),
        ])
        .unwrap();

        assert_eq!(
            code.consts(),
            &[
                Constant::Int(2),
                Constant::Int(3),
                Constant::Int(137),
                Constant::None
            ]
        );
        assert_eq!(code.names(), &["a".to_string(), "print".to_string()]);
        assert_eq!(
            listing(&code),
            vec![
                (LoadConst, Some(0)),
                (LoadConst, Some(1)),
                (BinaryAdd, None),
                (DupTop, None),
                (StoreGlobal, Some(0)),
                (PopTop, None),
                (LoadGlobal, Some(1)),
                (LoadGlobal, Some(0)),
                (LoadConst, Some(2)),
                (CallFunction, Some(2)),
                (PopTop, None),
                (LoadConst, Some(3)),
                (ReturnValue, None),
            ]
        );
        assert_eq!(code.stacksize(), 3);
    }

    #[test]
    fn test_bytes_are_little_endian_with_host_numbering() {
        let code = compile_module(vec![Node::expr(Node::int(7))]).unwrap();

        // LOAD_CONST 0, POP_TOP, LOAD_CONST 1, RETURN_VALUE
        assert_eq!(code.code(), &[100, 0, 0, 1, 100, 1, 0, 83]);
    }

    #[test]
    fn test_custom_opcode_table_changes_bytes_only() {
        let custom = OpcodeTable::classic()
            .with_overrides([(LoadConst, 1), (PopTop, 2)])
            .unwrap();
        let node = Node::module(vec![Node::expr(Node::int(7))]);

        let code = CodeGen::new(&custom).compile(&node).unwrap();

        assert_eq!(code.code(), &[1, 0, 0, 2, 1, 1, 0, 83]);
        let decoded: Vec<_> = code
            .instructions(&custom)
            .unwrap()
            .into_iter()
            .map(|(_, i)| i.opcode())
            .collect();
        assert_eq!(decoded, vec![LoadConst, PopTop, LoadConst, ReturnValue]);
    }

    #[test]
    fn test_statements_separated_by_single_discard() {
        let ops = emit(&Node::module(vec![
            Node::expr(Node::call(Node::name("f"), vec![])),
            Node::expr(Node::call(Node::name("g"), vec![])),
        ]))
        .unwrap();

        let listing: Vec<_> = ops.iter().map(|i| i.opcode()).collect();
        assert_eq!(
            listing,
            vec![LoadGlobal, CallFunction, PopTop, LoadGlobal, CallFunction]
        );
        assert_eq!(listing.iter().filter(|op| **op == PopTop).count(), 1);
        assert_ne!(listing.last(), Some(&PopTop));
    }

    #[test]
    fn test_duplicate_constants_are_shared() {
        let mut sum = Node::int(9);
        for _ in 0..5 {
            sum = Node::binop(sum, BinOp::Add, Node::int(9));
        }
        let code = compile_module(vec![Node::expr(sum)]).unwrap();

        assert_eq!(code.consts(), &[Constant::Int(9), Constant::None]);
    }

    #[test]
    fn test_int_and_float_literals_get_separate_slots() {
        let code = compile_module(vec![Node::expr(Node::binop(
            Node::int(2),
            BinOp::Add,
            Node::float(2.0),
        ))])
        .unwrap();

        assert_eq!(code.consts().len(), 3);
    }

    #[test]
    fn test_repeated_name_reuses_index() {
        let code = compile_module(vec![
            Node::assign("x", Node::int(1)),
            Node::expr(Node::binop(Node::name("x"), BinOp::Add, Node::name("x"))),
        ])
        .unwrap();

        assert_eq!(code.names(), &["x".to_string()]);
    }

    #[test]
    fn test_call_argument_order() {
        let ops = emit(&Node::call(
            Node::name("f"),
            vec![Node::int(1), Node::name("y"), Node::int(3)],
        ))
        .unwrap();

        assert_eq!(
            ops,
            vec![
                Instruction::with_arg(LoadGlobal, 0).unwrap(),
                Instruction::with_arg(LoadConst, 0).unwrap(),
                Instruction::with_arg(LoadGlobal, 1).unwrap(),
                Instruction::with_arg(LoadConst, 1).unwrap(),
                Instruction::with_arg(CallFunction, 3).unwrap(),
            ]
        );
    }

    #[test]
    fn test_nested_call_stacksize() {
        // print(pow(2, 16))
        let code = compile_module(vec![Node::expr(Node::call(
            Node::name("print"),
            vec![Node::call(
                Node::name("pow"),
                vec![Node::int(2), Node::int(16)],
            )],
        ))])
        .unwrap();

        assert_eq!(code.stacksize(), 4);
    }

    #[test]
    fn test_subtraction_is_unsupported() {
        let err = compile_module(vec![Node::expr(Node::binop(
            Node::int(5),
            BinOp::Sub,
            Node::int(3),
        ))])
        .unwrap_err();

        assert_eq!(err, CompileError::UnsupportedOperator { op: BinOp::Sub });
    }

    #[test]
    fn test_unsupported_operator_inside_call_argument() {
        let err = emit(&Node::call(
            Node::name("f"),
            vec![Node::binop(Node::int(1), BinOp::Mul, Node::int(2))],
        ))
        .unwrap_err();

        assert!(matches!(
            err,
            CompileError::UnsupportedOperator { op: BinOp::Mul }
        ));
    }

    #[test]
    fn test_tuple_target_is_unsupported() {
        let node = Node::Assign {
            targets: vec![Target::Tuple(vec![
                Target::Name("a".to_string()),
                Target::Name("b".to_string()),
            ])],
            value: Box::new(Node::int(1)),
        };

        let err = compile_module(vec![node]).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnsupportedAssignmentTarget { targets: 1, .. }
        ));
    }

    #[test]
    fn test_chained_assignment_is_unsupported() {
        let node = Node::Assign {
            targets: vec![Target::Name("a".to_string()), Target::Name("b".to_string())],
            value: Box::new(Node::int(1)),
        };

        let err = emit(&node).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnsupportedAssignmentTarget { targets: 2, .. }
        ));
    }

    #[test]
    fn test_empty_target_list_is_unsupported() {
        let node = Node::Assign {
            targets: vec![],
            value: Box::new(Node::int(1)),
        };

        assert!(matches!(
            emit(&node),
            Err(CompileError::UnsupportedAssignmentTarget { targets: 0, .. })
        ));
    }

    #[test]
    fn test_too_many_call_arguments() {
        let args = vec![Node::int(0); 65_536];
        let err = emit(&Node::call(Node::name("f"), args)).unwrap_err();

        assert_eq!(
            err,
            CompileError::OperandOverflow {
                value: 65_536,
                context: "call argument count"
            }
        );
    }

    #[test]
    fn test_too_many_constants() {
        let args = (0..=65_536).map(Node::int).collect();

        let err = emit(&Node::call(Node::name("f"), args)).unwrap_err();
        assert_eq!(
            err,
            CompileError::OperandOverflow {
                value: 65_536,
                context: "constant pool"
            }
        );
    }

    #[test]
    fn test_long_addition_chain() {
        let mut chain = Node::int(1);
        for _ in 0..99_999 {
            chain = Node::binop(chain, BinOp::Add, Node::int(1));
        }
        let print = Node::call(Node::name("print"), vec![chain]);
        let code = compile_module(vec![Node::expr(print)]).unwrap();

        assert_eq!(code.consts(), &[Constant::Int(1), Constant::None]);
        assert_eq!(code.names(), &["print".to_string()]);
        assert_eq!(code.stacksize(), 3);

        let ops = listing(&code);
        assert_eq!(ops.len(), 1 + 100_000 + 99_999 + 1 + 1 + 2);
        assert_eq!(
            &ops[..4],
            &[
                (LoadGlobal, Some(0)),
                (LoadConst, Some(0)),
                (LoadConst, Some(0)),
                (BinaryAdd, None),
            ]
        );
    }

    #[test]
    fn test_long_call_chain() {
        let mut callee = Node::name("f");
        for _ in 0..100_000 {
            callee = Node::call(callee, vec![]);
        }
        let ops = emit(&callee).unwrap();

        assert_eq!(ops.len(), 100_001);
        assert_eq!(ops[0], Instruction::with_arg(LoadGlobal, 0).unwrap());
        let call = Instruction::with_arg(CallFunction, 0).unwrap();
        assert!(ops[1..].iter().all(|i| *i == call));
    }

    #[test]
    fn test_mixed_left_spine_order() {
        // (g + 1)(2) + 3
        let node = Node::binop(
            Node::call(
                Node::binop(Node::name("g"), BinOp::Add, Node::int(1)),
                vec![Node::int(2)],
            ),
            BinOp::Add,
            Node::int(3),
        );
        let ops: Vec<_> = emit(&node).unwrap().iter().map(|i| i.opcode()).collect();

        assert_eq!(
            ops,
            vec![LoadGlobal, LoadConst, BinaryAdd, LoadConst, CallFunction, LoadConst, BinaryAdd]
        );
    }

    #[test]
    fn test_unsupported_operator_deep_in_chain() {
        let mut chain = Node::binop(Node::int(1), BinOp::Sub, Node::int(2));
        for _ in 0..10_000 {
            chain = Node::binop(chain, BinOp::Add, Node::int(1));
        }

        assert_eq!(
            emit(&chain).unwrap_err(),
            CompileError::unsupported_operator(BinOp::Sub)
        );
    }

    #[test]
    fn test_options_are_copied_into_metadata() {
        let options = CodegenOptions {
            filename: "demo.py".to_string(),
            name: "demo".to_string(),
            firstlineno: 7,
        };
        let code = compile(&Node::module(vec![]), &OpcodeTable::classic(), options).unwrap();

        assert_eq!(code.filename(), "demo.py");
        assert_eq!(code.name(), "demo");
        assert_eq!(code.firstlineno(), 7);
        assert_eq!(code.argcount(), 0);
        assert_eq!(code.kwonlyargcount(), 0);
        assert_eq!(code.nlocals(), 0);
        assert_eq!(code.flags(), CodeFlags::module_default());
        assert!(code.varnames().is_empty());
        assert!(code.lnotab().is_empty());
        assert!(code.freevars().is_empty());
        assert!(code.cellvars().is_empty());
    }

    #[test]
    fn test_compilations_do_not_share_tables() {
        let table = OpcodeTable::classic();
        let first = CodeGen::new(&table)
            .compile(&Node::module(vec![Node::expr(Node::int(11))]))
            .unwrap();
        let second = CodeGen::new(&table)
            .compile(&Node::module(vec![Node::expr(Node::int(22))]))
            .unwrap();

        assert_eq!(first.consts(), &[Constant::Int(11), Constant::None]);
        assert_eq!(second.consts(), &[Constant::Int(22), Constant::None]);
    }

    #[test]
    fn test_serialized_round_trip() {
        let code = compile_module(vec![a_equals_2_plus_3()]).unwrap();
        let bytes = code.to_bytes().unwrap();

        assert_eq!(CodeObject::from_bytes(&bytes).unwrap(), code);
    }

    #[test]
    fn test_sequence_skips_empty_inputs() {
        let a = vec![Instruction::BINARY_ADD];
        let joined = sequence([vec![], a.clone(), vec![], a.clone(), vec![]]);

        assert_eq!(
            joined,
            vec![
                Instruction::BINARY_ADD,
                Instruction::POP_TOP,
                Instruction::BINARY_ADD,
            ]
        );
        assert!(sequence(Vec::<Vec<Instruction>>::new()).is_empty());
    }
}
