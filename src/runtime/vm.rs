use std::fmt;
use std::io::Write;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::bytecode::{CodeObject, Opcode, OpcodeTable};
use crate::lang::value::Constant;
use crate::runtime::runtime_error::{RuntimeError, type_error};

/// Functions available to every code object without being stored first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Pow,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Pow => "pow",
        }
    }

    fn lookup(name: &str) -> Option<Builtin> {
        match name {
            "print" => Some(Builtin::Print),
            "pow" => Some(Builtin::Pow),
            _ => None,
        }
    }
}

/// Runtime value on the host's stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Int(i64),
    Float(f64),
    Builtin(Builtin),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Builtin(_) => "builtin_function",
        }
    }
}

impl From<&Constant> for Value {
    fn from(c: &Constant) -> Self {
        match c {
            Constant::None => Value::None,
            Constant::Int(n) => Value::Int(*n),
            Constant::Float(n) => Value::Float(n.0),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{:?}", n),
            Value::Builtin(b) => write!(f, "<built-in function {}>", b.name()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub max_steps: Option<usize>,
    pub max_stack_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_steps: None,
            max_stack_size: 10_000,
        }
    }
}

/// Executes code objects against a value stack and a globals namespace.
///
/// Globals persist across [`Vm::run`] calls, so several units can share
/// state the way statements in one session would.
pub struct Vm<W: Write> {
    opcodes: OpcodeTable,
    stack: Vec<Value>,
    globals: FxHashMap<String, Value>,
    out: W,
    config: VmConfig,
    steps: usize,
}

impl<W: Write> Vm<W> {
    pub fn new(opcodes: OpcodeTable, out: W) -> Self {
        Self::with_config(opcodes, out, VmConfig::default())
    }

    pub fn with_config(opcodes: OpcodeTable, out: W, config: VmConfig) -> Self {
        Self {
            opcodes,
            stack: Vec::new(),
            globals: FxHashMap::default(),
            out,
            config,
            steps: 0,
        }
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Runs `code` to its `RETURN_VALUE` and yields the returned value.
    pub fn run(&mut self, code: &CodeObject) -> Result<Value, RuntimeError> {
        let instrs = code.instructions(&self.opcodes)?;

        self.steps = 0;
        self.stack.clear();
        self.stack.reserve(code.stacksize() as usize);

        for (offset, instr) in instrs {
            self.check_limits()?;
            trace!(
                offset,
                op = instr.opcode().name(),
                arg = ?instr.operand(),
                depth = self.stack.len()
            );

            match instr.opcode() {
                Opcode::LoadConst => {
                    let index = instr.arg();
                    let c = code.consts().get(index).ok_or(RuntimeError::BadOperand {
                        index,
                        pool: "constant",
                        offset,
                    })?;
                    self.stack.push(Value::from(c));
                }
                Opcode::LoadGlobal => {
                    let name = Self::name_at(code, instr.arg(), offset)?;
                    let value = match self.globals.get(name) {
                        Some(v) => v.clone(),
                        None => Builtin::lookup(name)
                            .map(Value::Builtin)
                            .ok_or_else(|| RuntimeError::UndefinedName(name.to_string()))?,
                    };
                    self.stack.push(value);
                }
                Opcode::StoreGlobal => {
                    let name = Self::name_at(code, instr.arg(), offset)?;
                    let value = self.pop(offset, "STORE_GLOBAL")?;
                    self.globals.insert(name.to_string(), value);
                }
                Opcode::BinaryAdd => {
                    let b = self.pop(offset, "BINARY_ADD")?;
                    let a = self.pop(offset, "BINARY_ADD")?;
                    self.stack.push(add(a, b)?);
                }
                Opcode::CallFunction => {
                    let argc = instr.arg();
                    if self.stack.len() < argc + 1 {
                        return Err(RuntimeError::StackUnderflow {
                            offset,
                            op: "CALL_FUNCTION",
                        });
                    }
                    let args = self.stack.split_off(self.stack.len() - argc);
                    let callee = self.pop(offset, "CALL_FUNCTION")?;
                    let result = self.call(callee, args)?;
                    self.stack.push(result);
                }
                Opcode::ReturnValue => return self.pop(offset, "RETURN_VALUE"),
                Opcode::PopTop => {
                    self.pop(offset, "POP_TOP")?;
                }
                Opcode::DupTop => {
                    let top = self
                        .stack
                        .last()
                        .cloned()
                        .ok_or(RuntimeError::StackUnderflow {
                            offset,
                            op: "DUP_TOP",
                        })?;
                    self.stack.push(top);
                }
            }
        }

        Err(RuntimeError::MissingReturn)
    }

    fn check_limits(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(RuntimeError::Limit(format!(
                    "execution step limit exceeded ({})",
                    max
                )));
            }
        }

        if self.stack.len() > self.config.max_stack_size {
            return Err(RuntimeError::Limit(format!(
                "stack size limit exceeded ({})",
                self.config.max_stack_size
            )));
        }

        Ok(())
    }

    fn name_at(code: &CodeObject, index: usize, offset: usize) -> Result<&str, RuntimeError> {
        code.names()
            .get(index)
            .map(String::as_str)
            .ok_or(RuntimeError::BadOperand {
                index,
                pool: "name",
                offset,
            })
    }

    fn pop(&mut self, offset: usize, op: &'static str) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or(RuntimeError::StackUnderflow { offset, op })
    }

    fn call(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match callee {
            Value::Builtin(Builtin::Print) => {
                let line: Vec<String> = args.iter().map(ToString::to_string).collect();
                writeln!(self.out, "{}", line.join(" "))?;
                Ok(Value::None)
            }
            Value::Builtin(Builtin::Pow) => match args.as_slice() {
                [base, exp] => pow(base, exp),
                _ => Err(type_error(format!(
                    "pow expected 2 arguments, got {}",
                    args.len()
                ))),
            },
            other => Err(type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }
}

fn add(a: Value, b: Value) -> Result<Value, RuntimeError> {
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => x
            .checked_add(*y)
            .map(Value::Int)
            .ok_or(RuntimeError::Overflow("addition")),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(*x as f64 + y)),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(x + *y as f64)),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x + y)),
        _ => Err(type_error(format!(
            "unsupported operand type(s) for +: '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn pow(base: &Value, exp: &Value) -> Result<Value, RuntimeError> {
    match (base, exp) {
        (Value::Int(b), Value::Int(e)) if *e >= 0 => {
            let e = u32::try_from(*e).map_err(|_| RuntimeError::Overflow("pow"))?;
            b.checked_pow(e)
                .map(Value::Int)
                .ok_or(RuntimeError::Overflow("pow"))
        }
        (Value::Int(b), Value::Int(e)) => Ok(Value::Float((*b as f64).powf(*e as f64))),
        (Value::Int(b), Value::Float(e)) => Ok(Value::Float((*b as f64).powf(*e))),
        (Value::Float(b), Value::Int(e)) => Ok(Value::Float(b.powf(*e as f64))),
        (Value::Float(b), Value::Float(e)) => Ok(Value::Float(b.powf(*e))),
        _ => Err(type_error(format!(
            "unsupported operand type(s) for pow: '{}' and '{}'",
            base.type_name(),
            exp.type_name()
        ))),
    }
}
