// (C) 2020 Brandon Lewis
//
// A reference interpreter for the LSCVM stack machine.
//
// This exists to close the loop on the compiler: every artifact the
// translator emits can be executed here and checked against the
// source program's meaning, without a copy of the real machine.
//
// *Execution Model*
//
// A program is a flat string of single-character instructions; the
// instruction pointer is an index into it. There is a data stack of
// integer cells, a separate return-address stack, and a linear heap.
// Execution halts cleanly when the instruction pointer runs off the
// end of the program, or when the explicit exit instruction runs.
//
// *Jumps*
//
// Go and ConditionalJump are relative: a jump of n lands n characters
// past the instruction that follows the jump. Call is absolute and
// pushes the return address on the call stack.
//
// *Validity*
//
// The set of runtime errors is represented by the Error enum in this
// file. All are non-recoverable. A fuel limit bounds execution so a
// wayward program cannot hang the test suite.

use std::fmt;
use std::io;
use std::io::Write;

use crate::opcode::Opcode;


pub type Result<T> = core::result::Result<T, Error>;

pub const HEAP_SIZE: usize = 0x1000;
const DEFAULT_FUEL: u64 = 10_000_000;


#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Underflow,
    IllegalOpcode(char),
    IllegalJump(i64),
    HeapFault(i64),
    StackIndex(i64),
    DivideByZero,
    ReturnWithoutCall,
    OutOfFuel,
    Halt,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Underflow => write!(f, "stack underflow"),
            Error::IllegalOpcode(c) => write!(f, "illegal opcode {:?}", c),
            Error::IllegalJump(ip) => write!(f, "jump out of program: {}", ip),
            Error::HeapFault(addr) => write!(f, "heap address out of range: {}", addr),
            Error::StackIndex(i) => write!(f, "stack depth out of range: {}", i),
            Error::DivideByZero => write!(f, "division by zero"),
            Error::ReturnWithoutCall => write!(f, "return with no call in flight"),
            Error::OutOfFuel => write!(f, "execution did not terminate"),
            Error::Halt => write!(f, "halt"),
        }
    }
}


// Where the I and P instructions send their output.
pub trait Output {
    fn put_num(&mut self, value: i64);
    fn put_char(&mut self, value: i64);
}

// Collect output in memory; what the tests use.
impl Output for String {
    fn put_num(&mut self, value: i64) {
        self.push_str(&value.to_string());
    }

    fn put_char(&mut self, value: i64) {
        self.push((value as u8) as char);
    }
}

impl Output for io::Stdout {
    fn put_num(&mut self, value: i64) {
        let _ = write!(self, "{}", value);
    }

    fn put_char(&mut self, value: i64) {
        let _ = write!(self, "{}", (value as u8) as char);
    }
}


// The type of control flow an instruction can have.
enum ControlFlow {
    Advance,
    // Relative: skip this many characters past the next instruction.
    Skip(i64),
    // Absolute target, for call and return.
    Jump(usize),
}


// The entire VM state.
#[derive(Debug)]
pub struct Machine {
    code: Vec<Opcode>,
    stack: Vec<i64>,
    heap: Vec<i64>,
    calls: Vec<usize>,
    ip: usize,
    fuel: u64,
}

impl Machine {
    // Decode an opcode string. Any character outside the alphabet is
    // rejected up front rather than at execution time.
    pub fn new(program: &str) -> Result<Machine> {
        let code = program
            .chars()
            .map(|c| Opcode::decode(c).ok_or(Error::IllegalOpcode(c)))
            .collect::<Result<Vec<Opcode>>>()?;

        Ok(Machine {
            code,
            stack: Vec::new(),
            heap: vec![0; HEAP_SIZE],
            calls: Vec::new(),
            ip: 0,
            fuel: DEFAULT_FUEL,
        })
    }

    pub fn set_fuel(&mut self, fuel: u64) {
        self.fuel = fuel;
    }

    // Run from a clean slate until the program halts.
    pub fn exec(&mut self, out: &mut impl Output) -> Result<()> {
        self.ip = 0;
        self.stack.clear();
        self.calls.clear();
        for cell in self.heap.iter_mut() {
            *cell = 0;
        }

        loop {
            match self.step(out) {
                Err(Error::Halt) => return Ok(()),
                Err(e) => return Err(e),
                Ok(()) => continue,
            }
        }
    }

    // Single-step the program.
    pub fn step(&mut self, out: &mut impl Output) -> Result<()> {
        if self.fuel == 0 {
            return Err(Error::OutOfFuel);
        }
        self.fuel -= 1;

        let opcode = self.fetch()?;
        trace!("{:?} {:?} {:?}", self.ip, opcode, self.stack);

        match self.dispatch(opcode, out)? {
            ControlFlow::Advance => {
                self.ip += 1;
            }
            ControlFlow::Skip(n) => {
                let target = self.ip as i64 + 1 + n;
                if target < 0 || target > self.code.len() as i64 {
                    return Err(Error::IllegalJump(target));
                }
                self.ip = target as usize;
            }
            ControlFlow::Jump(target) => {
                self.ip = target;
            }
        }

        Ok(())
    }

    fn fetch(&self) -> Result<Opcode> {
        let len = self.code.len();
        if self.ip < len {
            Ok(self.code[self.ip])
        } else if self.ip == len {
            Err(Error::Halt)
        } else {
            Err(Error::IllegalJump(self.ip as i64))
        }
    }

    pub fn pop(&mut self) -> Result<i64> {
        self.stack.pop().ok_or(Error::Underflow)
    }

    pub fn push(&mut self, value: i64) {
        self.stack.push(value);
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn stack(&self) -> &[i64] {
        &self.stack
    }

    pub fn heap_read(&self, addr: i64) -> Result<i64> {
        if addr < 0 || addr >= self.heap.len() as i64 {
            Err(Error::HeapFault(addr))
        } else {
            Ok(self.heap[addr as usize])
        }
    }

    fn heap_write(&mut self, addr: i64, value: i64) -> Result<()> {
        if addr < 0 || addr >= self.heap.len() as i64 {
            Err(Error::HeapFault(addr))
        } else {
            self.heap[addr as usize] = value;
            Ok(())
        }
    }

    // Index from the top of the stack: 0 is the top itself.
    fn find_slot(&self, depth: i64) -> Result<usize> {
        if depth < 0 || depth >= self.stack.len() as i64 {
            Err(Error::StackIndex(depth))
        } else {
            Ok(self.stack.len() - 1 - depth as usize)
        }
    }

    fn call(&mut self) -> Result<ControlFlow> {
        let target = self.pop()?;
        if target < 0 || target >= self.code.len() as i64 {
            return Err(Error::IllegalJump(target));
        }
        self.calls.push(self.ip + 1);
        Ok(ControlFlow::Jump(target as usize))
    }

    fn ret(&mut self) -> Result<ControlFlow> {
        let target = self.calls.pop().ok_or(Error::ReturnWithoutCall)?;
        Ok(ControlFlow::Jump(target))
    }

    fn conditional_jump(&mut self) -> Result<ControlFlow> {
        // The jump distance is pushed last, on top of the condition.
        let offset = self.pop()?;
        let cond = self.pop()?;
        Ok(if cond == 0 {
            ControlFlow::Skip(offset)
        } else {
            ControlFlow::Advance
        })
    }

    fn binary(&mut self, op: Opcode) -> Result<ControlFlow> {
        let b = self.pop()?;
        let a = self.pop()?;
        let value = match op {
            Opcode::StackAdd => a + b,
            Opcode::StackSubtract => a - b,
            Opcode::StackMultiply => a * b,
            Opcode::StackDivide => {
                if b == 0 {
                    return Err(Error::DivideByZero);
                }
                a / b
            }
            Opcode::StackCompare => (a - b).signum(),
            _ => unreachable!(),
        };
        self.push(value);
        Ok(ControlFlow::Advance)
    }

    fn dispatch(&mut self, op: Opcode, out: &mut impl Output) -> Result<ControlFlow> {
        match op {
            Opcode::Nop => Ok(ControlFlow::Advance),
            Opcode::Push(v) => {
                self.push(v);
                Ok(ControlFlow::Advance)
            }
            Opcode::Call => self.call(),
            Opcode::Return => self.ret(),
            Opcode::Go => {
                let n = self.pop()?;
                Ok(ControlFlow::Skip(n))
            }
            Opcode::ConditionalJump => self.conditional_jump(),
            Opcode::Exit => Err(Error::Halt),
            Opcode::PrintNum => {
                let v = self.pop()?;
                out.put_num(v);
                Ok(ControlFlow::Advance)
            }
            Opcode::PrintAscii => {
                let v = self.pop()?;
                out.put_char(v);
                Ok(ControlFlow::Advance)
            }
            Opcode::HeapRead => {
                let addr = self.pop()?;
                let value = self.heap_read(addr)?;
                self.push(value);
                Ok(ControlFlow::Advance)
            }
            Opcode::HeapWrite => {
                let addr = self.pop()?;
                let value = self.pop()?;
                self.heap_write(addr, value)?;
                Ok(ControlFlow::Advance)
            }
            Opcode::StackFind => {
                let depth = self.pop()?;
                let slot = self.find_slot(depth)?;
                let value = self.stack[slot];
                self.push(value);
                Ok(ControlFlow::Advance)
            }
            Opcode::StackFindRemove => {
                let depth = self.pop()?;
                let slot = self.find_slot(depth)?;
                let value = self.stack.remove(slot);
                self.push(value);
                Ok(ControlFlow::Advance)
            }
            Opcode::StackDrop => {
                self.pop()?;
                Ok(ControlFlow::Advance)
            }
            Opcode::StackCompare
            | Opcode::StackAdd
            | Opcode::StackSubtract
            | Opcode::StackMultiply
            | Opcode::StackDivide => self.binary(op),
        }
    }
}


// Decode and run a program to completion.
pub fn run(program: &str, out: &mut impl Output) -> Result<Machine> {
    let mut machine = Machine::new(program)?;
    machine.exec(out)?;
    Ok(machine)
}
