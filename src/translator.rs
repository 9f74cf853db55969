// (C) 2020 Brandon Lewis
//
// The code generator: lowers a source tree onto the LSCVM opcode
// alphabet.
//
// Translation is a strictly forward, single-pass pipeline once the
// tree is known. A discovery pass over the top level allocates heap
// cells for every global and array; each function is then compiled
// in source order, accumulating the instruction offset the next one
// will start at; finally the top-level statements are lowered. The
// output program leads with a fixed-width hop over the function
// block into the main body.
//
// Every expression lowering leaves exactly one value on the stack,
// and every statement lowering leaves the depth unchanged. The
// control-flow constructs lean on those two facts: the machine only
// has a conditional relative hop that fires on zero, so the six
// relational operators, and/or, if/else and while are all spelled
// out of compare, arithmetic, and jump-distance literals measured
// from the already-lowered pieces.
//
// A translator is built for one translation; errors are fatal and
// carry the source line where one is available.

use std::fmt;

use crate::ast::{BinOp, BoolOp, CmpOp, Expr, Stmt, StmtKind};
use crate::heap::{self, Heap, Layout};
use crate::num;
use crate::opcode::Opcode;
use crate::parser;


pub type Result<T> = core::result::Result<T, Error>;


#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Parse(parser::Error),
    Layout(heap::Error),
    Heap { line: usize, cause: heap::Error },
    Unsupported { line: usize, what: String },
    UnknownFunction { line: usize, name: String },
    NegativeLiteral { line: usize, value: i64 },
    PrologueTooLong { need: usize, limit: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Parse(e) => write!(f, "{}", e),
            Error::Layout(e) => write!(f, "{}", e),
            Error::Heap { line, cause } => write!(f, "line {}: {}", line, cause),
            Error::Unsupported { line, what } => write!(
                f, "line {}: unsupported: {}", line, what
            ),
            Error::UnknownFunction { line, name } => write!(
                f, "line {}: call to undefined function {}", line, name
            ),
            Error::NegativeLiteral { line, value } => write!(
                f, "line {}: negative literals are not supported: {}", line, value
            ),
            Error::PrologueTooLong { need, limit } => write!(
                f,
                "program prologue needs {} characters but function_offset_start is {}",
                need, limit
            ),
        }
    }
}

impl From<parser::Error> for Error {
    fn from(e: parser::Error) -> Error {
        Error::Parse(e)
    }
}


// Rewrite the sign left behind by a compare into a strict boolean.
//
// `d Z` consumes the sign: when it is zero the hop lands past the
// three-character false arm `a b G`, on the trailing push of 1; any
// other sign falls into the false arm, which pushes 0 and hops over
// that same trailing push.
const TRUE_IF_ZERO: &str = "dZabGb";

// The same shape with the arms swapped.
const TRUE_IF_NONZERO: &str = "dZbbGa";

// The non-strict comparisons accept two of the three signs, so the
// sign is duplicated and tested twice: once for equality, and once
// shifted by one for the strict side. The equality path has to drop
// the duplicate that survives it.
fn true_if_zero_or(adjust: Opcode) -> String {
    format!("aFhZb{}hZafGDbbGb", adjust.ch())
}


fn arith(op: BinOp) -> Opcode {
    match op {
        BinOp::Add => Opcode::StackAdd,
        BinOp::Sub => Opcode::StackSubtract,
        BinOp::Mul => Opcode::StackMultiply,
        BinOp::Div => Opcode::StackDivide,
    }
}


// Whether a subscript is being read through or stored through.
#[derive(Copy, Clone, PartialEq)]
enum Access {
    Load,
    Store,
}


// One compiled function: where its body begins in the finished
// program, and the body itself.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub offset: i64,
    pub opcodes: String,
}


pub struct Translator {
    heap: Heap,
    // Insertion order decides where each body lands.
    functions: Vec<Function>,
    // Instruction offset the next function body will start at.
    funcs_len: i64,
    opcodes: String,
}

// Compile a source string with the default heap layout.
pub fn compile(source: &str) -> Result<String> {
    let mut translator = Translator::new(Layout::default());
    translator.translate(source)
}

impl Translator {
    pub fn new(layout: Layout) -> Translator {
        Translator {
            funcs_len: layout.function_offset_start as i64,
            heap: Heap::new(layout),
            functions: Vec::new(),
            opcodes: String::new(),
        }
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    // Translate one program. A translator holds the allocation state
    // for exactly one translation; build a fresh one per source.
    pub fn translate(&mut self, source: &str) -> Result<String> {
        let tree = parser::parse(source)?;
        self.translate_tree(&tree)?;
        Ok(self.opcodes.clone())
    }

    fn translate_tree(&mut self, tree: &[Stmt]) -> Result<()> {
        self.heap.layout().validate().map_err(Error::Layout)?;

        self.discover_globals(tree)?;

        for s in tree {
            if let StmtKind::Def(name, params, body) = &s.kind {
                self.function(s.line, name, params, body)?;
            }
        }

        if !self.functions.is_empty() {
            let pad = self.prologue()?;
            let mut bodies = String::new();
            for f in &self.functions {
                bodies.push_str(&f.opcodes);
            }
            self.opcodes.push_str(&bodies);
            // Filler the hop was measured against; never executed.
            for _ in 0..pad {
                self.opcodes.push(Opcode::Nop.ch());
            }
        }

        for s in tree {
            match &s.kind {
                StmtKind::Def(_, _, _) => {}
                _ => {
                    let code = self.statement(s)?;
                    self.opcodes.push_str(&code);
                }
            }
        }

        Ok(())
    }

    // Push the collective length of the function bodies and hop over
    // them. The hop must fit the reserved width exactly, because the
    // function offsets were computed assuming it.
    //
    // An awkward total (a large prime, say) can need a literal wider
    // than the reservation. The block is then grown with trailing
    // filler until its length reaches a value the encoder can spell
    // compactly; function offsets are unaffected. Only when no such
    // length is in reach does translation abort.
    fn prologue(&mut self) -> Result<i64> {
        const PAD_LIMIT: i64 = 8192;

        let width = self.heap.layout().function_offset_start;
        let total = self.funcs_len - width as i64;

        let mut pad = 0;
        let literal = loop {
            let literal = num::encode(total + pad);
            if literal.len() + 1 <= width {
                break literal;
            }
            pad += 1;
            if pad > PAD_LIMIT {
                return Err(Error::PrologueTooLong {
                    need: num::encode(total).len() + 1,
                    limit: width,
                });
            }
        };
        if pad > 0 {
            trace!("function block padded by {} to reach {}", pad, total + pad);
        }

        self.opcodes.push_str(&literal);
        for _ in literal.len()..width - 1 {
            self.opcodes.push(Opcode::Nop.ch());
        }
        self.opcodes.push(Opcode::Go.ch());
        Ok(pad)
    }

    // Collect every assignment target outside the function bodies,
    // descending through top-level control flow but never into a
    // definition. A list literal on the right declares an array; any
    // other value declares a scalar global. Stores through a
    // subscript mutate an existing array and declare nothing.
    fn discover_globals(&mut self, tree: &[Stmt]) -> Result<()> {
        for s in tree {
            match &s.kind {
                StmtKind::Assign(target, value) => match (target, value) {
                    (Expr::Name(name), Expr::List(items)) => {
                        self.heap
                            .alloc_array(name, items.len() as i64)
                            .map_err(|e| Error::Heap { line: s.line, cause: e })?;
                    }
                    (Expr::Name(name), _) => {
                        self.heap
                            .alloc_global(name)
                            .map_err(|e| Error::Heap { line: s.line, cause: e })?;
                    }
                    _ => {}
                },
                StmtKind::If(_, body, orelse) => {
                    self.discover_globals(body)?;
                    self.discover_globals(orelse)?;
                }
                StmtKind::While(_, body) => {
                    self.discover_globals(body)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    // Collect the names a function body assigns, descending through
    // its control flow but never into a nested definition.
    fn discover_locals(&mut self, body: &[Stmt]) -> Result<()> {
        for s in body {
            match &s.kind {
                StmtKind::Assign(Expr::Name(name), Expr::List(_)) => {
                    return Err(Error::Unsupported {
                        line: s.line,
                        what: format!("array {} declared inside a function", name),
                    });
                }
                StmtKind::Assign(Expr::Name(name), _) => {
                    self.heap
                        .alloc_local(name)
                        .map_err(|e| Error::Heap { line: s.line, cause: e })?;
                }
                StmtKind::AugAssign(Expr::Name(name), _, _) => {
                    self.heap
                        .alloc_local(name)
                        .map_err(|e| Error::Heap { line: s.line, cause: e })?;
                }
                StmtKind::If(_, body, orelse) => {
                    self.discover_locals(body)?;
                    self.discover_locals(orelse)?;
                }
                StmtKind::While(_, body) => {
                    self.discover_locals(body)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn function(
        &mut self,
        line: usize,
        name: &str,
        params: &[String],
        body: &[Stmt],
    ) -> Result<()> {
        trace!("function {} at ip {}", name, self.funcs_len);

        // Enter the table before compiling the body so the function
        // can call itself.
        let index = self.functions.len();
        self.functions.push(Function {
            name: String::from(name),
            offset: self.funcs_len,
            opcodes: String::new(),
        });

        for param in params {
            self.heap
                .alloc_local(param)
                .map_err(|e| Error::Heap { line, cause: e })?;
        }

        // Callers push arguments left to right, so the last argument
        // is on top: spill them into their cells in reverse.
        let mut out = String::new();
        for param in params.iter().rev() {
            let offset = self
                .heap
                .resolve(param)
                .map_err(|e| Error::Heap { line, cause: e })?;
            out.push_str(&num::encode(offset));
            out.push(Opcode::HeapWrite.ch());
        }

        self.discover_locals(body)?;

        for s in body {
            let code = self.statement(s)?;
            out.push_str(&code);
        }
        out.push(Opcode::Return.ch());

        self.heap.clear_locals();
        self.funcs_len += out.len() as i64;
        self.functions[index].opcodes = out;
        Ok(())
    }

    fn block(&self, body: &[Stmt]) -> Result<String> {
        let mut out = String::new();
        for s in body {
            out.push_str(&self.statement(s)?);
        }
        Ok(out)
    }

    fn statement(&self, s: &Stmt) -> Result<String> {
        let line = s.line;
        match &s.kind {
            StmtKind::Assign(target, value) => self.assign(line, target, value),
            StmtKind::AugAssign(target, op, value) => {
                self.aug_assign(line, target, *op, value)
            }
            // A bare expression may leave its value behind; the
            // stack is not tidied after it.
            StmtKind::Expr(e) => self.expression(line, e),
            StmtKind::If(test, body, orelse) => {
                self.conditional(line, test, body, orelse)
            }
            StmtKind::While(test, body) => self.while_loop(line, test, body),
            // The value is left for the function trailer's Return.
            StmtKind::Return(value) => match value {
                Some(e) => self.expression(line, e),
                None => Ok(String::new()),
            },
            StmtKind::Import(module) => {
                if module == "stubs" {
                    Ok(String::new())
                } else {
                    Err(Error::Unsupported {
                        line,
                        what: format!("import of {}", module),
                    })
                }
            }
            StmtKind::Pass => Ok(String::new()),
            StmtKind::Def(name, _, _) => Err(Error::Unsupported {
                line,
                what: format!("nested function definition {}", name),
            }),
        }
    }

    fn assign(&self, line: usize, target: &Expr, value: &Expr) -> Result<String> {
        match target {
            Expr::Name(name) => {
                if let Expr::List(items) = value {
                    // Array initialization: one store per element.
                    let array = self
                        .heap
                        .array(name)
                        .map_err(|e| Error::Heap { line, cause: e })?
                        .clone();
                    let mut out = String::new();
                    for (i, item) in items.iter().enumerate() {
                        out.push_str(&self.expression(line, item)?);
                        out.push_str(&num::encode(array.offset + i as i64));
                        out.push(Opcode::HeapWrite.ch());
                    }
                    Ok(out)
                } else {
                    let mut out = self.expression(line, value)?;
                    out.push_str(&self.write_var(line, name)?);
                    Ok(out)
                }
            }
            Expr::Index(base, i) => {
                let mut out = self.expression(line, value)?;
                out.push_str(&self.subscript(line, base, i, Access::Store)?);
                Ok(out)
            }
            t => Err(Error::Unsupported {
                line,
                what: format!("assignment target {:?}", t),
            }),
        }
    }

    fn aug_assign(
        &self,
        line: usize,
        target: &Expr,
        op: BinOp,
        value: &Expr,
    ) -> Result<String> {
        let name = match target {
            Expr::Name(n) => n,
            t => {
                return Err(Error::Unsupported {
                    line,
                    what: format!("augmented assignment to {:?}", t),
                })
            }
        };
        let mut out = self.read_var(line, name)?;
        out.push_str(&self.expression(line, value)?);
        out.push(arith(op).ch());
        out.push_str(&self.write_var(line, name)?);
        Ok(out)
    }

    fn read_var(&self, line: usize, name: &str) -> Result<String> {
        let offset = self
            .heap
            .resolve(name)
            .map_err(|e| Error::Heap { line, cause: e })?;
        let mut out = num::encode(offset);
        out.push(Opcode::HeapRead.ch());
        Ok(out)
    }

    fn write_var(&self, line: usize, name: &str) -> Result<String> {
        let offset = self
            .heap
            .resolve(name)
            .map_err(|e| Error::Heap { line, cause: e })?;
        let mut out = num::encode(offset);
        out.push(Opcode::HeapWrite.ch());
        Ok(out)
    }

    // Address arithmetic for `a[i]`: base cell plus index, then read
    // or write through the sum. A store expects the value to already
    // sit under the address.
    fn subscript(
        &self,
        line: usize,
        base: &Expr,
        index: &Expr,
        access: Access,
    ) -> Result<String> {
        let name = match base {
            Expr::Name(n) => n,
            t => {
                return Err(Error::Unsupported {
                    line,
                    what: format!("subscript of {:?}", t),
                })
            }
        };
        let array = self
            .heap
            .array(name)
            .map_err(|e| Error::Heap { line, cause: e })?;
        let mut out = num::encode(array.offset);
        out.push_str(&self.expression(line, index)?);
        out.push(Opcode::StackAdd.ch());
        out.push(match access {
            Access::Load => Opcode::HeapRead.ch(),
            Access::Store => Opcode::HeapWrite.ch(),
        });
        Ok(out)
    }

    fn expression(&self, line: usize, e: &Expr) -> Result<String> {
        match e {
            Expr::Num(n) => {
                if *n < 0 {
                    return Err(Error::NegativeLiteral { line, value: *n });
                }
                Ok(num::encode(*n))
            }
            Expr::Name(name) => self.read_var(line, name),
            Expr::List(_) => Err(Error::Unsupported {
                line,
                what: String::from("list literal outside an array declaration"),
            }),
            Expr::Index(base, i) => self.subscript(line, base, i, Access::Load),
            Expr::Bin(op, l, r) => {
                let mut out = self.expression(line, l)?;
                out.push_str(&self.expression(line, r)?);
                out.push(arith(*op).ch());
                Ok(out)
            }
            // Comparison results are 0 or 1, so conjunction is a
            // product and disjunction is a sum: zero exactly when
            // the combination is false.
            Expr::Logic(op, values) => {
                let mut out = String::new();
                for v in values {
                    out.push_str(&self.expression(line, v)?);
                }
                let joiner = match op {
                    BoolOp::And => Opcode::StackMultiply,
                    BoolOp::Or => Opcode::StackAdd,
                };
                for _ in 1..values.len() {
                    out.push(joiner.ch());
                }
                Ok(out)
            }
            Expr::Compare { left, ops, rights } => {
                self.comparison(line, left, ops, rights)
            }
            Expr::Call(func, args) => self.call(line, func, args),
        }
    }

    fn comparison(
        &self,
        line: usize,
        left: &Expr,
        ops: &[CmpOp],
        rights: &[Expr],
    ) -> Result<String> {
        if ops.len() != 1 {
            return Err(Error::Unsupported {
                line,
                what: String::from("chained comparison"),
            });
        }

        let mut out = self.expression(line, left)?;
        out.push_str(&self.expression(line, &rights[0])?);
        out.push(Opcode::StackCompare.ch());

        // The compare primitive leaves -1, 0 or 1. Shift the sign so
        // the accepted case sits on zero, then rewrite zero to true.
        match ops[0] {
            CmpOp::Eq => out.push_str(TRUE_IF_ZERO),
            CmpOp::NotEq => out.push_str(TRUE_IF_NONZERO),
            CmpOp::Gt => {
                out.push(Opcode::Push(1).ch());
                out.push(Opcode::StackSubtract.ch());
                out.push_str(TRUE_IF_ZERO);
            }
            CmpOp::Lt => {
                out.push(Opcode::Push(1).ch());
                out.push(Opcode::StackAdd.ch());
                out.push_str(TRUE_IF_ZERO);
            }
            CmpOp::GtE => out.push_str(&true_if_zero_or(Opcode::StackSubtract)),
            CmpOp::LtE => out.push_str(&true_if_zero_or(Opcode::StackAdd)),
        }
        Ok(out)
    }

    fn call(&self, line: usize, func: &Expr, args: &[Expr]) -> Result<String> {
        let name = match func {
            Expr::Name(n) => n,
            t => {
                return Err(Error::Unsupported {
                    line,
                    what: format!("indirect call of {:?}", t),
                })
            }
        };

        match name.as_str() {
            "putchar" | "putint" => {
                if args.len() != 1 {
                    return Err(Error::Unsupported {
                        line,
                        what: format!("{} takes exactly one argument", name),
                    });
                }
                let mut out = self.expression(line, &args[0])?;
                out.push(if name == "putchar" {
                    Opcode::PrintAscii.ch()
                } else {
                    Opcode::PrintNum.ch()
                });
                Ok(out)
            }
            // Accepted for source compatibility; there is no string
            // machinery to lower it onto.
            "puts" => Ok(String::new()),
            _ => {
                let function = self
                    .functions
                    .iter()
                    .rev()
                    .find(|f| f.name == *name)
                    .ok_or_else(|| Error::UnknownFunction {
                        line,
                        name: name.clone(),
                    })?;
                let mut out = String::new();
                for arg in args {
                    out.push_str(&self.expression(line, arg)?);
                }
                out.push_str(&num::encode(function.offset));
                out.push(Opcode::Call.ch());
                Ok(out)
            }
        }
    }

    // On a false test, hop over the then arm into the else arm; the
    // then arm ends by hopping over the else arm. Distances are
    // measured from the finished pieces, so both arms are lowered
    // before any literal is emitted.
    fn conditional(
        &self,
        line: usize,
        test: &Expr,
        body: &[Stmt],
        orelse: &[Stmt],
    ) -> Result<String> {
        let test_code = self.expression(line, test)?;
        let mut then_code = self.block(body)?;
        let else_code = self.block(orelse)?;

        then_code.push_str(&num::encode(else_code.len() as i64));
        then_code.push(Opcode::Go.ch());

        let mut out = test_code;
        out.push_str(&num::encode(then_code.len() as i64));
        out.push(Opcode::ConditionalJump.ch());
        out.push_str(&then_code);
        out.push_str(&else_code);
        Ok(out)
    }

    // The loop keeps its own backward jump distance on the stack,
    // under everything the iteration does: each trip duplicates it,
    // runs the test, and either falls through the body into the
    // backward hop or exits and drops both copies.
    fn while_loop(&self, line: usize, test: &Expr, body: &[Stmt]) -> Result<String> {
        let test_code = self.expression(line, test)?;
        let body_code = self.block(body)?;

        // On a false test, hop over the body and its backward jump.
        let exit = num::encode(body_code.len() as i64 + 1);

        // One full trip: the duplicate, the test, the exit literal,
        // the conditional hop, the body, and the backward jump.
        let trip = 2 + test_code.len() + exit.len() + 1 + body_code.len() + 1;

        let mut out = num::encode(-(trip as i64));
        out.push(Opcode::Push(0).ch());
        out.push(Opcode::StackFind.ch());
        out.push_str(&test_code);
        out.push_str(&exit);
        out.push(Opcode::ConditionalJump.ch());
        out.push_str(&body_code);
        out.push(Opcode::Go.ch());
        out.push(Opcode::StackDrop.ch());
        out.push(Opcode::StackDrop.ch());
        Ok(out)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::is_opcode;
    use crate::vm;

    // Compile, checking the output never strays off the alphabet.
    fn build(source: &str) -> String {
        let code = compile(source).unwrap();
        assert!(
            code.chars().all(is_opcode),
            "output left the opcode alphabet: {}",
            code
        );
        code
    }

    fn exec(source: &str) -> (vm::Machine, String) {
        let code = build(source);
        let mut out = String::new();
        let machine = vm::run(&code, &mut out).unwrap();
        (machine, out)
    }

    fn printed(source: &str) -> String {
        let (machine, out) = exec(source);
        // Statements are stack-neutral; anything left over has to
        // come from a bare expression.
        assert_eq!(machine.depth(), 0, "unexpected residue: {:?}", machine.stack());
        out
    }

    #[test]
    fn test_putchar_literal() {
        assert_eq!(build("putchar(72)"), "ijMP");
        assert_eq!(printed("putchar(72)"), "H");
    }

    #[test]
    fn test_putint() {
        assert_eq!(printed("putint(3 + 4 * 2)"), "11");
    }

    #[test]
    fn test_function_call_leaves_result() {
        let (machine, out) = exec("\
def add(a, b):
    c = a + b
    return c
add(2, 3)
");
        assert_eq!(out, "");
        assert_eq!(machine.stack(), &[5]);
    }

    #[test]
    fn test_while_counts() {
        assert_eq!(printed("\
i = 0
while i < 10:
    putint(i)
    i += 1
"), "0123456789");
    }

    #[test]
    fn test_array_walk() {
        assert_eq!(printed("\
a = [3, 1, 4, 1, 5]
i = 0
while i < 5:
    putint(a[i])
    i += 1
"), "31415");
    }

    #[test]
    fn test_if_single_line() {
        assert_eq!(printed("if 3 > 2: putchar(89)"), "Y");
        assert_eq!(printed("if 3 < 2: putchar(89)"), "");
    }

    #[test]
    fn test_if_else() {
        assert_eq!(printed("\
x = 2
if x == 1:
    putchar(65)
else:
    putchar(66)
"), "B");
    }

    #[test]
    fn test_elif_chain() {
        let source = "\
x = {}
if x == 0:
    putchar(97)
elif x == 1:
    putchar(98)
elif x == 2:
    putchar(99)
else:
    putchar(100)
";
        assert_eq!(printed(&source.replace("{}", "0")), "a");
        assert_eq!(printed(&source.replace("{}", "1")), "b");
        assert_eq!(printed(&source.replace("{}", "2")), "c");
        assert_eq!(printed(&source.replace("{}", "7")), "d");
    }

    #[test]
    fn test_all_six_comparisons() {
        // Exercise each operator across all three sign outcomes of
        // the underlying compare.
        for &(l, r) in &[(1, 2), (2, 2), (3, 2)] {
            let cases = [
                ("==", l == r),
                ("!=", l != r),
                ("<", l < r),
                ("<=", l <= r),
                (">", l > r),
                (">=", l >= r),
            ];
            for &(op, expected) in &cases {
                let source = format!("putint({} {} {})\n", l, op, r);
                let want = if expected { "1" } else { "0" };
                assert_eq!(printed(&source), want, "{}", source.trim());
            }
        }
    }

    #[test]
    fn test_boolean_logic() {
        assert_eq!(printed("if 1 < 2 and 2 < 3: putchar(89)"), "Y");
        assert_eq!(printed("if 1 < 2 and 3 < 2: putchar(89)"), "");
        assert_eq!(printed("if 3 < 2 or 1 < 2: putchar(89)"), "Y");
        assert_eq!(printed("if 3 < 2 or 2 < 1: putchar(89)"), "");
        // A lone true operand keeps the sum printable as a boolean.
        assert_eq!(printed("putint(3 < 2 or 1 < 2)"), "1");
    }

    #[test]
    fn test_augmented_assignments() {
        assert_eq!(printed("\
i = 8
i += 3
putint(i)
i -= 1
putint(i)
i *= 2
putint(i)
i /= 5
putint(i)
"), "1110204");
    }

    #[test]
    fn test_subscript_store() {
        assert_eq!(printed("\
a = [1, 2, 3]
a[1] = 9
i = 2
a[i] = a[1] + 1
putint(a[0])
putint(a[1])
putint(a[2])
"), "1910");
    }

    #[test]
    fn test_global_read_from_function() {
        assert_eq!(printed("\
g = 7
def bump():
    return g + 1
putint(bump())
"), "8");
    }

    #[test]
    fn test_argument_order() {
        assert_eq!(printed("\
def sub(a, b):
    return a - b
putint(sub(9, 4))
"), "5");
    }

    #[test]
    fn test_function_calls_earlier_function() {
        assert_eq!(printed("\
def double(n):
    return n * 2
def quad(n):
    return double(double(n))
putint(quad(3))
"), "12");
    }

    #[test]
    fn test_local_loop_in_function() {
        assert_eq!(printed("\
def fact(n):
    r = 1
    while n > 1:
        r *= n
        n -= 1
    return r
putint(fact(5))
"), "120");
    }

    #[test]
    fn test_nested_loops() {
        assert_eq!(printed("\
i = 0
while i < 3:
    j = 0
    while j < 2:
        putint(j)
        j += 1
    i += 1
"), "010101");
    }

    #[test]
    fn test_if_inside_while() {
        assert_eq!(printed("\
i = 0
while i < 6:
    if i / 2 * 2 == i:
        putint(i)
    i += 1
"), "024");
    }

    #[test]
    fn test_hex_literals() {
        assert_eq!(printed("putchar(0x48)"), "H");
    }

    #[test]
    fn test_puts_is_a_noop() {
        assert_eq!(build("puts(42)"), "");
    }

    #[test]
    fn test_stub_import_is_ignored() {
        assert_eq!(build("from stubs import *\nputchar(72)\n"), "ijMP");
    }

    #[test]
    fn test_pass_emits_nothing() {
        assert_eq!(build("pass\n"), "");
    }

    #[test]
    fn test_no_functions_no_prologue() {
        // Without functions, the program starts right at the main
        // body instead of a hop.
        let code = build("putchar(72)");
        assert_eq!(code.len(), 4);
    }

    #[test]
    fn test_prologue_width_and_offsets() {
        let source = "\
def one():
    return 1
def two():
    return 2
putint(one() + two())
";
        let tree = parser::parse(source).unwrap();
        let mut translator = Translator::new(Layout::default());
        translator.translate_tree(&tree).unwrap();
        let code = translator.opcodes.clone();

        // The hop over the function block occupies exactly the
        // reserved width.
        let width = Layout::default().function_offset_start;
        assert_eq!(code.as_bytes()[width - 1], b'G');

        // Each function starts where the table says it does.
        let fns = translator.functions();
        assert_eq!(fns.len(), 2);
        let mut expected = width as i64;
        for f in fns {
            assert_eq!(f.offset, expected);
            assert_eq!(
                &code[f.offset as usize..f.offset as usize + f.opcodes.len()],
                f.opcodes
            );
            expected += f.opcodes.len() as i64;
        }

        // And the program still means what it says.
        let mut out = String::new();
        vm::run(&code, &mut out).unwrap();
        assert_eq!(out, "3");
    }

    #[test]
    fn test_determinism() {
        let source = "\
a = [1, 2]
def f(x):
    return x + a[0]
putint(f(1))
";
        assert_eq!(compile(source), compile(source));
    }

    #[test]
    fn test_unknown_variable() {
        let err = compile("putint(x)\n").unwrap_err();
        match err {
            Error::Heap { line: 1, cause: heap::Error::UnknownVariable(name) } => {
                assert_eq!(name, "x");
            }
            e => panic!("expected an unknown-variable error, got {}", e),
        }
    }

    #[test]
    fn test_unknown_function() {
        let err = compile("frob(1)\n").unwrap_err();
        match err {
            Error::UnknownFunction { line: 1, name } => assert_eq!(name, "frob"),
            e => panic!("expected an unknown-function error, got {}", e),
        }
    }

    #[test]
    fn test_forward_call_is_undefined() {
        // Offsets accumulate in source order, so a body cannot call
        // a function that has not been compiled yet.
        let err = compile("\
def first():
    return second()
def second():
    return 1
").unwrap_err();
        match err {
            Error::UnknownFunction { line, name } => {
                assert_eq!(line, 2);
                assert_eq!(name, "second");
            }
            e => panic!("expected an unknown-function error, got {}", e),
        }
    }

    #[test]
    fn test_negative_literal_rejected() {
        let err = compile("x = -5\n").unwrap_err();
        match err {
            Error::NegativeLiteral { line: 1, value: -5 } => {}
            e => panic!("expected a negative-literal error, got {}", e),
        }
    }

    #[test]
    fn test_chained_comparison_rejected() {
        let err = compile("putint(1 < 2 < 3)\n").unwrap_err();
        match err {
            Error::Unsupported { line: 1, what } => {
                assert!(what.contains("chained"));
            }
            e => panic!("expected an unsupported error, got {}", e),
        }
    }

    #[test]
    fn test_array_inside_function_rejected() {
        let err = compile("\
def f():
    a = [1, 2]
    return a[0]
").unwrap_err();
        match err {
            Error::Unsupported { line: 2, what } => assert!(what.contains("array")),
            e => panic!("expected an unsupported error, got {}", e),
        }
    }

    #[test]
    fn test_nested_def_rejected() {
        let err = compile("\
def outer():
    def inner():
        return 1
    return 2
").unwrap_err();
        match err {
            Error::Unsupported { line: 2, what } => assert!(what.contains("inner")),
            e => panic!("expected an unsupported error, got {}", e),
        }
    }

    #[test]
    fn test_indirect_call_rejected() {
        let err = compile("\
a = [1]
a[0](2)
").unwrap_err();
        match err {
            Error::Unsupported { line: 2, what } => assert!(what.contains("indirect")),
            e => panic!("expected an unsupported error, got {}", e),
        }
    }

    #[test]
    fn test_other_import_rejected() {
        assert!(compile("from os import *\n").is_err());
    }

    #[test]
    fn test_variable_capacity_error() {
        let layout = Layout { max_variables: 2, ..Layout::default() };
        let err = Translator::new(layout)
            .translate("a = 1\nb = 2\nc = 3\n")
            .unwrap_err();
        match &err {
            Error::Heap { line: 3, cause: heap::Error::TooManyVariables(2) } => {}
            e => panic!("expected a capacity error, got {}", e),
        }
        assert!(err.to_string().contains("max_variables"));
    }

    #[test]
    fn test_array_capacity_error() {
        let layout = Layout { max_array: 4, ..Layout::default() };
        let err = Translator::new(layout)
            .translate("a = [1, 2, 3]\nb = [4, 5]\n")
            .unwrap_err();
        match err {
            Error::Heap { line: 2, cause: heap::Error::ArrayRegionFull(4) } => {}
            e => panic!("expected a capacity error, got {}", e),
        }
    }

    #[test]
    fn test_prologue_capacity_error() {
        let layout = Layout { function_offset_start: 3, ..Layout::default() };
        let err = Translator::new(layout)
            .translate("\
def f():
    return 7777
f()
")
            .unwrap_err();
        match err {
            Error::PrologueTooLong { limit: 3, .. } => {}
            e => panic!("expected a prologue error, got {}", e),
        }
    }

    #[test]
    fn test_overlapping_layout_rejected() {
        let layout = Layout { array_offset: 16, ..Layout::default() };
        let err = Translator::new(layout).translate("x = 1\n").unwrap_err();
        match err {
            Error::Layout(heap::Error::BadLayout(_)) => {}
            e => panic!("expected a layout error, got {}", e),
        }
    }

    #[test]
    fn test_parse_errors_propagate() {
        let err = compile("x = \n").unwrap_err();
        match err {
            Error::Parse(e) => assert_eq!(e.line, 1),
            e => panic!("expected a parse error, got {}", e),
        }
    }
}
