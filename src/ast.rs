use std::rc::Rc;


// Abstract over various memory management strategies.
pub type Node<T> = Rc<T>;


// Arithmetic operations the target machine implements directly.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}


// Relational operators. All six are synthesized from the machine's
// single compare primitive at lowering time.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
}


#[derive(Copy, Clone, Debug, PartialEq)]
pub enum BoolOp {
    And,
    Or,
}


// ADT for expressions.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Num(i64),
    Name(String),
    List(Vec<Expr>),
    Index(Node<Expr>, Node<Expr>),
    Bin(BinOp, Node<Expr>, Node<Expr>),
    Logic(BoolOp, Vec<Expr>),
    // A chain `a < b < c` parses as one node with several operators.
    // The translator accepts exactly one.
    Compare {
        left: Node<Expr>,
        ops: Vec<CmpOp>,
        rights: Vec<Expr>,
    },
    Call(Node<Expr>, Vec<Expr>),
}


// ADT for statements. The source line rides along so translation
// errors can point back at the input.
#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}


#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Assign(Expr, Expr),
    AugAssign(Expr, BinOp, Expr),
    Expr(Expr),
    If(Expr, Vec<Stmt>, Vec<Stmt>),
    While(Expr, Vec<Stmt>),
    Def(String, Vec<String>, Vec<Stmt>),
    Return(Option<Expr>),
    Import(String),
    Pass,
}


// Shorthand constructors. The parser tests and the translator tests
// build trees with these rather than spelling out Rc::new everywhere.

pub fn num(n: i64) -> Expr {
    Expr::Num(n)
}

pub fn name(id: &str) -> Expr {
    Expr::Name(String::from(id))
}

pub fn bin(op: BinOp, l: Expr, r: Expr) -> Expr {
    Expr::Bin(op, Node::new(l), Node::new(r))
}

pub fn cmp(op: CmpOp, l: Expr, r: Expr) -> Expr {
    Expr::Compare {
        left: Node::new(l),
        ops: vec![op],
        rights: vec![r],
    }
}

pub fn index(base: Expr, i: Expr) -> Expr {
    Expr::Index(Node::new(base), Node::new(i))
}

pub fn call(func: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call(Node::new(func), args)
}

pub fn stmt(line: usize, kind: StmtKind) -> Stmt {
    Stmt { line, kind }
}
