// Front end for the source subset.
//
// The grammar is indentation-sensitive, so this is a hand-written
// two-stage parser: a line-oriented lexer that turns leading
// whitespace into Indent/Dedent tokens, and a recursive-descent
// parser over the token stream. Token shapes are recognized with
// anchored regular expressions.
//
// The lexer treats each physical line as one logical line: there is
// no continuation syntax. A suite is either an indented block or a
// single simple statement after the colon.

use regex::Regex;
use std::fmt;

use crate::ast::*;


pub type Result<T> = core::result::Result<T, Error>;


#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}


#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Name(String),
    Num(i64),
    Kw(&'static str),
    Sym(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Clone, Debug)]
struct Token {
    line: usize,
    tok: Tok,
}


const KEYWORDS: &[&str] = &[
    "and", "def", "elif", "else", "from", "if",
    "import", "or", "pass", "return", "while",
];

// Two-character symbols first so `==` never lexes as `=` `=`.
const SYMBOLS: &[&str] = &[
    "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=",
    "+", "-", "*", "/", "<", ">", "=",
    "(", ")", "[", "]", ",", ":",
];


fn tokenize(source: &str) -> Result<Vec<Token>> {
    lazy_static! {
        static ref NAME: Regex = Regex::new(
            r"^[A-Za-z_][A-Za-z0-9_]*"
        ).unwrap();
        static ref HEX: Regex = Regex::new(
            r"^0[xX][0-9a-fA-F]+"
        ).unwrap();
        static ref DEC: Regex = Regex::new(
            r"^[0-9]+"
        ).unwrap();
    }

    let mut toks = Vec::new();
    let mut indents: Vec<usize> = vec![0];
    let mut last_line = 1;

    for (i, raw) in source.lines().enumerate() {
        let line = i + 1;
        let text = match raw.find('#') {
            Some(cut) => &raw[..cut],
            None => raw,
        };
        if text.trim().is_empty() {
            continue;
        }
        last_line = line;

        // Measure indentation; a tab advances to the next multiple
        // of eight columns.
        let mut width = 0;
        let mut start = text.len();
        for (idx, c) in text.char_indices() {
            match c {
                ' ' => width += 1,
                '\t' => width += 8 - width % 8,
                _ => {
                    start = idx;
                    break;
                }
            }
        }
        let mut rest = &text[start..];

        let current = *indents.last().unwrap();
        if width > current {
            indents.push(width);
            toks.push(Token { line, tok: Tok::Indent });
        } else if width < current {
            while width < *indents.last().unwrap() {
                indents.pop();
                toks.push(Token { line, tok: Tok::Dedent });
            }
            if width != *indents.last().unwrap() {
                return Err(Error {
                    line,
                    message: String::from("unindent does not match any outer block"),
                });
            }
        }

        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }

            if let Some(m) = HEX.find(rest) {
                let value = i64::from_str_radix(&m.as_str()[2..], 16)
                    .map_err(|_| Error {
                        line,
                        message: format!("integer literal out of range: {}", m.as_str()),
                    })?;
                toks.push(Token { line, tok: Tok::Num(value) });
                rest = &rest[m.end()..];
            } else if let Some(m) = DEC.find(rest) {
                let value = m.as_str().parse::<i64>()
                    .map_err(|_| Error {
                        line,
                        message: format!("integer literal out of range: {}", m.as_str()),
                    })?;
                toks.push(Token { line, tok: Tok::Num(value) });
                rest = &rest[m.end()..];
            } else if let Some(m) = NAME.find(rest) {
                let word = m.as_str();
                let tok = match KEYWORDS.iter().find(|k| **k == word) {
                    Some(kw) => Tok::Kw(*kw),
                    None => Tok::Name(String::from(word)),
                };
                toks.push(Token { line, tok });
                rest = &rest[m.end()..];
            } else if let Some(sym) = SYMBOLS.iter().find(|s| rest.starts_with(**s)) {
                toks.push(Token { line, tok: Tok::Sym(*sym) });
                rest = &rest[sym.len()..];
            } else {
                return Err(Error {
                    line,
                    message: format!("stray {:?} in input", rest.chars().next().unwrap()),
                });
            }
        }

        toks.push(Token { line, tok: Tok::Newline });
    }

    while indents.len() > 1 {
        indents.pop();
        toks.push(Token { line: last_line, tok: Tok::Dedent });
    }
    toks.push(Token { line: last_line, tok: Tok::Eof });

    Ok(toks)
}


pub fn parse(source: &str) -> Result<Vec<Stmt>> {
    let toks = tokenize(source)?;
    let mut parser = Parser { toks, pos: 0 };
    parser.parse_program()
}


struct Parser {
    toks: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.toks[self.pos].tok
    }

    fn line(&self) -> usize {
        self.toks[self.pos].line
    }

    fn bump(&mut self) -> Tok {
        let tok = self.toks[self.pos].tok.clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok, wanted: &str) -> Result<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            self.err(format!("expected {}, found {:?}", wanted, self.peek()))
        }
    }

    fn err<T>(&self, message: String) -> Result<T> {
        Err(Error { line: self.line(), message })
    }

    fn expect_name(&mut self) -> Result<String> {
        match self.peek().clone() {
            Tok::Name(id) => {
                self.bump();
                Ok(id)
            }
            t => self.err(format!("expected a name, found {:?}", t)),
        }
    }

    fn parse_program(&mut self) -> Result<Vec<Stmt>> {
        let mut out = Vec::new();
        while *self.peek() != Tok::Eof {
            out.push(self.parse_statement()?);
        }
        Ok(out)
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        match self.peek() {
            Tok::Kw("def") => self.parse_def(),
            Tok::Kw("if") => self.parse_if(),
            Tok::Kw("while") => self.parse_while(),
            Tok::Indent => self.err(String::from("unexpected indent")),
            _ => {
                let s = self.parse_simple()?;
                self.expect(&Tok::Newline, "end of statement")?;
                Ok(s)
            }
        }
    }

    fn parse_def(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.bump();
        let name = self.expect_name()?;
        self.expect(&Tok::Sym("("), "`(`")?;
        let mut params = Vec::new();
        if !self.eat(&Tok::Sym(")")) {
            loop {
                params.push(self.expect_name()?);
                if self.eat(&Tok::Sym(",")) {
                    continue;
                }
                self.expect(&Tok::Sym(")"), "`)`")?;
                break;
            }
        }
        let body = self.parse_suite()?;
        Ok(stmt(line, StmtKind::Def(name, params, body)))
    }

    // An `elif` re-enters here, becoming an `if` nested in the
    // orelse of its predecessor.
    fn parse_if(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.bump();
        let test = self.parse_expr()?;
        let body = self.parse_suite()?;
        let orelse = match self.peek() {
            Tok::Kw("elif") => vec![self.parse_if()?],
            Tok::Kw("else") => {
                self.bump();
                self.parse_suite()?
            }
            _ => vec![],
        };
        Ok(stmt(line, StmtKind::If(test, body, orelse)))
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.bump();
        let test = self.parse_expr()?;
        let body = self.parse_suite()?;
        if *self.peek() == Tok::Kw("else") {
            return self.err(String::from("while/else is not supported"));
        }
        Ok(stmt(line, StmtKind::While(test, body)))
    }

    fn parse_suite(&mut self) -> Result<Vec<Stmt>> {
        self.expect(&Tok::Sym(":"), "`:`")?;
        if self.eat(&Tok::Newline) {
            self.expect(&Tok::Indent, "an indented block")?;
            let mut body = Vec::new();
            while !self.eat(&Tok::Dedent) {
                body.push(self.parse_statement()?);
            }
            Ok(body)
        } else {
            let s = self.parse_simple()?;
            self.expect(&Tok::Newline, "end of statement")?;
            Ok(vec![s])
        }
    }

    fn parse_simple(&mut self) -> Result<Stmt> {
        let line = self.line();
        match self.peek() {
            Tok::Kw("return") => {
                self.bump();
                let value = if *self.peek() == Tok::Newline {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                Ok(stmt(line, StmtKind::Return(value)))
            }
            Tok::Kw("pass") => {
                self.bump();
                Ok(stmt(line, StmtKind::Pass))
            }
            Tok::Kw("from") => {
                self.bump();
                let module = self.expect_name()?;
                self.expect(&Tok::Kw("import"), "`import`")?;
                self.expect(&Tok::Sym("*"), "`*`")?;
                Ok(stmt(line, StmtKind::Import(module)))
            }
            _ => {
                let target = self.parse_expr()?;
                let op = match self.peek() {
                    Tok::Sym("=") => {
                        self.bump();
                        let value = self.parse_expr()?;
                        if *self.peek() == Tok::Sym("=") {
                            return self.err(String::from(
                                "cannot assign to more than one target at a time"
                            ));
                        }
                        return Ok(stmt(line, StmtKind::Assign(target, value)));
                    }
                    Tok::Sym("+=") => Some(BinOp::Add),
                    Tok::Sym("-=") => Some(BinOp::Sub),
                    Tok::Sym("*=") => Some(BinOp::Mul),
                    Tok::Sym("/=") => Some(BinOp::Div),
                    _ => None,
                };
                match op {
                    Some(op) => {
                        self.bump();
                        let value = self.parse_expr()?;
                        Ok(stmt(line, StmtKind::AugAssign(target, op, value)))
                    }
                    None => Ok(stmt(line, StmtKind::Expr(target))),
                }
            }
        }
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let first = self.parse_and()?;
        if *self.peek() != Tok::Kw("or") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&Tok::Kw("or")) {
            values.push(self.parse_and()?);
        }
        Ok(Expr::Logic(BoolOp::Or, values))
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let first = self.parse_comparison()?;
        if *self.peek() != Tok::Kw("and") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&Tok::Kw("and")) {
            values.push(self.parse_comparison()?);
        }
        Ok(Expr::Logic(BoolOp::And, values))
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_arith()?;
        let mut ops = Vec::new();
        let mut rights = Vec::new();
        loop {
            let op = match self.peek() {
                Tok::Sym("==") => CmpOp::Eq,
                Tok::Sym("!=") => CmpOp::NotEq,
                Tok::Sym("<") => CmpOp::Lt,
                Tok::Sym("<=") => CmpOp::LtE,
                Tok::Sym(">") => CmpOp::Gt,
                Tok::Sym(">=") => CmpOp::GtE,
                _ => break,
            };
            self.bump();
            rights.push(self.parse_arith()?);
            ops.push(op);
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare { left: Node::new(left), ops, rights })
        }
    }

    fn parse_arith(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Tok::Sym("+") => BinOp::Add,
                Tok::Sym("-") => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let right = self.parse_term()?;
            left = bin(op, left, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_postfix()?;
        loop {
            let op = match self.peek() {
                Tok::Sym("*") => BinOp::Mul,
                Tok::Sym("/") => BinOp::Div,
                _ => break,
            };
            self.bump();
            let right = self.parse_postfix()?;
            left = bin(op, left, right);
        }
        Ok(left)
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut e = self.parse_atom()?;
        loop {
            if self.eat(&Tok::Sym("(")) {
                let mut args = Vec::new();
                if !self.eat(&Tok::Sym(")")) {
                    loop {
                        args.push(self.parse_expr()?);
                        if self.eat(&Tok::Sym(",")) {
                            continue;
                        }
                        self.expect(&Tok::Sym(")"), "`)`")?;
                        break;
                    }
                }
                e = Expr::Call(Node::new(e), args);
            } else if self.eat(&Tok::Sym("[")) {
                let i = self.parse_expr()?;
                self.expect(&Tok::Sym("]"), "`]`")?;
                e = Expr::Index(Node::new(e), Node::new(i));
            } else {
                break;
            }
        }
        Ok(e)
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        match self.peek().clone() {
            Tok::Num(n) => {
                self.bump();
                Ok(Expr::Num(n))
            }
            Tok::Name(id) => {
                self.bump();
                Ok(Expr::Name(id))
            }
            Tok::Sym("(") => {
                self.bump();
                let e = self.parse_expr()?;
                self.expect(&Tok::Sym(")"), "`)`")?;
                Ok(e)
            }
            Tok::Sym("[") => {
                self.bump();
                let mut items = Vec::new();
                if !self.eat(&Tok::Sym("]")) {
                    loop {
                        items.push(self.parse_expr()?);
                        if self.eat(&Tok::Sym(",")) {
                            continue;
                        }
                        self.expect(&Tok::Sym("]"), "`]`")?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            // The sign is folded into the literal; the translator
            // rejects negatives with its own diagnostic.
            Tok::Sym("-") => {
                self.bump();
                match self.peek().clone() {
                    Tok::Num(n) => {
                        self.bump();
                        Ok(Expr::Num(-n))
                    }
                    t => self.err(format!(
                        "unary minus applies only to integer literals, found {:?}", t
                    )),
                }
            }
            t => self.err(format!("unexpected {:?}", t)),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinOp::*;
    use crate::ast::CmpOp::*;

    fn parse_all(text: &str) -> Vec<Stmt> {
        parse(text).unwrap()
    }

    fn assert_parses_to(text: &'static str, ast: Expr) {
        let mut tree = parse_all(text);
        assert_eq!(tree.len(), 1);
        match tree.remove(0).kind {
            StmtKind::Expr(e) => assert_eq!(e, ast),
            k => panic!("expected an expression statement, got {:?}", k),
        }
    }

    #[test]
    fn test_terms() {
        assert_parses_to("42", num(42));
        assert_parses_to("(42)", num(42));
        assert_parses_to("0x2A", num(42));
        assert_parses_to("foo", name("foo"));
    }

    #[test]
    fn test_relational() {
        assert_parses_to("3 + 4 < 3 * 4", cmp(
            Lt,
            bin(Add, num(3), num(4)),
            bin(Mul, num(3), num(4))
        ));

        assert_parses_to("3 > 4", cmp(Gt, num(3), num(4)));
        assert_parses_to("3 <= 4", cmp(LtE, num(3), num(4)));
        assert_parses_to("3 >= 4", cmp(GtE, num(3), num(4)));
        assert_parses_to("3 == 4", cmp(Eq, num(3), num(4)));
        assert_parses_to("3 != 4", cmp(NotEq, num(3), num(4)));
    }

    #[test]
    fn test_precedence() {
        assert_parses_to("1 + 2 * 3", bin(
            Add,
            num(1),
            bin(Mul, num(2), num(3))
        ));

        assert_parses_to("(1 + 2) * 3", bin(
            Mul,
            bin(Add, num(1), num(2)),
            num(3)
        ));
    }

    #[test]
    fn test_boolean_chains_flatten() {
        assert_parses_to("1 and 2 and 3", Expr::Logic(
            BoolOp::And,
            vec![num(1), num(2), num(3)]
        ));

        assert_parses_to("1 and 2 or 3", Expr::Logic(
            BoolOp::Or,
            vec![
                Expr::Logic(BoolOp::And, vec![num(1), num(2)]),
                num(3)
            ]
        ));
    }

    #[test]
    fn test_comparison_chain_is_one_node() {
        assert_parses_to("1 < 2 < 3", Expr::Compare {
            left: Node::new(num(1)),
            ops: vec![Lt, Lt],
            rights: vec![num(2), num(3)],
        });
    }

    #[test]
    fn test_postfix() {
        assert_parses_to("f(1, 2)", call(name("f"), vec![num(1), num(2)]));
        assert_parses_to("a[i]", index(name("a"), name("i")));
        assert_parses_to("f()[0]", index(call(name("f"), vec![]), num(0)));
    }

    #[test]
    fn test_list_literal() {
        assert_parses_to("[3, 1, 4]", Expr::List(vec![num(3), num(1), num(4)]));
        assert_parses_to("[]", Expr::List(vec![]));
    }

    #[test]
    fn test_assignment_forms() {
        let tree = parse_all("x = 1\nx += 2\na[0] = 3\n");
        assert_eq!(tree[0].kind, StmtKind::Assign(name("x"), num(1)));
        assert_eq!(tree[0].line, 1);
        assert_eq!(tree[1].kind, StmtKind::AugAssign(name("x"), Add, num(2)));
        assert_eq!(
            tree[2].kind,
            StmtKind::Assign(index(name("a"), num(0)), num(3))
        );
        assert_eq!(tree[2].line, 3);
    }

    #[test]
    fn test_blocks() {
        let tree = parse_all("\
while i < 10:
    putint(i)
    i += 1
");
        assert_eq!(tree.len(), 1);
        match &tree[0].kind {
            StmtKind::While(test, body) => {
                assert_eq!(*test, cmp(Lt, name("i"), num(10)));
                assert_eq!(body.len(), 2);
            }
            k => panic!("expected while, got {:?}", k),
        }
    }

    #[test]
    fn test_single_line_suite() {
        let tree = parse_all("if 3 > 2: putchar(89)\n");
        match &tree[0].kind {
            StmtKind::If(_, body, orelse) => {
                assert_eq!(body.len(), 1);
                assert!(orelse.is_empty());
            }
            k => panic!("expected if, got {:?}", k),
        }
    }

    #[test]
    fn test_elif_nests() {
        let tree = parse_all("\
if a:
    pass
elif b:
    pass
else:
    pass
");
        match &tree[0].kind {
            StmtKind::If(_, _, orelse) => {
                assert_eq!(orelse.len(), 1);
                match &orelse[0].kind {
                    StmtKind::If(test, _, orelse) => {
                        assert_eq!(*test, name("b"));
                        assert_eq!(orelse.len(), 1);
                        assert_eq!(orelse[0].kind, StmtKind::Pass);
                    }
                    k => panic!("expected nested if, got {:?}", k),
                }
            }
            k => panic!("expected if, got {:?}", k),
        }
    }

    #[test]
    fn test_def() {
        let tree = parse_all("\
def add(a, b):
    c = a + b
    return c
");
        match &tree[0].kind {
            StmtKind::Def(name, params, body) => {
                assert_eq!(name, "add");
                assert_eq!(params, &["a", "b"]);
                assert_eq!(body.len(), 2);
                assert_eq!(
                    body[1].kind,
                    StmtKind::Return(Some(crate::ast::name("c")))
                );
            }
            k => panic!("expected def, got {:?}", k),
        }
    }

    #[test]
    fn test_import_and_comments() {
        let tree = parse_all("\
# leading comment
from stubs import *

x = 1  # trailing comment
");
        assert_eq!(tree[0].kind, StmtKind::Import(String::from("stubs")));
        assert_eq!(tree[1].line, 4);
    }

    #[test]
    fn test_bare_return() {
        let tree = parse_all("def f():\n    return\n");
        match &tree[0].kind {
            StmtKind::Def(_, _, body) => {
                assert_eq!(body[0].kind, StmtKind::Return(None));
            }
            k => panic!("expected def, got {:?}", k),
        }
    }

    #[test]
    fn test_bad_dedent() {
        let err = parse("if a:\n        pass\n    pass\n").unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_unexpected_indent() {
        assert!(parse("    x = 1\n").is_err());
    }

    #[test]
    fn test_multi_target_assign() {
        let err = parse("a = b = 1\n").unwrap_err();
        assert!(err.message.contains("more than one target"));
    }

    #[test]
    fn test_while_else_rejected() {
        let err = parse("\
while a:
    pass
else:
    pass
").unwrap_err();
        assert!(err.message.contains("while/else"));
    }

    #[test]
    fn test_stray_character() {
        let err = parse("x = 1 ! 2\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("stray"));
    }

    #[test]
    fn test_unary_minus_literal_only() {
        assert_parses_to("-5", num(-5));
        assert!(parse("x = -y\n").is_err());
    }
}
