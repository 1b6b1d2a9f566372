// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Parser and bytecode compiler.
//!
//! Statements are line oriented. A source that ends inside an open
//! `if`/`while`/`for`/`function` block fails with
//! [`ScriptError::NeedMoreInput`] so the shell can ask for more lines.

use crate::error::{Result, ScriptError};
use crate::lexer::{Lexeme, Token, tokenize};
use crate::value::{BinOp, Value};
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum OpCode {
    // Stack and variables
    Constant(Value),
    /// Push a variable; a function value found this way is invoked
    LoadVar(String),
    /// Push a variable without invoking it (`@name`)
    LoadRaw(String),
    StoreVar(String),
    Pop,
    /// Print the top of stack unless it is null, then pop it
    Echo,

    // Operators
    Binary(BinOp),
    Negate,
    Not,
    MakeList(usize),
    Index,

    // Control flow
    Jump(usize),
    JumpIfFalse(usize),
    /// Jump, leaving the value, if falsy; otherwise pop it (`and`)
    JumpIfFalseKeep(usize),
    /// Jump, leaving the value, if truthy; otherwise pop it (`or`)
    JumpIfTrueKeep(usize),
    /// Advance a `for` loop or jump to `exit` when done
    ForNext {
        list: String,
        index: String,
        var: String,
        exit: usize,
    },

    // Calls
    Call { name: String, argc: usize },
    Return,
}

/// Compiled code with the source line of every op
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub ops: Vec<OpCode>,
    pub lines: Vec<usize>,
}

impl Chunk {
    #[must_use]
    pub fn line_at(&self, ip: usize) -> usize {
        self.lines.get(ip).copied().unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct FunctionProto {
    pub name: String,
    pub params: Vec<String>,
    pub chunk: Chunk,
}

/// Whether expression statements echo their value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// A script file
    Program,
    /// A line typed at the prompt
    Immediate,
}

pub fn compile(source: &str, mode: Mode) -> Result<Rc<FunctionProto>> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens, mode);
    parser.parse_program()?;
    let chunk = std::mem::take(&mut parser.current.chunk);
    Ok(Rc::new(FunctionProto {
        name: "main".to_string(),
        params: Vec::new(),
        chunk,
    }))
}

struct LoopContext {
    continue_target: usize,
    breaks: Vec<usize>,
}

#[derive(Default)]
struct FunctionState {
    chunk: Chunk,
    loops: Vec<LoopContext>,
}

/// How a nested block ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockEnd {
    End,
    Else,
}

struct Parser {
    tokens: Vec<Lexeme>,
    current_token: usize,
    mode: Mode,
    current: FunctionState,
    enclosing: Vec<FunctionState>,
    hidden_vars: usize,
}

impl Parser {
    fn new(tokens: Vec<Lexeme>, mode: Mode) -> Self {
        Self {
            tokens,
            current_token: 0,
            mode,
            current: FunctionState::default(),
            enclosing: Vec::new(),
            hidden_vars: 0,
        }
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.current_token + offset).min(self.tokens.len().saturating_sub(1));
        self.tokens.get(idx).map_or(&Token::Eof, |l| &l.token)
    }

    fn line(&self) -> usize {
        let idx = self.current_token.min(self.tokens.len().saturating_sub(1));
        self.tokens.get(idx).map_or(0, |l| l.line)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token != Token::Eof {
            self.current_token += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(token)
    }

    fn consume(&mut self, expected: Token, what: &str) -> Result<()> {
        if self.check(&expected) {
            _ = self.advance();
            Ok(())
        } else {
            Err(ScriptError::compile(self.line(), format!("expected {what}")))
        }
    }

    fn identifier(&mut self, what: &str) -> Result<String> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            _ => Err(ScriptError::compile(self.line(), format!("expected {what}"))),
        }
    }

    fn end_of_statement(&mut self) -> Result<()> {
        match self.peek() {
            Token::Newline => {
                _ = self.advance();
                Ok(())
            }
            Token::Eof => Ok(()),
            other => {
                let message = format!("unexpected {other:?} at end of statement");
                Err(ScriptError::compile(self.line(), message))
            }
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&Token::Newline) {
            _ = self.advance();
        }
    }

    // Emission

    fn emit(&mut self, op: OpCode) -> usize {
        let line = self.line();
        self.current.chunk.ops.push(op);
        self.current.chunk.lines.push(line);
        self.current.chunk.ops.len() - 1
    }

    fn here(&self) -> usize {
        self.current.chunk.ops.len()
    }

    fn patch(&mut self, at: usize, target: usize) {
        if let Some(op) = self.current.chunk.ops.get_mut(at) {
            match op {
                OpCode::Jump(t)
                | OpCode::JumpIfFalse(t)
                | OpCode::JumpIfFalseKeep(t)
                | OpCode::JumpIfTrueKeep(t)
                | OpCode::ForNext { exit: t, .. } => *t = target,
                _ => {}
            }
        }
    }

    fn hidden(&mut self, role: &str) -> String {
        self.hidden_vars += 1;
        format!("__{role}{}", self.hidden_vars)
    }

    // Statements

    fn parse_program(&mut self) -> Result<()> {
        loop {
            self.skip_newlines();
            match self.peek() {
                Token::Eof => return Ok(()),
                Token::End | Token::Else => {
                    return Err(ScriptError::compile(
                        self.line(),
                        "'end' or 'else' without an open block",
                    ));
                }
                _ => self.parse_statement()?,
            }
        }
    }

    /// Statements up to a matching `end` or `else`, which is left unconsumed
    fn parse_block(&mut self) -> Result<BlockEnd> {
        loop {
            self.skip_newlines();
            match self.peek() {
                Token::Eof => return Err(ScriptError::NeedMoreInput),
                Token::End => return Ok(BlockEnd::End),
                Token::Else => return Ok(BlockEnd::Else),
                _ => self.parse_statement()?,
            }
        }
    }

    /// Consume `end <keyword>`; the caller handles what follows
    fn expect_end(&mut self, end: BlockEnd, keyword: Token, name: &str) -> Result<()> {
        if end != BlockEnd::End {
            return Err(ScriptError::compile(self.line(), format!("'else' inside {name}")));
        }
        self.consume(Token::End, "'end'")?;
        if !self.check(&keyword) {
            return Err(ScriptError::compile(self.line(), format!("expected 'end {name}'")));
        }
        _ = self.advance();
        Ok(())
    }

    fn parse_statement(&mut self) -> Result<()> {
        match self.peek() {
            Token::If => self.parse_if(),
            Token::While => self.parse_while(),
            Token::For => self.parse_for(),
            Token::Break => self.parse_break(),
            Token::Continue => self.parse_continue(),
            Token::Return => self.parse_return(),
            Token::Ident(_) if *self.peek_at(1) == Token::Assign => self.parse_assignment(),
            Token::Ident(_) if Self::starts_command_argument(self.peek_at(1)) => {
                self.parse_command_call()
            }
            _ => {
                self.parse_expression()?;
                let op = match self.mode {
                    Mode::Immediate if self.enclosing.is_empty() => OpCode::Echo,
                    _ => OpCode::Pop,
                };
                _ = self.emit(op);
                self.end_of_statement()
            }
        }
    }

    fn starts_command_argument(token: &Token) -> bool {
        matches!(
            token,
            Token::Number(_)
                | Token::Str(_)
                | Token::Ident(_)
                | Token::Null
                | Token::True
                | Token::False
                | Token::Not
                | Token::At
        )
    }

    fn parse_assignment(&mut self) -> Result<()> {
        let name = self.identifier("variable name")?;
        self.consume(Token::Assign, "'='")?;
        if self.check(&Token::Function) {
            self.parse_function(&name)?;
        } else {
            self.parse_expression()?;
        }
        _ = self.emit(OpCode::StoreVar(name));
        self.end_of_statement()
    }

    /// `print "a", 2` calls `print` with two arguments and discards the result
    fn parse_command_call(&mut self) -> Result<()> {
        let name = self.identifier("command name")?;
        let mut argc = 0;
        loop {
            self.parse_expression()?;
            argc += 1;
            if !self.check(&Token::Comma) {
                break;
            }
            _ = self.advance();
        }
        _ = self.emit(OpCode::Call { name, argc });
        _ = self.emit(OpCode::Pop);
        self.end_of_statement()
    }

    fn parse_if(&mut self) -> Result<()> {
        _ = self.advance();
        self.parse_expression()?;
        self.consume(Token::Then, "'then'")?;
        self.end_of_statement()?;

        let mut skip = Some(self.emit(OpCode::JumpIfFalse(0)));
        let mut exits = Vec::new();
        let mut end = self.parse_block()?;
        while end == BlockEnd::Else {
            _ = self.advance();
            exits.push(self.emit(OpCode::Jump(0)));
            if let Some(at) = skip.take() {
                let target = self.here();
                self.patch(at, target);
            }
            if self.check(&Token::If) {
                _ = self.advance();
                self.parse_expression()?;
                self.consume(Token::Then, "'then'")?;
                self.end_of_statement()?;
                skip = Some(self.emit(OpCode::JumpIfFalse(0)));
            } else {
                self.end_of_statement()?;
            }
            end = self.parse_block()?;
            if end == BlockEnd::Else && skip.is_none() {
                return Err(ScriptError::compile(self.line(), "'else' after final 'else'"));
            }
        }
        self.expect_end(end, Token::If, "if")?;
        self.end_of_statement()?;

        let target = self.here();
        if let Some(at) = skip {
            self.patch(at, target);
        }
        for at in exits {
            self.patch(at, target);
        }
        Ok(())
    }

    fn parse_while(&mut self) -> Result<()> {
        _ = self.advance();
        let start = self.here();
        self.parse_expression()?;
        self.end_of_statement()?;
        let exit = self.emit(OpCode::JumpIfFalse(0));

        self.current.loops.push(LoopContext {
            continue_target: start,
            breaks: Vec::new(),
        });
        let end = self.parse_block();
        let ctx = self.current.loops.pop();
        let end = end?;
        self.expect_end(end, Token::While, "while")?;
        self.end_of_statement()?;

        _ = self.emit(OpCode::Jump(start));
        let target = self.here();
        self.patch(exit, target);
        for at in ctx.map(|c| c.breaks).unwrap_or_default() {
            self.patch(at, target);
        }
        Ok(())
    }

    fn parse_for(&mut self) -> Result<()> {
        _ = self.advance();
        let var = self.identifier("loop variable")?;
        self.consume(Token::In, "'in'")?;
        self.parse_expression()?;
        self.end_of_statement()?;

        let list = self.hidden("list");
        let index = self.hidden("index");
        _ = self.emit(OpCode::StoreVar(list.clone()));
        _ = self.emit(OpCode::Constant(Value::Number(0.0)));
        _ = self.emit(OpCode::StoreVar(index.clone()));
        let start = self.emit(OpCode::ForNext {
            list,
            index,
            var,
            exit: 0,
        });

        self.current.loops.push(LoopContext {
            continue_target: start,
            breaks: Vec::new(),
        });
        let end = self.parse_block();
        let ctx = self.current.loops.pop();
        let end = end?;
        self.expect_end(end, Token::For, "for")?;
        self.end_of_statement()?;

        _ = self.emit(OpCode::Jump(start));
        let target = self.here();
        self.patch(start, target);
        for at in ctx.map(|c| c.breaks).unwrap_or_default() {
            self.patch(at, target);
        }
        Ok(())
    }

    fn parse_break(&mut self) -> Result<()> {
        _ = self.advance();
        if self.current.loops.is_empty() {
            return Err(ScriptError::compile(self.line(), "'break' outside a loop"));
        }
        let at = self.emit(OpCode::Jump(0));
        if let Some(ctx) = self.current.loops.last_mut() {
            ctx.breaks.push(at);
        }
        self.end_of_statement()
    }

    fn parse_continue(&mut self) -> Result<()> {
        _ = self.advance();
        let Some(target) = self.current.loops.last().map(|c| c.continue_target) else {
            return Err(ScriptError::compile(self.line(), "'continue' outside a loop"));
        };
        _ = self.emit(OpCode::Jump(target));
        self.end_of_statement()
    }

    fn parse_return(&mut self) -> Result<()> {
        _ = self.advance();
        if matches!(self.peek(), Token::Newline | Token::Eof) {
            _ = self.emit(OpCode::Constant(Value::Null));
        } else {
            self.parse_expression()?;
        }
        _ = self.emit(OpCode::Return);
        self.end_of_statement()
    }

    /// `function(a, b)` ... `end function`, leaving the function value pushed
    fn parse_function(&mut self, name: &str) -> Result<()> {
        self.consume(Token::Function, "'function'")?;
        let mut params = Vec::new();
        if self.check(&Token::LeftParen) {
            _ = self.advance();
            while !self.check(&Token::RightParen) {
                params.push(self.identifier("parameter name")?);
                if self.check(&Token::Comma) {
                    _ = self.advance();
                } else {
                    break;
                }
            }
            self.consume(Token::RightParen, "')'")?;
        }
        self.end_of_statement()?;

        let outer = std::mem::take(&mut self.current);
        self.enclosing.push(outer);
        let body = self.parse_block();
        let inner = match self.enclosing.pop() {
            Some(outer) => std::mem::replace(&mut self.current, outer),
            None => std::mem::take(&mut self.current),
        };
        let end = body?;
        self.expect_end(end, Token::Function, "function")?;

        let mut chunk = inner.chunk;
        chunk.ops.push(OpCode::Constant(Value::Null));
        chunk.ops.push(OpCode::Return);
        let line = self.line();
        chunk.lines.extend([line, line]);
        let proto = FunctionProto {
            name: name.to_string(),
            params,
            chunk,
        };
        _ = self.emit(OpCode::Constant(Value::Function(Rc::new(proto))));
        Ok(())
    }

    // Expressions, lowest precedence first

    fn parse_expression(&mut self) -> Result<()> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<()> {
        self.parse_and()?;
        while self.check(&Token::Or) {
            _ = self.advance();
            let jump = self.emit(OpCode::JumpIfTrueKeep(0));
            self.parse_and()?;
            let target = self.here();
            self.patch(jump, target);
        }
        Ok(())
    }

    fn parse_and(&mut self) -> Result<()> {
        self.parse_not()?;
        while self.check(&Token::And) {
            _ = self.advance();
            let jump = self.emit(OpCode::JumpIfFalseKeep(0));
            self.parse_not()?;
            let target = self.here();
            self.patch(jump, target);
        }
        Ok(())
    }

    fn parse_not(&mut self) -> Result<()> {
        if self.check(&Token::Not) {
            _ = self.advance();
            self.parse_not()?;
            _ = self.emit(OpCode::Not);
            return Ok(());
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<()> {
        self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::EqualEqual => BinOp::Eq,
                Token::BangEqual => BinOp::Ne,
                Token::Less => BinOp::Lt,
                Token::LessEqual => BinOp::Le,
                Token::Greater => BinOp::Gt,
                Token::GreaterEqual => BinOp::Ge,
                _ => return Ok(()),
            };
            _ = self.advance();
            self.parse_term()?;
            _ = self.emit(OpCode::Binary(op));
        }
    }

    fn parse_term(&mut self) -> Result<()> {
        self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => return Ok(()),
            };
            _ = self.advance();
            self.parse_factor()?;
            _ = self.emit(OpCode::Binary(op));
        }
    }

    fn parse_factor(&mut self) -> Result<()> {
        self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => return Ok(()),
            };
            _ = self.advance();
            self.parse_unary()?;
            _ = self.emit(OpCode::Binary(op));
        }
    }

    fn parse_unary(&mut self) -> Result<()> {
        if self.check(&Token::Minus) {
            _ = self.advance();
            self.parse_unary()?;
            _ = self.emit(OpCode::Negate);
            return Ok(());
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<()> {
        self.parse_postfix()?;
        if self.check(&Token::Caret) {
            _ = self.advance();
            self.parse_unary()?;
            _ = self.emit(OpCode::Binary(BinOp::Pow));
        }
        Ok(())
    }

    fn parse_postfix(&mut self) -> Result<()> {
        self.parse_primary()?;
        while self.check(&Token::LeftBracket) {
            _ = self.advance();
            self.parse_expression()?;
            self.consume(Token::RightBracket, "']'")?;
            _ = self.emit(OpCode::Index);
        }
        Ok(())
    }

    fn parse_arguments(&mut self) -> Result<usize> {
        self.consume(Token::LeftParen, "'('")?;
        let mut argc = 0;
        while !self.check(&Token::RightParen) {
            self.parse_expression()?;
            argc += 1;
            if self.check(&Token::Comma) {
                _ = self.advance();
            } else {
                break;
            }
        }
        self.consume(Token::RightParen, "')'")?;
        Ok(argc)
    }

    fn parse_primary(&mut self) -> Result<()> {
        match self.peek().clone() {
            Token::Number(n) => {
                _ = self.advance();
                _ = self.emit(OpCode::Constant(Value::Number(n)));
            }
            Token::Str(s) => {
                _ = self.advance();
                _ = self.emit(OpCode::Constant(Value::str(s)));
            }
            Token::Null => {
                _ = self.advance();
                _ = self.emit(OpCode::Constant(Value::Null));
            }
            Token::True | Token::False => {
                let flag = self.advance() == Token::True;
                _ = self.emit(OpCode::Constant(Value::bool(flag)));
            }
            Token::At => {
                _ = self.advance();
                let name = self.identifier("name after '@'")?;
                _ = self.emit(OpCode::LoadRaw(name));
            }
            Token::Ident(name) => {
                _ = self.advance();
                if self.check(&Token::LeftParen) {
                    let argc = self.parse_arguments()?;
                    _ = self.emit(OpCode::Call { name, argc });
                } else {
                    _ = self.emit(OpCode::LoadVar(name));
                }
            }
            Token::LeftParen => {
                _ = self.advance();
                self.parse_expression()?;
                self.consume(Token::RightParen, "')'")?;
            }
            Token::LeftBracket => {
                _ = self.advance();
                let mut count = 0;
                while !self.check(&Token::RightBracket) {
                    self.parse_expression()?;
                    count += 1;
                    if self.check(&Token::Comma) {
                        _ = self.advance();
                    } else {
                        break;
                    }
                }
                self.consume(Token::RightBracket, "']'")?;
                _ = self.emit(OpCode::MakeList(count));
            }
            Token::Function => self.parse_function("function")?,
            other => {
                return Err(ScriptError::compile(
                    self.line(),
                    format!("unexpected {other:?}"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(source: &str) -> Vec<OpCode> {
        compile(source, Mode::Program).unwrap().chunk.ops.clone()
    }

    #[test]
    fn test_assignment_and_echo() {
        let program = ops("x = 1 + 2");
        assert!(matches!(program[0], OpCode::Constant(Value::Number(n)) if n == 1.0));
        assert!(matches!(program[2], OpCode::Binary(BinOp::Add)));
        assert!(matches!(&program[3], OpCode::StoreVar(name) if name == "x"));

        let immediate = compile("x + 1", Mode::Immediate).unwrap();
        assert!(matches!(immediate.chunk.ops.last(), Some(OpCode::Echo)));
    }

    #[test]
    fn test_command_call() {
        let program = ops("print \"hi\", 2");
        assert!(matches!(&program[2], OpCode::Call { name, argc: 2 } if name == "print"));
        assert!(matches!(program[3], OpCode::Pop));
    }

    #[test]
    fn test_open_blocks_need_more_input() {
        for source in [
            "if x then",
            "while true\n  x = 1",
            "for i in [1,2]\nif i then\nend if",
            "f = function(a)\n return a",
            "if x then\nelse",
        ] {
            assert_eq!(
                compile(source, Mode::Immediate).unwrap_err(),
                ScriptError::NeedMoreInput,
                "{source}"
            );
        }
    }

    #[test]
    fn test_complete_blocks_compile() {
        let source = "\
total = 0
for i in [1, 2, 3]
  if i == 2 then
    continue
  else if i > 5 then
    break
  else
    total = total + i
  end if
end for
add = function(a, b)
  return a + b
end function
print add(total, 1)
";
        assert!(compile(source, Mode::Program).is_ok());
    }

    #[test]
    fn test_compile_errors_have_lines() {
        let err = compile("x = 1\nend if", Mode::Program).unwrap_err();
        assert_eq!(err.line(), Some(2));
        let err = compile("break", Mode::Program).unwrap_err();
        assert!(err.to_string().contains("outside a loop"));
        let err = compile("while x\nend for", Mode::Program).unwrap_err();
        assert!(err.to_string().contains("end while"));
    }
}
