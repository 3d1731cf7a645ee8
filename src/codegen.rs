//! The single-pass compiler: parsing, type inference and IR emission fused
//! into one recursive descent over the token stream.
//!
//! Each `expression` call consumes the tokens of one form and returns a
//! value descriptor, appending instructions to the current frame as a side
//! effect. Control-flow forms open and close basic blocks on the frame;
//! function definitions swap in a fresh frame so the surrounding emitter
//! state and variable table are byte-for-byte untouched afterwards.

use std::collections::HashMap;
use std::mem;

use crate::emit::{self, Frame};
use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Token, TokenKind, describe_token, token_text};
use crate::ty::{Type, Value};

/// Compile a token stream into a complete IR module.
pub fn compile(tokens: Vec<Token>, source: &str) -> CompileResult<String> {
  Compiler::new(tokens, source).compile_module()
}

struct Compiler<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
  frame: Frame,
  vars: HashMap<String, Value>,
  funcs: HashMap<String, Type>,
  func_defs: String,
}

impl<'a> Compiler<'a> {
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
      frame: Frame::new(),
      vars: HashMap::new(),
      funcs: HashMap::new(),
      func_defs: String::new(),
    }
  }

  // ----- Token cursor -----

  fn peek(&self) -> Token {
    self
      .tokens
      .get(self.pos)
      .copied()
      .unwrap_or(Token::new(TokenKind::Eof, self.source.len(), 0))
  }

  fn advance(&mut self) -> Token {
    let token = self.peek();
    if token.kind != TokenKind::Eof {
      self.pos += 1;
    }
    token
  }

  fn text(&self, token: &Token) -> &'a str {
    token_text(token, self.source)
  }

  fn err_at(&self, token: &Token, message: impl Into<String>) -> CompileError {
    CompileError::at(self.source, token.loc, message)
  }

  fn expect(&mut self, kind: TokenKind, what: &str) -> CompileResult<Token> {
    let token = self.peek();
    if token.kind == kind {
      Ok(self.advance())
    } else {
      let got = describe_token(&token, self.source);
      Err(self.err_at(&token, format!("expected {what}, but got \"{got}\"")))
    }
  }

  // ----- Module assembly -----

  /// Compile every top-level form and assemble the final module text.
  fn compile_module(&mut self) -> CompileResult<String> {
    while self.peek().kind != TokenKind::Eof {
      let value = self.expression()?;
      let value = self.load(value);
      if !value.is_void() {
        self.print_value(&value);
      }
    }
    Ok(format!(
      "{}{}{}",
      emit::module_header(),
      self.func_defs,
      emit::render_main(&self.frame)
    ))
  }

  /// Print a top-level result through the declared formatted-print routine.
  fn print_value(&mut self, value: &Value) {
    let fmt = match value.ty {
      Type::Int => "@.str.int",
      Type::Float => "@.str.float",
    };
    let reg = self.frame.fresh_tmp();
    self.frame.inst(format!(
      "{reg} = call i32 (i8*, ...) @printf(i8* getelementptr ([4 x i8], [4 x i8]* {fmt}, i32 0, i32 0), {} {})",
      value.ty.llvm(),
      value.name
    ));
  }

  // ----- Expression dispatch -----

  /// Compile one expression, returning the descriptor for its result.
  fn expression(&mut self) -> CompileResult<Value> {
    let token = self.peek();
    match token.kind {
      TokenKind::LParen => {
        self.advance();
        self.form()
      }
      TokenKind::Ident => {
        self.advance();
        let name = self.text(&token);
        self
          .vars
          .get(name)
          .cloned()
          .ok_or_else(|| self.err_at(&token, format!("use of undefined variable '{name}'")))
      }
      TokenKind::Int => {
        self.advance();
        Ok(Value::direct(Type::Int, self.text(&token)))
      }
      TokenKind::Float => {
        self.advance();
        Ok(Value::direct(Type::Float, self.text(&token)))
      }
      _ => {
        let got = describe_token(&token, self.source);
        Err(self.err_at(&token, format!("expected an expression, but got \"{got}\"")))
      }
    }
  }

  /// Compile an expression that must produce a value. Definition and loop
  /// forms yield nothing and are rejected wherever a value is required.
  fn value_expression(&mut self) -> CompileResult<Value> {
    let token = self.peek();
    let value = self.expression()?;
    if value.is_void() {
      return Err(self.err_at(&token, "form does not produce a value"));
    }
    Ok(value)
  }

  /// Dispatch a parenthesised form; the opening `(` is already consumed.
  fn form(&mut self) -> CompileResult<Value> {
    let head = self.peek();
    match head.kind {
      TokenKind::Define => {
        self.advance();
        self.definition()
      }
      TokenKind::Loop => {
        self.advance();
        self.loop_form()
      }
      TokenKind::If => {
        self.advance();
        self.if_form()
      }
      TokenKind::Cond => {
        self.advance();
        self.cond_form()
      }
      TokenKind::Ident if self.funcs.contains_key(self.text(&head)) => self.call_site(),
      TokenKind::Op => self.application(),
      _ => {
        let got = describe_token(&head, self.source);
        Err(self.err_at(&head, format!("expected an operator, but got \"{got}\"")))
      }
    }
  }

  // ----- Loads and promotion -----

  /// Turn a stack-slot value into an SSA temporary; direct values pass
  /// through untouched.
  fn load(&mut self, value: Value) -> Value {
    if !value.is_pointer {
      return value;
    }
    let reg = self.frame.fresh_tmp();
    let ty = value.ty.llvm();
    self.frame.inst(format!("{reg} = load {ty}, {ty}* {}", value.name));
    Value::direct(value.ty, reg)
  }

  /// Promote an Int value to Float with a signed conversion.
  fn to_float(&mut self, value: Value) -> Value {
    let value = self.load(value);
    if value.ty == Type::Float {
      return value;
    }
    let reg = self.frame.fresh_tmp();
    self
      .frame
      .inst(format!("{reg} = sitofp i32 {} to double", value.name));
    Value::direct(Type::Float, reg)
  }

  // ----- Operator applications -----

  /// `(op e1 e2 … en)`: comparisons are strictly binary, arithmetic
  /// left-folds over two or more operands.
  fn application(&mut self) -> CompileResult<Value> {
    let op_token = self.advance();
    let op = self.text(&op_token);
    let first = self.value_expression()?;

    if matches!(op, "<" | ">" | "=") {
      let second = self.value_expression()?;
      let result = self.compare(op, first, second);
      self.expect(TokenKind::RParen, "closing ')'")?;
      return Ok(result);
    }

    if self.peek().kind == TokenKind::RParen {
      return Err(self.err_at(
        &op_token,
        format!("operator '{op}' needs at least two operands"),
      ));
    }
    let mut acc = first;
    while self.peek().kind != TokenKind::RParen {
      let rhs = self.value_expression()?;
      acc = self.binary(op, acc, rhs);
    }
    self.expect(TokenKind::RParen, "closing ')'")?;
    Ok(acc)
  }

  /// One fold step of an arithmetic application.
  fn binary(&mut self, op: &str, lhs: Value, rhs: Value) -> Value {
    let mut lhs = self.load(lhs);
    let mut rhs = self.load(rhs);
    let ty = lhs.ty.join(rhs.ty);
    if ty == Type::Float {
      lhs = self.to_float(lhs);
      rhs = self.to_float(rhs);
    }
    let opcode = match (ty, op) {
      (Type::Int, "+") => "add",
      (Type::Int, "-") => "sub",
      (Type::Int, "*") => "mul",
      (Type::Int, _) => "sdiv",
      (Type::Float, "+") => "fadd",
      (Type::Float, "-") => "fsub",
      (Type::Float, "*") => "fmul",
      (Type::Float, _) => "fdiv",
    };
    let reg = self.frame.fresh_tmp();
    self.frame.inst(format!(
      "{reg} = {opcode} {} {}, {}",
      ty.llvm(),
      lhs.name,
      rhs.name
    ));
    Value::direct(ty, reg)
  }

  /// Comparison application; always yields an Int-typed condition value.
  fn compare(&mut self, op: &str, lhs: Value, rhs: Value) -> Value {
    let mut lhs = self.load(lhs);
    let mut rhs = self.load(rhs);
    let float = lhs.ty == Type::Float || rhs.ty == Type::Float;
    if float {
      lhs = self.to_float(lhs);
      rhs = self.to_float(rhs);
    }
    let cmp = match (float, op) {
      (false, "<") => "icmp slt i32",
      (false, ">") => "icmp sgt i32",
      (false, _) => "icmp eq i32",
      (true, "<") => "fcmp olt double",
      (true, ">") => "fcmp ogt double",
      (true, _) => "fcmp oeq double",
    };
    let reg = self.frame.fresh_tmp();
    self
      .frame
      .inst(format!("{reg} = {cmp} {}, {}", lhs.name, rhs.name));
    Value::direct(Type::Int, reg)
  }

  // ----- Control flow -----

  /// Lower `(if c t e)` to a diamond with a phi at the join.
  fn if_form(&mut self) -> CompileResult<Value> {
    let cond = self.value_expression()?;
    let cond = self.load(cond);
    let then_label = self.frame.fresh_label();
    let else_label = self.frame.fresh_label();
    let end_label = self.frame.fresh_label();
    self.frame.inst(format!(
      "br i1 {}, label %{then_label}, label %{else_label}",
      cond.name
    ));

    self.frame.open_block(&then_label);
    let then_value = self.value_expression()?;
    let then_value = self.load(then_value);
    let then_block = self.frame.blk.clone();
    self.frame.inst(format!("br label %{end_label}"));

    self.frame.open_block(&else_label);
    let else_token = self.peek();
    let else_value = self.value_expression()?;
    let else_value = self.load(else_value);
    let else_block = self.frame.blk.clone();
    if else_value.ty != then_value.ty {
      return Err(self.err_at(&else_token, "'if' arms have mismatched types"));
    }
    self.frame.inst(format!("br label %{end_label}"));

    self.frame.open_block(&end_label);
    let reg = self.frame.fresh_tmp();
    self.frame.inst(format!(
      "{reg} = phi {} [{}, %{then_block}], [{}, %{else_block}]",
      then_value.ty.llvm(),
      then_value.name,
      else_value.name
    ));
    self.expect(TokenKind::RParen, "closing ')'")?;
    Ok(Value::direct(then_value.ty, reg))
  }

  /// Lower `(cond [c r]…)`: arms test top to bottom, the first true arm
  /// wins, and a zero default flows from the last fall-through block.
  fn cond_form(&mut self) -> CompileResult<Value> {
    let end_label = self.frame.fresh_label();
    let mut arms: Vec<(Value, String)> = Vec::new();

    while self.peek().kind == TokenKind::LBrack {
      self.advance();
      let cond = self.value_expression()?;
      let cond = self.load(cond);
      let then_label = self.frame.fresh_label();
      let next_label = self.frame.fresh_label();
      self.frame.inst(format!(
        "br i1 {}, label %{then_label}, label %{next_label}",
        cond.name
      ));

      self.frame.open_block(&then_label);
      let arm_token = self.peek();
      let result = self.value_expression()?;
      let result = self.load(result);
      if let Some((first, _)) = arms.first() {
        if result.ty != first.ty {
          return Err(self.err_at(&arm_token, "'cond' arm type differs from the first arm"));
        }
      }
      arms.push((result, self.frame.blk.clone()));
      self.frame.inst(format!("br label %{end_label}"));

      self.frame.open_block(&next_label);
      self.expect(TokenKind::RBrack, "closing ']'")?;
    }

    let ty = arms.first().map_or(Type::Int, |(value, _)| value.ty);
    arms.push((Value::direct(ty, ty.zero()), self.frame.blk.clone()));
    self.frame.inst(format!("br label %{end_label}"));

    self.frame.open_block(&end_label);
    let reg = self.frame.fresh_tmp();
    let incoming = arms
      .iter()
      .map(|(value, block)| format!("[{}, %{block}]", value.name))
      .collect::<Vec<_>>()
      .join(", ");
    self.frame.inst(format!("{reg} = phi {} {incoming}", ty.llvm()));
    self.expect(TokenKind::RParen, "closing ')'")?;
    Ok(Value::direct(ty, reg))
  }

  /// Lower `(loop n body…)` to a three-block counted loop with an
  /// induction-variable phi in the header. Body results are discarded.
  fn loop_form(&mut self) -> CompileResult<Value> {
    let count_token = self.peek();
    let count = self.value_expression()?;
    let count = self.load(count);
    if count.ty != Type::Int {
      return Err(self.err_at(&count_token, "loop count must be an integer"));
    }

    let pre_block = self.frame.blk.clone();
    let header = self.frame.fresh_label();
    let body_label = self.frame.fresh_label();
    let exit = self.frame.fresh_label();
    let ivar = self.frame.fresh_tmp();

    self.frame.inst(format!("br label %{header}"));
    self.frame.open_block(&header);
    // The increment temporary and the back-edge block are unknown until the
    // body has compiled; the phi line is patched in afterwards.
    let phi_slot = self.frame.reserve();
    let cond = self.frame.fresh_tmp();
    self
      .frame
      .inst(format!("{cond} = icmp slt i32 {ivar}, {}", count.name));
    self.frame.inst(format!(
      "br i1 {cond}, label %{body_label}, label %{exit}"
    ));

    self.frame.open_block(&body_label);
    while self.peek().kind != TokenKind::RParen {
      self.expression()?;
    }
    let back_block = self.frame.blk.clone();
    let next = self.frame.fresh_tmp();
    self.frame.inst(format!("{next} = add i32 {ivar}, 1"));
    self.frame.inst(format!("br label %{header}"));

    self.frame.open_block(&exit);
    self.frame.patch(
      phi_slot,
      format!("{ivar} = phi i32 [0, %{pre_block}], [{next}, %{back_block}]"),
    );
    self.expect(TokenKind::RParen, "closing ')'")?;
    Ok(Value::void())
  }

  // ----- Definitions and calls -----

  /// `(define name value)` or `(define (name params…) body)`.
  fn definition(&mut self) -> CompileResult<Value> {
    if self.peek().kind == TokenKind::LParen {
      self.advance();
      return self.function_definition();
    }

    let name_token = self.expect(TokenKind::Ident, "an identifier")?;
    let name = self.text(&name_token).to_string();
    let value = self.value_expression()?;
    let value = self.load(value);

    let slot = match self.vars.get(&name).cloned() {
      None => {
        let slot = format!("%{name}");
        self.frame.alloc(&slot, value.ty);
        self
          .vars
          .insert(name.clone(), Value::slot(value.ty, slot.clone()));
        slot
      }
      Some(bound) if !bound.is_pointer => {
        return Err(self.err_at(&name_token, format!("cannot redefine parameter '{name}'")));
      }
      Some(bound) if bound.ty != value.ty => {
        return Err(self.err_at(
          &name_token,
          format!("'{name}' is already defined with a different type"),
        ));
      }
      Some(bound) => bound.name,
    };

    let ty = value.ty.llvm();
    self
      .frame
      .inst(format!("store {ty} {}, {ty}* {slot}", value.name));
    self.expect(TokenKind::RParen, "closing ')'")?;
    Ok(Value::void())
  }

  /// `(define (name params…) body)`: the body compiles into a fresh frame
  /// and variable table, so the outer state is restored exactly afterwards.
  fn function_definition(&mut self) -> CompileResult<Value> {
    let name_token = self.expect(TokenKind::Ident, "a function name")?;
    let name = self.text(&name_token).to_string();
    if self.funcs.contains_key(&name) {
      return Err(self.err_at(&name_token, format!("function '{name}' is defined twice")));
    }

    let mut params = Vec::new();
    while self.peek().kind == TokenKind::Ident {
      let param = self.advance();
      params.push(self.text(&param).to_string());
    }
    self.expect(TokenKind::RParen, "closing ')'")?;

    let outer_frame = mem::replace(&mut self.frame, Frame::new());
    let outer_vars = mem::take(&mut self.vars);
    for param in &params {
      self
        .vars
        .insert(param.clone(), Value::direct(Type::Int, format!("%{param}")));
    }
    // Registered before the body compiles so recursive calls resolve; the
    // return type stays provisional until the body's type is known.
    self.funcs.insert(name.clone(), Type::Int);

    let body = self.value_expression()?;
    let body = self.load(body);
    self.funcs.insert(name.clone(), body.ty);
    self
      .func_defs
      .push_str(&emit::render_function(&name, &params, &self.frame, &body));

    self.frame = outer_frame;
    self.vars = outer_vars;
    self.expect(TokenKind::RParen, "closing ')'")?;
    Ok(Value::void())
  }

  /// Call to a user-defined function; arguments are loaded left to right.
  fn call_site(&mut self) -> CompileResult<Value> {
    let name_token = self.advance();
    let name = self.text(&name_token).to_string();
    let ret = self
      .funcs
      .get(&name)
      .copied()
      .ok_or_else(|| self.err_at(&name_token, format!("call to undefined function '{name}'")))?;

    let mut args = Vec::new();
    while self.peek().kind != TokenKind::RParen {
      let arg = self.value_expression()?;
      args.push(self.load(arg));
    }
    self.expect(TokenKind::RParen, "closing ')'")?;

    let reg = self.frame.fresh_tmp();
    let args = args
      .iter()
      .map(|arg| format!("{} {}", arg.ty.llvm(), arg.name))
      .collect::<Vec<_>>()
      .join(", ");
    self
      .frame
      .inst(format!("{reg} = call {} @{name}({args})", ret.llvm()));
    Ok(Value::direct(ret, reg))
  }
}
