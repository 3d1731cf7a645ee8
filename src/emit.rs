//! Append-only emission buffers for the textual IR.
//!
//! A `Frame` holds the state needed while one function body is generated:
//! entry-block allocation lines, body instructions in emission order, and the
//! temporary/label counters. Instructions are kept as individual lines so the
//! loop lowering can reserve a line for a phi and patch it by index once the
//! back edge is known; the text is rendered exactly once, when the
//! surrounding function is complete.

use crate::ty::{Type, Value};

/// Per-function emitter state. Swapping a whole `Frame` in and out around a
/// nested function definition leaves the outer state untouched.
#[derive(Debug)]
pub struct Frame {
  allocs: Vec<String>,
  body: Vec<String>,
  tmp: usize,
  lbl: usize,
  pub blk: String,
}

impl Frame {
  pub fn new() -> Self {
    Self {
      allocs: Vec::new(),
      body: Vec::new(),
      tmp: 0,
      lbl: 0,
      blk: "entry".to_string(),
    }
  }

  /// Next SSA temporary name, unique within this frame.
  pub fn fresh_tmp(&mut self) -> String {
    let name = format!("%{}", self.tmp);
    self.tmp += 1;
    name
  }

  /// Next basic-block label, unique within this frame.
  pub fn fresh_label(&mut self) -> String {
    let name = format!("L{}", self.lbl);
    self.lbl += 1;
    name
  }

  /// Append one instruction to the current block.
  pub fn inst(&mut self, line: impl AsRef<str>) {
    self.body.push(format!("  {}", line.as_ref()));
  }

  /// Start a new basic block; subsequent instructions land in it.
  pub fn open_block(&mut self, label: &str) {
    self.body.push(format!("{label}:"));
    self.blk = label.to_string();
  }

  /// Reserve a line at the current position for an instruction whose
  /// operands are not known yet. Returns the slot to pass to `patch`.
  pub fn reserve(&mut self) -> usize {
    self.body.push(String::new());
    self.body.len() - 1
  }

  /// Fill a line reserved earlier.
  pub fn patch(&mut self, slot: usize, line: impl AsRef<str>) {
    self.body[slot] = format!("  {}", line.as_ref());
  }

  /// Record an entry-block stack allocation.
  pub fn alloc(&mut self, name: &str, ty: Type) {
    self.allocs.push(format!("  {name} = alloca {}", ty.llvm()));
  }

  fn render_into(&self, out: &mut String) {
    for line in self.allocs.iter().chain(self.body.iter()) {
      out.push_str(line);
      out.push('\n');
    }
  }
}

/// Fixed module prelude: the external print routine and its format strings.
pub fn module_header() -> String {
  format!(
    "; generated by tisp {}\n\
     declare i32 @printf(i8*, ...)\n\n\
     @.str.int = private constant [4 x i8] c\"%d\\0A\\00\"\n\
     @.str.float = private constant [4 x i8] c\"%f\\0A\\00\"\n\n",
    env!("CARGO_PKG_VERSION")
  )
}

/// Render a completed user function definition.
pub fn render_function(name: &str, params: &[String], frame: &Frame, result: &Value) -> String {
  let params = params
    .iter()
    .map(|p| format!("i32 %{p}"))
    .collect::<Vec<_>>()
    .join(", ");
  let mut out = format!("define {} @{name}({params}) {{\nentry:\n", result.ty.llvm());
  frame.render_into(&mut out);
  out.push_str(&format!("  ret {} {}\n}}\n\n", result.ty.llvm(), result.name));
  out
}

/// Render the synthesized `main` holding all top-level code.
pub fn render_main(frame: &Frame) -> String {
  let mut out = String::from("define i32 @main() {\nentry:\n");
  frame.render_into(&mut out);
  out.push_str("  ret i32 0\n}\n");
  out
}
