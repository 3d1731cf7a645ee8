//! The numeric type lattice and the value descriptor passed between the
//! stages of expression compilation.

/// Scalar types known to the compiler. `Float` dominates `Int`: mixed
/// arithmetic promotes the integer side to double.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
  Int,
  Float,
}

impl Type {
  /// Spelling of this type in the emitted IR.
  pub fn llvm(self) -> &'static str {
    match self {
      Type::Int => "i32",
      Type::Float => "double",
    }
  }

  /// Join of two operand types under the Int < Float lattice.
  pub fn join(self, other: Type) -> Type {
    if self == Type::Float || other == Type::Float {
      Type::Float
    } else {
      Type::Int
    }
  }

  /// Zero constant spelled so the IR type checker accepts it.
  pub fn zero(self) -> &'static str {
    match self {
      Type::Int => "0",
      Type::Float => "0.0",
    }
  }
}

/// Result of compiling one expression: the IR operand holding it, its type,
/// and whether the operand is a stack slot that must be loaded before use.
#[derive(Debug, Clone)]
pub struct Value {
  pub ty: Type,
  pub name: String,
  pub is_pointer: bool,
}

impl Value {
  /// An SSA temporary or literal operand, usable directly.
  pub fn direct(ty: Type, name: impl Into<String>) -> Self {
    Self {
      ty,
      name: name.into(),
      is_pointer: false,
    }
  }

  /// A stack slot operand; consumers must load it first.
  pub fn slot(ty: Type, name: impl Into<String>) -> Self {
    Self {
      ty,
      name: name.into(),
      is_pointer: true,
    }
  }

  /// The result of a definition or loop form: Int-typed with an empty name,
  /// which suppresses top-level printing.
  pub fn void() -> Self {
    Self::direct(Type::Int, "")
  }

  pub fn is_void(&self) -> bool {
    self.name.is_empty()
  }
}
