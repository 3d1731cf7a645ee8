#[cfg(test)]
mod integration {
  use crate::compile_to_ir;
  use crate::tokenizer::{self, TokenKind, token_text};

  // ----- helpers -----

  fn main_text(ir: &str) -> &str {
    let start = ir.find("define i32 @main()").expect("module has a main");
    &ir[start..]
  }

  fn check_block(label: &str, lines: &[&str]) {
    let is_terminator = |line: &&&str| {
      let t = line.trim_start();
      t.starts_with("br ") || t.starts_with("ret ")
    };
    let terminators = lines.iter().filter(is_terminator).count();
    assert_eq!(
      terminators, 1,
      "block '{label}' must hold exactly one terminator: {lines:#?}"
    );
    let last = lines.last().map(|l| l.trim_start()).unwrap_or("");
    assert!(
      last.starts_with("br ") || last.starts_with("ret "),
      "block '{label}' must end in a terminator: {lines:#?}"
    );
  }

  /// Structural check over the emitted text: every basic block of every
  /// function is closed by exactly one terminator, as its last instruction.
  fn assert_blocks_terminated(ir: &str) {
    let mut in_function = false;
    let mut label = String::new();
    let mut block: Vec<&str> = Vec::new();
    for line in ir.lines() {
      if line.starts_with("define ") {
        in_function = true;
        continue;
      }
      if !in_function {
        continue;
      }
      if line == "}" {
        check_block(&label, &block);
        label.clear();
        block.clear();
        in_function = false;
      } else if let Some(name) = line.strip_suffix(':') {
        if !label.is_empty() {
          check_block(&label, &block);
        }
        label = name.to_string();
        block.clear();
      } else {
        block.push(line);
      }
    }
  }

  /// SSA temporaries must be numbered in emission order within each
  /// function, which also means every one is defined before any later use.
  fn assert_temps_sequential(ir: &str) {
    let mut next = 0usize;
    for line in ir.lines() {
      if line.starts_with("define ") {
        next = 0;
        continue;
      }
      let Some(rest) = line.trim_start().strip_prefix('%') else {
        continue;
      };
      let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
      if digits.is_empty() || !rest[digits.len()..].starts_with(" = ") {
        continue;
      }
      let n: usize = digits.parse().expect("temporary number parses");
      assert_eq!(n, next, "temporaries must appear in emission order: {line}");
      next += 1;
    }
  }

  fn error_of(source: &str) -> String {
    compile_to_ir(source)
      .expect_err("compilation must fail")
      .to_string()
  }

  // ----- end-to-end scenarios -----

  #[test]
  fn folds_variadic_addition() {
    let ir = compile_to_ir("(+ 1 2 3 4)").expect("compiles");
    assert!(ir.contains("%0 = add i32 1, 2"), "ir:\n{ir}");
    assert!(ir.contains("%1 = add i32 %0, 3"), "ir:\n{ir}");
    assert!(ir.contains("%2 = add i32 %1, 4"), "ir:\n{ir}");
    assert!(ir.contains("@.str.int"), "ir:\n{ir}");
    assert_blocks_terminated(&ir);
    assert_temps_sequential(&ir);
  }

  #[test]
  fn promotes_mixed_arithmetic_to_double() {
    let ir = compile_to_ir("(+ 1 2.5)").expect("compiles");
    assert!(ir.contains("%0 = sitofp i32 1 to double"), "ir:\n{ir}");
    assert!(ir.contains("%1 = fadd double %0, 2.5"), "ir:\n{ir}");
    assert!(ir.contains("[4 x i8]* @.str.float"), "ir:\n{ir}");
    assert!(ir.contains("double %1)"), "ir:\n{ir}");
  }

  #[test]
  fn definitions_allocate_named_slots_and_store() {
    let ir = compile_to_ir("(define x 5) (* x x)").expect("compiles");
    assert!(ir.contains("%x = alloca i32"), "ir:\n{ir}");
    assert!(ir.contains("store i32 5, i32* %x"), "ir:\n{ir}");
    assert!(ir.contains("%0 = load i32, i32* %x"), "ir:\n{ir}");
    assert!(ir.contains("%1 = load i32, i32* %x"), "ir:\n{ir}");
    assert!(ir.contains("%2 = mul i32 %0, %1"), "ir:\n{ir}");
    // The definition itself prints nothing; only the product does.
    assert_eq!(ir.matches("@printf").count(), 2, "ir:\n{ir}"); // declare + one call
    assert_temps_sequential(&ir);
  }

  #[test]
  fn lowers_if_to_a_diamond_with_a_phi_join() {
    let ir = compile_to_ir("(if (< 3 5) 100 200)").expect("compiles");
    assert!(ir.contains("%0 = icmp slt i32 3, 5"), "ir:\n{ir}");
    assert!(ir.contains("br i1 %0, label %L0, label %L1"), "ir:\n{ir}");
    assert!(ir.contains("%1 = phi i32 [100, %L0], [200, %L1]"), "ir:\n{ir}");
    assert_blocks_terminated(&ir);
  }

  #[test]
  fn compiles_recursive_functions() {
    let ir = compile_to_ir(
      "(define (fact n) (if (< n 2) 1 (* n (fact (- n 1))))) (fact 5)",
    )
    .expect("compiles");
    assert!(ir.contains("define i32 @fact(i32 %n) {"), "ir:\n{ir}");
    assert!(ir.contains("%0 = icmp slt i32 %n, 2"), "ir:\n{ir}");
    assert!(ir.contains("%1 = sub i32 %n, 1"), "ir:\n{ir}");
    assert!(ir.contains("%2 = call i32 @fact(i32 %1)"), "ir:\n{ir}");
    assert!(ir.contains("%3 = mul i32 %n, %2"), "ir:\n{ir}");
    assert!(ir.contains("%4 = phi i32 [1, %L0], [%3, %L1]"), "ir:\n{ir}");
    assert!(ir.contains("ret i32 %4"), "ir:\n{ir}");
    assert!(main_text(&ir).contains("%0 = call i32 @fact(i32 5)"), "ir:\n{ir}");
    assert_blocks_terminated(&ir);
    assert_temps_sequential(&ir);
  }

  #[test]
  fn counted_loop_carries_a_backpatched_induction_phi() {
    let ir = compile_to_ir("(define s 0) (loop 10 (define s (+ s 1))) s").expect("compiles");
    assert!(ir.contains("%s = alloca i32"), "ir:\n{ir}");
    assert!(ir.contains("%0 = phi i32 [0, %entry], [%4, %L1]"), "ir:\n{ir}");
    assert!(ir.contains("%1 = icmp slt i32 %0, 10"), "ir:\n{ir}");
    assert!(ir.contains("br i1 %1, label %L1, label %L2"), "ir:\n{ir}");
    assert!(ir.contains("%4 = add i32 %0, 1"), "ir:\n{ir}");
    assert!(ir.contains("%5 = load i32, i32* %s"), "ir:\n{ir}");
    assert_blocks_terminated(&ir);
    assert_temps_sequential(&ir);
  }

  // ----- structural properties -----

  #[test]
  fn cond_phi_covers_every_arm_plus_the_default() {
    let ir =
      compile_to_ir("(define x 3) (cond [(< x 1) 10] [(< x 5) 20])").expect("compiles");
    assert!(
      ir.contains("%4 = phi i32 [10, %L1], [20, %L3], [0, %L4]"),
      "ir:\n{ir}"
    );
    assert_blocks_terminated(&ir);
  }

  #[test]
  fn cond_default_is_typed_like_the_first_arm() {
    let ir = compile_to_ir("(define y 1.5) (cond [(< y 2.0) 3.5])").expect("compiles");
    assert!(
      ir.contains("%2 = phi double [3.5, %L1], [0.0, %L2]"),
      "ir:\n{ir}"
    );
  }

  #[test]
  fn function_definitions_leave_the_outer_state_untouched() {
    let plain = compile_to_ir("(+ 1 2)").expect("compiles");
    let with_fn = compile_to_ir("(define (id x) x) (+ 1 2)").expect("compiles");
    assert_eq!(
      main_text(&plain),
      main_text(&with_fn),
      "top-level emission must not shift when a function definition runs first"
    );
  }

  #[test]
  fn nested_control_flow_keeps_every_block_terminated() {
    let ir = compile_to_ir(
      "(define n 7)\n\
       (define s 0)\n\
       (loop 3 (define s (+ s (if (< s n) 1 0))))\n\
       (if (> s 0) (cond [(< s 2) 1] [(< s 4) 2]) 0)",
    )
    .expect("compiles");
    assert_blocks_terminated(&ir);
    assert_temps_sequential(&ir);
  }

  #[test]
  fn lexing_is_stable_under_whitespace_normalisation() {
    let source = "(define s 0)\n(loop 10 ; bump ten times\n  (define s (+ s 1)))\ns";
    let tokens = tokenizer::tokenize(source).expect("lexes");
    let normalised = tokens
      .iter()
      .filter(|t| t.kind != TokenKind::Eof)
      .map(|t| token_text(t, source))
      .collect::<Vec<_>>()
      .join(" ");
    let relexed = tokenizer::tokenize(&normalised).expect("lexes");
    let shape = |tokens: &[tokenizer::Token], source: &str| {
      tokens
        .iter()
        .map(|t| (t.kind, token_text(t, source).to_string()))
        .collect::<Vec<_>>()
    };
    assert_eq!(shape(&tokens, source), shape(&relexed, &normalised));
  }

  #[test]
  fn module_carries_the_fixed_prelude_and_main() {
    let ir = compile_to_ir("1").expect("compiles");
    assert!(ir.starts_with("; generated by tisp "), "ir:\n{ir}");
    assert!(ir.contains("declare i32 @printf(i8*, ...)"), "ir:\n{ir}");
    assert!(
      ir.contains("@.str.int = private constant [4 x i8] c\"%d\\0A\\00\""),
      "ir:\n{ir}"
    );
    assert!(
      ir.contains("@.str.float = private constant [4 x i8] c\"%f\\0A\\00\""),
      "ir:\n{ir}"
    );
    assert!(ir.ends_with("  ret i32 0\n}\n"), "ir:\n{ir}");
  }

  // ----- rejected programs -----

  #[test]
  fn undefined_variables_are_rejected() {
    let rendered = error_of("(+ a 1)");
    assert!(
      rendered.contains("use of undefined variable 'a'"),
      "rendered:\n{rendered}"
    );
  }

  #[test]
  fn arithmetic_needs_at_least_two_operands() {
    let rendered = error_of("(+ 1)");
    assert!(
      rendered.contains("operator '+' needs at least two operands"),
      "rendered:\n{rendered}"
    );
  }

  #[test]
  fn comparison_is_strictly_binary() {
    let rendered = error_of("(< 1 2 3)");
    assert!(
      rendered.contains("expected closing ')'"),
      "rendered:\n{rendered}"
    );
  }

  #[test]
  fn unterminated_forms_are_rejected_at_eof() {
    let rendered = error_of("(+ 1 2");
    assert!(rendered.contains("\"EOF\""), "rendered:\n{rendered}");
  }

  #[test]
  fn unknown_heads_are_rejected_as_operators() {
    let rendered = error_of("(foo 1)");
    assert!(
      rendered.contains("expected an operator, but got \"foo\""),
      "rendered:\n{rendered}"
    );
  }

  #[test]
  fn if_arm_types_must_agree() {
    let rendered = error_of("(if (< 1 2) 1 2.5)");
    assert!(
      rendered.contains("'if' arms have mismatched types"),
      "rendered:\n{rendered}"
    );
  }

  #[test]
  fn cond_arm_types_must_match_the_first() {
    let rendered = error_of("(cond [(< 1 2) 1] [(> 1 2) 2.5])");
    assert!(
      rendered.contains("'cond' arm type differs from the first arm"),
      "rendered:\n{rendered}"
    );
  }

  #[test]
  fn redefinition_must_keep_the_slot_type() {
    let rendered = error_of("(define x 1) (define x 2.5)");
    assert!(
      rendered.contains("'x' is already defined with a different type"),
      "rendered:\n{rendered}"
    );
  }

  #[test]
  fn same_typed_redefinition_reuses_the_slot() {
    let ir = compile_to_ir("(define x 1) (define x 2) x").expect("compiles");
    assert_eq!(ir.matches("%x = alloca i32").count(), 1, "ir:\n{ir}");
    assert!(ir.contains("store i32 1, i32* %x"), "ir:\n{ir}");
    assert!(ir.contains("store i32 2, i32* %x"), "ir:\n{ir}");
  }

  #[test]
  fn function_names_cannot_be_defined_twice() {
    let rendered = error_of("(define (f a) a) (define (f b) b)");
    assert!(
      rendered.contains("function 'f' is defined twice"),
      "rendered:\n{rendered}"
    );
  }

  #[test]
  fn parameters_cannot_be_redefined() {
    let rendered = error_of("(define (f a) (define a 1))");
    assert!(
      rendered.contains("cannot redefine parameter 'a'"),
      "rendered:\n{rendered}"
    );
  }

  #[test]
  fn valueless_forms_cannot_be_operands() {
    let rendered = error_of("(define x (define y 1))");
    assert!(
      rendered.contains("form does not produce a value"),
      "rendered:\n{rendered}"
    );
  }

  #[test]
  fn loop_bounds_must_be_integers() {
    let rendered = error_of("(loop 2.5 1)");
    assert!(
      rendered.contains("loop count must be an integer"),
      "rendered:\n{rendered}"
    );
  }

  #[test]
  fn float_function_results_update_the_registered_type() {
    let ir = compile_to_ir("(define (half n) (/ n 2.0)) (half 5)").expect("compiles");
    assert!(ir.contains("define double @half(i32 %n) {"), "ir:\n{ir}");
    assert!(ir.contains("%0 = sitofp i32 %n to double"), "ir:\n{ir}");
    assert!(ir.contains("%1 = fdiv double %0, 2.0"), "ir:\n{ir}");
    assert!(ir.contains("ret double %1"), "ir:\n{ir}");
    assert!(
      main_text(&ir).contains("%0 = call double @half(i32 5)"),
      "ir:\n{ir}"
    );
  }
}
