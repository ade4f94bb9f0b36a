//! End-to-end scenarios for the symbolic execution engine.
//!
//! Each test builds a small GOTO program with the builder helpers, runs
//! the executor, and checks the shape of the emitted equation: which
//! assignments exist, under which guards, which phi selections appear at
//! merges, and how the verification-condition counters come out.

use gotosym_engine::{
    AssignmentKind, Equation, Executor, RunOutcome, SavedPath, SsaStep, SymexConfig,
};
use gotosym_ir::{
    BinaryOp, Expr, GotoFunction, GotoProgram, Ident, Instruction, InstructionKind, Symbol,
    SymbolTable, Type,
};

// ---------------------------------------------------------------------------
// Builder helpers
// ---------------------------------------------------------------------------

fn i32_ty() -> Type {
    Type::signed(32)
}

fn sym(name: &str) -> Expr {
    Expr::plain_symbol(name, i32_ty())
}

fn int(value: i128) -> Expr {
    Expr::int(value, i32_ty())
}

fn decl(name: &str) -> Instruction {
    Instruction::new(InstructionKind::Decl { symbol: sym(name) })
}

fn assign(name: &str, rhs: Expr) -> Instruction {
    Instruction::new(InstructionKind::Assign {
        lhs: sym(name),
        rhs,
    })
}

fn goto_if(cond: Expr, target: usize) -> Instruction {
    Instruction::new(InstructionKind::Goto { cond, target })
}

fn goto(target: usize) -> Instruction {
    Instruction::new(InstructionKind::Goto {
        cond: Expr::bool_true(),
        target,
    })
}

fn assert_eq_instr(name: &str, value: i128, property: &str) -> Instruction {
    Instruction::new(InstructionKind::Assert {
        cond: Expr::binary(BinaryOp::Eq, sym(name), int(value), Type::Bool),
        msg: format!("{name} == {value}"),
        property: property.into(),
    })
}

fn skip() -> Instruction {
    Instruction::new(InstructionKind::Skip)
}

fn end() -> Instruction {
    Instruction::new(InstructionKind::EndFunction)
}

fn gt_zero(name: &str) -> Expr {
    Expr::binary(BinaryOp::Gt, sym(name), int(0), Type::Bool)
}

fn program(body: Vec<Instruction>) -> GotoProgram {
    let mut p = GotoProgram::new("main");
    p.add_function(GotoFunction::new("main", Type::Empty).with_body(body))
        .unwrap();
    p.validate().unwrap();
    p
}

fn run(program: &GotoProgram, symbols: &SymbolTable, config: SymexConfig) -> (Equation, usize) {
    let mut executor = Executor::new(program, symbols, config);
    let equation = executor
        .symex_from_entry_point(&program.entry_point)
        .unwrap()
        .clone();
    (equation, executor.get_remaining_vccs())
}

fn state_assignments_to(equation: &Equation, base: &str) -> Vec<String> {
    equation
        .steps()
        .iter()
        .filter_map(|step| match step {
            SsaStep::Assignment {
                lhs,
                kind: AssignmentKind::State,
                ..
            } if format!("{lhs}").starts_with(base) => Some(format!("{step}")),
            _ => None,
        })
        .collect()
}

fn phi_assignments_to(equation: &Equation, base: &str) -> Vec<String> {
    equation
        .steps()
        .iter()
        .filter_map(|step| match step {
            SsaStep::Assignment {
                lhs,
                rhs,
                kind: AssignmentKind::Phi,
                ..
            } if format!("{lhs}").starts_with(base) => Some(format!("{lhs} := {rhs}")),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Scenario: straight-line strongest postcondition
// ---------------------------------------------------------------------------

#[test]
fn straight_line_program_discharges_by_propagation() {
    // x := 5; y := x + 1; assert y == 6
    let p = program(vec![
        decl("x"),
        decl("y"),
        assign("x", int(5)),
        assign(
            "y",
            Expr::binary(BinaryOp::Add, sym("x"), int(1), i32_ty()),
        ),
        assert_eq_instr("y", 6, "main.assertion.1"),
        end(),
    ]);
    let symbols = SymbolTable::new();
    let (equation, remaining) = run(&p, &symbols, SymexConfig::default());

    assert_eq!(equation.total_vccs(), 1);
    // Constant propagation folds the condition to true: nothing remains.
    assert_eq!(remaining, 0);
    equation.validate().unwrap();
}

#[test]
fn propagation_disabled_leaves_the_condition_symbolic() {
    let p = program(vec![
        decl("x"),
        assign("x", int(5)),
        assert_eq_instr("x", 5, "main.assertion.1"),
        end(),
    ]);
    let symbols = SymbolTable::new();
    let config = SymexConfig {
        constant_propagation: false,
        ..SymexConfig::default()
    };
    let (equation, remaining) = run(&p, &symbols, config);
    assert_eq!(remaining, 1);
    equation.validate().unwrap();
}

// ---------------------------------------------------------------------------
// Scenario: forward branch merge (phi)
// ---------------------------------------------------------------------------

fn branch_program() -> GotoProgram {
    // if (x > 0) y := 1 else y := 2
    program(vec![
        decl("x"),                      // 0
        decl("y"),                      // 1
        assign("x", Expr::nondet(i32_ty())), // 2
        goto_if(gt_zero("x"), 6),       // 3
        assign("y", int(2)),            // 4
        goto(7),                        // 5
        assign("y", int(1)),            // 6
        skip(),                         // 7: join
        end(),                          // 8
    ])
}

#[test]
fn forward_branch_merges_with_guarded_phi() {
    let symbols = SymbolTable::new();
    let (equation, _) = run(&branch_program(), &symbols, SymexConfig::default());

    let phis = phi_assignments_to(&equation, "y");
    assert_eq!(phis.len(), 1, "expected one phi for y, got {phis:?}");
    // The selection covers both arm values.
    assert!(phis[0].contains('1') && phis[0].contains('2'), "{}", phis[0]);

    // Both arms were emitted under their branch guards.
    let arms = state_assignments_to(&equation, "y");
    assert_eq!(arms.len(), 2, "expected both arm assignments: {arms:?}");
    equation.validate().unwrap();
}

#[test]
fn decided_branch_does_not_fork() {
    // x := 1; if (x > 0) y := 1 else y := 2 -- the branch folds.
    let p = program(vec![
        decl("x"),
        decl("y"),
        assign("x", int(1)),
        goto_if(gt_zero("x"), 6),
        assign("y", int(2)),
        goto(7),
        assign("y", int(1)),
        skip(),
        end(),
    ]);
    let symbols = SymbolTable::new();
    let (equation, _) = run(&p, &symbols, SymexConfig::default());

    assert!(phi_assignments_to(&equation, "y").is_empty());
    let arms = state_assignments_to(&equation, "y");
    assert_eq!(arms.len(), 1, "only the taken arm runs: {arms:?}");
    assert!(arms[0].contains(":= 1"), "{}", arms[0]);
}

// ---------------------------------------------------------------------------
// Scenario: loop unwinding
// ---------------------------------------------------------------------------

fn loop_program() -> GotoProgram {
    // i := 0; while (i < n) i := i + 1
    program(vec![
        decl("i"), // 0
        decl("n"), // 1
        assign("i", int(0)), // 2
        goto_if(
            Expr::binary(BinaryOp::Ge, sym("i"), sym("n"), Type::Bool),
            6,
        ), // 3: exit test
        assign(
            "i",
            Expr::binary(BinaryOp::Add, sym("i"), int(1), i32_ty()),
        ), // 4
        goto(3), // 5: back-edge
        skip(),  // 6: exit join
        end(),   // 7
    ])
}

#[test]
fn unwind_two_with_assertions_emits_unwinding_assertion_and_phis() {
    let mut config = SymexConfig {
        unwinding_assertions: true,
        ..SymexConfig::default()
    };
    config.set_loop_unwind_limit(&Ident::new("main"), 3, 2);

    let symbols = SymbolTable::new();
    let (equation, remaining) = run(&loop_program(), &symbols, config);

    let unwind_asserts: Vec<&SsaStep> = equation
        .steps()
        .iter()
        .filter(|s| matches!(s, SsaStep::Assert { msg, .. } if msg == "unwinding assertion"))
        .collect();
    assert_eq!(unwind_asserts.len(), 1);
    assert!(remaining >= 1, "the unwinding assertion remains open");

    // The exit join re-versions i via phi selections.
    assert!(
        !phi_assignments_to(&equation, "i").is_empty(),
        "loop exit should phi i"
    );
    equation.validate().unwrap();
}

#[test]
fn unwind_bound_zero_takes_no_back_edge() {
    let mut config = SymexConfig::default();
    config.set_loop_unwind_limit(&Ident::new("main"), 3, 0);

    let symbols = SymbolTable::new();
    let (equation, _) = run(&loop_program(), &symbols, config);

    // i := 0 plus exactly one body execution (entered before the first
    // back-edge attempt); no further unwindings.
    let writes = state_assignments_to(&equation, "i");
    assert_eq!(writes.len(), 2, "{writes:?}");
}

#[test]
fn default_truncation_emits_sound_assumption() {
    let mut config = SymexConfig::default();
    config.set_loop_unwind_limit(&Ident::new("main"), 3, 1);

    let symbols = SymbolTable::new();
    let (equation, _) = run(&loop_program(), &symbols, config);

    assert!(
        equation
            .steps()
            .iter()
            .any(|s| matches!(s, SsaStep::Assume { .. })),
        "truncation must leave an assumption"
    );
    assert_eq!(equation.total_vccs(), 0);
}

#[test]
fn partial_loops_suppresses_the_truncation_assumption() {
    let mut config = SymexConfig {
        partial_loops: true,
        ..SymexConfig::default()
    };
    config.set_loop_unwind_limit(&Ident::new("main"), 3, 1);

    let symbols = SymbolTable::new();
    let (equation, _) = run(&loop_program(), &symbols, config);
    assert!(
        !equation
            .steps()
            .iter()
            .any(|s| matches!(s, SsaStep::Assume { .. })),
        "partial loops drop the unwinding assumption"
    );
}

// ---------------------------------------------------------------------------
// Scenario: pointer dereference writes
// ---------------------------------------------------------------------------

#[test]
fn deref_write_with_two_targets_emits_guarded_assignments() {
    let ptr_ty = Type::pointer(i32_ty());
    let p_sym = Expr::plain_symbol("p", ptr_ty.clone());
    // if (c > 0) p := &a else p := &b; *p := 5
    let p = program(vec![
        decl("a"), // 0
        decl("b"), // 1
        Instruction::new(InstructionKind::Decl {
            symbol: p_sym.clone(),
        }), // 2
        decl("c"), // 3
        goto_if(gt_zero("c"), 7), // 4
        Instruction::new(InstructionKind::Assign {
            lhs: p_sym.clone(),
            rhs: Expr::address_of(sym("b")),
        }), // 5
        goto(8), // 6
        Instruction::new(InstructionKind::Assign {
            lhs: p_sym.clone(),
            rhs: Expr::address_of(sym("a")),
        }), // 7
        Instruction::new(InstructionKind::Assign {
            lhs: Expr::deref(p_sym),
            rhs: int(5),
        }), // 8
        end(), // 9
    ]);
    let symbols = SymbolTable::new();
    let (equation, remaining) = run(&p, &symbols, SymexConfig::default());

    // Both candidate objects receive a selection between the written value
    // and their previous contents.
    let writes_a = state_assignments_to(&equation, "a!0@1");
    let writes_b = state_assignments_to(&equation, "b!0@1");
    assert_eq!(writes_a.len(), 1, "{writes_a:?}");
    assert_eq!(writes_b.len(), 1, "{writes_b:?}");
    assert!(writes_a[0].contains('5') && writes_a[0].contains('?'), "{}", writes_a[0]);
    assert!(writes_b[0].contains('5') && writes_b[0].contains('?'), "{}", writes_b[0]);

    // The set fully covers the pointer: no dereference-failure VCC.
    assert_eq!(remaining, 0);
    equation.validate().unwrap();
}

#[test]
fn deref_of_unknown_pointer_raises_failure_assertion() {
    let ptr_ty = Type::pointer(i32_ty());
    let p_sym = Expr::plain_symbol("p", ptr_ty);
    let p = program(vec![
        Instruction::new(InstructionKind::Decl {
            symbol: p_sym.clone(),
        }),
        Instruction::new(InstructionKind::Assign {
            lhs: Expr::deref(p_sym),
            rhs: int(5),
        }),
        end(),
    ]);
    let symbols = SymbolTable::new();
    let (equation, remaining) = run(&p, &symbols, SymexConfig::default());
    assert_eq!(remaining, 1, "dereference failure must be flagged");
    assert!(equation
        .steps()
        .iter()
        .any(|s| matches!(s, SsaStep::Assert { msg, .. } if msg.contains("dereference failure"))));
}

#[test]
fn pointer_unsoundness_silences_the_failure() {
    let ptr_ty = Type::pointer(i32_ty());
    let p_sym = Expr::plain_symbol("p", ptr_ty);
    let p = program(vec![
        Instruction::new(InstructionKind::Decl {
            symbol: p_sym.clone(),
        }),
        Instruction::new(InstructionKind::Assign {
            lhs: Expr::deref(p_sym),
            rhs: int(5),
        }),
        end(),
    ]);
    let symbols = SymbolTable::new();
    let config = SymexConfig {
        allow_pointer_unsoundness: true,
        ..SymexConfig::default()
    };
    let (equation, _) = run(&p, &symbols, config);
    assert_eq!(equation.total_vccs(), 0);
}

// ---------------------------------------------------------------------------
// Scenario: function calls and recursion bounds
// ---------------------------------------------------------------------------

fn recursion_program(argument: Expr) -> GotoProgram {
    // int fun(int n) { if (n > 0) return fun(n - 1) + 1; return 0; }
    let mut p = GotoProgram::new("main");
    p.add_function(
        GotoFunction::new("fun", i32_ty())
            .with_parameter("n", i32_ty())
            .with_body(vec![
                goto_if(gt_zero("n"), 2), // 0
                Instruction::new(InstructionKind::Return {
                    value: Some(int(0)),
                }), // 1
                decl("tmp"), // 2
                Instruction::new(InstructionKind::FunctionCall {
                    lhs: Some(sym("tmp")),
                    function: Expr::plain_symbol("fun", i32_ty()),
                    args: vec![Expr::binary(BinaryOp::Sub, sym("n"), int(1), i32_ty())],
                }), // 3
                Instruction::new(InstructionKind::Return {
                    value: Some(Expr::binary(BinaryOp::Add, sym("tmp"), int(1), i32_ty())),
                }), // 4
                end(), // 5
            ]),
    )
    .unwrap();
    p.add_function(GotoFunction::new("main", Type::Empty).with_body(vec![
        decl("z"), // 0
        Instruction::new(InstructionKind::FunctionCall {
            lhs: Some(sym("z")),
            function: Expr::plain_symbol("fun", i32_ty()),
            args: vec![argument],
        }), // 1
        assert_eq_instr("z", 0, "main.assertion.1"), // 2
        end(), // 3
    ]))
    .unwrap();
    p.validate().unwrap();
    p
}

#[test]
fn recursion_base_case_discharges_assertion() {
    let p = recursion_program(int(0));
    let symbols = SymbolTable::new();
    let (equation, remaining) = run(&p, &symbols, SymexConfig::default());

    // One frame of fun: the constant argument kills the recursive branch.
    let calls = equation
        .steps()
        .iter()
        .filter(|s| matches!(s, SsaStep::FunctionCall { .. }))
        .count();
    assert_eq!(calls, 1);

    let writes = state_assignments_to(&equation, "z");
    assert_eq!(writes.len(), 1, "{writes:?}");
    assert!(writes[0].contains(":= 0"), "{}", writes[0]);

    // fun(0) == 0 discharges by propagation.
    assert_eq!(remaining, 0);
    equation.validate().unwrap();
}

#[test]
fn recursion_bound_zero_havocs_the_nested_call() {
    let p = recursion_program(Expr::nondet(i32_ty()));
    let symbols = SymbolTable::new();
    let config = SymexConfig {
        recursion_limit: Some(0),
        ..SymexConfig::default()
    };
    let (equation, remaining) = run(&p, &symbols, config);

    // One call enters fun; the self-call is cut and its result havocked.
    let calls = equation
        .steps()
        .iter()
        .filter(|s| matches!(s, SsaStep::FunctionCall { .. }))
        .count();
    assert_eq!(calls, 1);

    let havocked = equation.steps().iter().any(|s| match s {
        SsaStep::Assignment { lhs, rhs, .. } => {
            format!("{lhs}").starts_with("tmp") && format!("{rhs}").contains("nondet$")
        }
        _ => false,
    });
    assert!(havocked, "the blocked recursive call havocs its result");

    // With an unknown argument the result is unconstrained: the assertion
    // stays open.
    assert_eq!(remaining, 1);
}

#[test]
fn missing_body_havocs_the_result() {
    let mut p = GotoProgram::new("main");
    p.add_function(GotoFunction::new("main", Type::Empty).with_body(vec![
        decl("z"),
        Instruction::new(InstructionKind::FunctionCall {
            lhs: Some(sym("z")),
            function: Expr::plain_symbol("mystery", i32_ty()),
            args: vec![],
        }),
        assert_eq_instr("z", 0, "main.assertion.1"),
        end(),
    ]))
    .unwrap();
    let symbols = SymbolTable::new();
    let (equation, remaining) = run(&p, &symbols, SymexConfig::default());

    assert!(equation.steps().iter().any(|s| match s {
        SsaStep::Assignment { lhs, rhs, .. } =>
            format!("{lhs}").starts_with("z") && format!("{rhs}").contains("nondet$"),
        _ => false,
    }));
    assert_eq!(remaining, 1);
}

// ---------------------------------------------------------------------------
// Scenario: threads
// ---------------------------------------------------------------------------

fn thread_program() -> (GotoProgram, SymbolTable) {
    let p = program(vec![
        Instruction::new(InstructionKind::StartThread { target: 3 }), // 0
        assign("x", int(2)),                                          // 1
        goto(5),                                                      // 2
        assign("x", int(1)),                                          // 3: thread body
        Instruction::new(InstructionKind::EndThread),                 // 4
        end(),                                                        // 5
    ]);
    let mut symbols = SymbolTable::new();
    symbols.insert(Symbol::global("x", i32_ty())).unwrap();
    (p, symbols)
}

#[test]
fn thread_spawn_emits_marker_and_both_writes() {
    let (p, symbols) = thread_program();
    let (equation, _) = run(&p, &symbols, SymexConfig::default());

    assert!(equation
        .steps()
        .iter()
        .any(|s| matches!(s, SsaStep::ThreadSpawn { .. })));

    // Both program threads write x under a live guard, with shared-write
    // markers for the interleaving exploration downstream.
    let live_writes: Vec<&SsaStep> = equation
        .steps()
        .iter()
        .filter(|s| match s {
            SsaStep::Assignment { lhs, guard, .. } => {
                format!("{lhs}").starts_with("x#") && guard.is_true()
            }
            _ => false,
        })
        .collect();
    assert_eq!(live_writes.len(), 2, "{live_writes:?}");

    let markers = equation
        .steps()
        .iter()
        .filter(|s| matches!(s, SsaStep::SharedWrite { guard, .. } if guard.is_true()))
        .count();
    assert_eq!(markers, 2);
    equation.validate().unwrap();
}

#[test]
fn atomic_section_suppresses_interleaving_markers() {
    let p = program(vec![
        Instruction::new(InstructionKind::StartThread { target: 6 }), // 0
        Instruction::new(InstructionKind::AtomicBegin),               // 1
        assign("x", int(2)),                                          // 2
        Instruction::new(InstructionKind::AtomicEnd),                 // 3
        assign("x", int(3)),                                          // 4
        goto(8),                                                      // 5
        assign("x", int(1)),                                          // 6
        Instruction::new(InstructionKind::EndThread),                 // 7
        end(),                                                        // 8
    ]);
    let mut symbols = SymbolTable::new();
    symbols.insert(Symbol::global("x", i32_ty())).unwrap();
    let (equation, _) = run(&p, &symbols, SymexConfig::default());

    let begin = equation
        .steps()
        .iter()
        .position(|s| matches!(s, SsaStep::AtomicBegin { .. }))
        .expect("atomic begin marker");
    let end_marker = equation
        .steps()
        .iter()
        .position(|s| matches!(s, SsaStep::AtomicEnd { .. }))
        .expect("atomic end marker");
    assert!(begin < end_marker);

    let inside = &equation.steps()[begin..end_marker];
    assert!(
        !inside
            .iter()
            .any(|s| matches!(s, SsaStep::SharedWrite { .. })),
        "no interleaving markers inside the atomic section"
    );
    // The write after the section gets its marker back.
    let after = &equation.steps()[end_marker..];
    assert!(after
        .iter()
        .any(|s| matches!(s, SsaStep::SharedWrite { guard, .. } if guard.is_true())));
}

// ---------------------------------------------------------------------------
// Scenario: path exploration
// ---------------------------------------------------------------------------

#[test]
fn path_exploration_pauses_with_one_stored_path() {
    let p = branch_program();
    let symbols = SymbolTable::new();
    let config = SymexConfig {
        doing_path_exploration: true,
        ..SymexConfig::default()
    };
    let mut executor = Executor::new(&p, &symbols, config);
    let mut state = executor
        .initialize_from_entry_point(&p.entry_point)
        .unwrap();

    let outcome = executor.run_path(&mut state).unwrap();
    assert_eq!(outcome, RunOutcome::Paused);
    assert!(executor.should_pause_symex);
    assert_eq!(executor.stored_paths(), 1);
    assert!(!executor.equation().is_empty(), "prefix committed");

    // Resume the stored path first, then the paused continuation.
    let stored = executor.pop_path().unwrap();
    assert_eq!(executor.resume(stored).unwrap(), RunOutcome::Complete);
    assert_eq!(
        executor.resume(SavedPath::new(state)).unwrap(),
        RunOutcome::Complete
    );

    // No merging: both arm assignments exist, no phi.
    let equation = executor.equation();
    let arms = state_assignments_to(equation, "y");
    assert_eq!(arms.len(), 2, "{arms:?}");
    assert!(phi_assignments_to(equation, "y").is_empty());
    equation.validate().unwrap();
}

#[test]
fn path_exploration_drains_all_paths_from_the_driver() {
    let p = branch_program();
    let symbols = SymbolTable::new();
    let config = SymexConfig {
        doing_path_exploration: true,
        ..SymexConfig::default()
    };
    let mut executor = Executor::new(&p, &symbols, config);
    let equation = executor.symex_from_entry_point(&p.entry_point).unwrap();

    let arms = state_assignments_to(equation, "y");
    assert_eq!(arms.len(), 2, "{arms:?}");
    assert!(phi_assignments_to(equation, "y").is_empty());
}

// ---------------------------------------------------------------------------
// Boundaries
// ---------------------------------------------------------------------------

#[test]
fn max_depth_one_truncates_after_one_step() {
    let p = program(vec![
        assign("x", int(5)),
        assign("y", int(6)),
        assert_eq_instr("y", 6, "main.assertion.1"),
        end(),
    ]);
    let symbols = SymbolTable::new();
    let config = SymexConfig {
        max_depth: 1,
        ..SymexConfig::default()
    };
    let (equation, remaining) = run(&p, &symbols, config);

    let live_assignments = equation
        .steps()
        .iter()
        .filter(|s| match s {
            SsaStep::Assignment {
                guard,
                kind: AssignmentKind::State,
                ..
            } => guard.is_true(),
            _ => false,
        })
        .count();
    assert_eq!(live_assignments, 1, "exactly one step before truncation");

    assert!(equation
        .steps()
        .iter()
        .any(|s| matches!(s, SsaStep::Assume { cond, .. } if cond.is_false())));
    // Everything after the cut carries a false guard.
    assert_eq!(remaining, 0);
}

#[test]
fn assume_false_kills_the_path() {
    let p = program(vec![
        decl("x"),
        Instruction::new(InstructionKind::Assume {
            cond: Expr::bool_false(),
        }),
        assign("x", int(5)),
        assert_eq_instr("x", 7, "main.assertion.1"),
        end(),
    ]);
    let symbols = SymbolTable::new();
    let (equation, remaining) = run(&p, &symbols, SymexConfig::default());
    // Nothing after the false assumption reaches the equation.
    assert_eq!(equation.total_vccs(), 0);
    assert_eq!(remaining, 0);
    assert!(state_assignments_to(&equation, "x").is_empty());
}

// ---------------------------------------------------------------------------
// Exceptions
// ---------------------------------------------------------------------------

#[test]
fn throw_lands_on_matching_handler() {
    let p = program(vec![
        decl("e"), // 0
        Instruction::new(InstructionKind::CatchPush {
            handlers: vec![("overflow".into(), 5)],
        }), // 1
        Instruction::new(InstructionKind::Throw {
            exception: int(42),
            tag: "overflow".into(),
        }), // 2
        assign("e", int(0)), // 3: skipped
        Instruction::new(InstructionKind::CatchPop), // 4
        Instruction::new(InstructionKind::Landingpad { lhs: sym("e") }), // 5
        assert_eq_instr("e", 42, "main.assertion.1"), // 6
        end(), // 7
    ]);
    let symbols = SymbolTable::new();
    let (equation, remaining) = run(&p, &symbols, SymexConfig::default());

    // The landing pad receives the thrown value; the assertion folds.
    assert_eq!(remaining, 0);
    assert!(!equation
        .steps()
        .iter()
        .any(|s| matches!(s, SsaStep::Assert { msg, .. } if msg.contains("uncaught"))));
    equation.validate().unwrap();
}

#[test]
fn uncaught_throw_is_a_verification_failure() {
    let p = program(vec![
        Instruction::new(InstructionKind::Throw {
            exception: int(1),
            tag: "io_error".into(),
        }),
        end(),
    ]);
    let symbols = SymbolTable::new();
    let (equation, remaining) = run(&p, &symbols, SymexConfig::default());
    assert!(equation
        .steps()
        .iter()
        .any(|s| matches!(s, SsaStep::Assert { msg, .. } if msg.contains("uncaught"))));
    assert_eq!(remaining, 1);
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[test]
fn identical_runs_render_identical_equations() {
    use gotosym_engine::prop::{random_straight_line_program, RandomProgramConfig};

    let generated = random_straight_line_program(&RandomProgramConfig {
        seed: 42,
        assignments: 24,
        variables: 5,
    });
    let symbols = SymbolTable::new();
    let (first, _) = run(&generated, &symbols, SymexConfig::default());
    let (second, _) = run(&generated, &symbols, SymexConfig::default());
    assert_eq!(format!("{first}"), format!("{second}"));
}
