//! End-to-end tests: build a program, run it, assert on the resulting
//! context, indicators, and exit status.

use tabula_program::{
    ConditionOp, ControlOp, Date, Decimal, ExprChunk, ExprOp, GuardTerm, InstructionRecord, Kind,
    LocationDescriptor, MoveOp, OpGroup, Opcode, ProgramBuilder, Relation, TypedValue,
};
use tabula_runtime::{
    code, flag, reg, AbortReason, Error, ErrorCode, ExitStatus, MAX_CALL_DEPTH,
};
use tabula_tests::TestHarness;

fn cdesc(builder: &mut ProgramBuilder, value: TypedValue, kind: Kind) -> LocationDescriptor {
    LocationDescriptor::constant(builder.constant(value), kind)
}

#[test]
fn test_move_constant_to_variable() {
    let mut b = ProgramBuilder::new();
    let v0 = b.variable(TypedValue::Int(0));
    let src = cdesc(&mut b, TypedValue::Int(42), Kind::Int);
    b.emit(
        InstructionRecord::new(Opcode::movement(MoveOp::MoveInt))
            .with_args(src, LocationDescriptor::variable(v0, Kind::Int)),
    );
    let mut h = TestHarness::new(b);
    assert_eq!(h.run(), ExitStatus::Completed);
    assert_eq!(h.variable(v0), TypedValue::Int(42));
}

#[test]
fn test_guard_gates_execution() {
    let mut b = ProgramBuilder::new();
    let v0 = b.variable(TypedValue::Int(0));
    let src = cdesc(&mut b, TypedValue::Int(1), Kind::Int);
    b.emit(
        InstructionRecord::new(Opcode::movement(MoveOp::MoveInt))
            .with_args(src, LocationDescriptor::variable(v0, Kind::Int))
            .with_guard(GuardTerm::flag(5)),
    );
    // Flag 5 is clear: the move must not run.
    let mut h = TestHarness::new(b);
    h.run();
    assert_eq!(h.variable(v0), TypedValue::Int(0));
}

#[test]
fn test_negated_guard_executes_on_clear_flag() {
    let mut b = ProgramBuilder::new();
    let v0 = b.variable(TypedValue::Int(0));
    let src = cdesc(&mut b, TypedValue::Int(1), Kind::Int);
    b.emit(
        InstructionRecord::new(Opcode::movement(MoveOp::MoveInt))
            .with_args(src, LocationDescriptor::variable(v0, Kind::Int))
            .with_guard(GuardTerm::flag_negated(5)),
    );
    let mut h = TestHarness::new(b);
    h.run();
    assert_eq!(h.variable(v0), TypedValue::Int(1));
}

#[test]
fn test_incr_goto_loop_until_limit() {
    let mut b = ProgramBuilder::new();
    let v0 = b.variable(TypedValue::Int(0));
    let limit = cdesc(&mut b, TypedValue::Int(3), Kind::Int);
    let top = cdesc(&mut b, TypedValue::Int(0), Kind::Int);
    b.emit(
        InstructionRecord::new(Opcode::movement(MoveOp::Incr))
            .with_args(LocationDescriptor::variable(v0, Kind::Int), limit),
    );
    b.emit(
        InstructionRecord::new(Opcode::control(ControlOp::Goto))
            .with_arg(top)
            .with_guard(GuardTerm::flag_negated(flag::LOOP_DONE as u8)),
    );
    let mut h = TestHarness::new(b);
    assert_eq!(h.run(), ExitStatus::Completed);
    // The counter passes the limit on the increment to 4.
    assert_eq!(h.variable(v0), TypedValue::Int(4));
    assert!(h.indicator(flag::LOOP_DONE));
}

#[test]
fn test_gosub_and_return() {
    let mut b = ProgramBuilder::new();
    let v0 = b.variable(TypedValue::Int(0));
    let v1 = b.variable(TypedValue::Int(0));
    let sub = cdesc(&mut b, TypedValue::Int(3), Kind::Int);
    let one = cdesc(&mut b, TypedValue::Int(1), Kind::Int);
    let two = cdesc(&mut b, TypedValue::Int(2), Kind::Int);
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::Gosub)).with_arg(sub));
    b.emit(
        InstructionRecord::new(Opcode::movement(MoveOp::MoveInt))
            .with_args(one, LocationDescriptor::variable(v0, Kind::Int)),
    );
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::Abort)));
    b.emit(
        InstructionRecord::new(Opcode::movement(MoveOp::MoveInt))
            .with_args(two, LocationDescriptor::variable(v1, Kind::Int)),
    );
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::Return)));
    let mut h = TestHarness::new(b);
    assert_eq!(h.run(), ExitStatus::Aborted(AbortReason::Requested));
    assert_eq!(h.variable(v1), TypedValue::Int(2));
    assert_eq!(h.variable(v0), TypedValue::Int(1));
    assert_eq!(h.register(reg::LAST_CALL_LINE), 0);
    assert_eq!(h.context().control.depth(), 0);
}

#[test]
fn test_call_depth_overflow_is_fatal_at_the_bound() {
    let mut b = ProgramBuilder::new();
    let top = cdesc(&mut b, TypedValue::Int(0), Kind::Int);
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::Gosub)).with_arg(top));
    let mut h = TestHarness::new(b);
    let status = h.run();
    assert_eq!(
        status,
        ExitStatus::Aborted(AbortReason::FatalError {
            code: code::CALL_DEPTH,
            line: 0,
        })
    );
    // Exactly the bound's worth of frames were pushed; the refused push
    // did not go through.
    assert_eq!(h.context().control.depth(), MAX_CALL_DEPTH);
    assert_eq!(h.host.reported.len(), 1);
    assert_eq!(h.host.reported[0].0, 97);
}

#[test]
fn test_error_recovery_subroutine() {
    let mut b = ProgramBuilder::new();
    let v0 = b.variable(TypedValue::Int(0));
    let v1 = b.variable(TypedValue::Int(0));
    let errcode = cdesc(&mut b, TypedValue::Int(200), Kind::Int);
    let seven = cdesc(&mut b, TypedValue::Int(7), Kind::Int);
    let nine = cdesc(&mut b, TypedValue::Int(9), Kind::Int);
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::RaiseError)).with_arg(errcode));
    b.emit(
        InstructionRecord::new(Opcode::movement(MoveOp::MoveInt))
            .with_args(seven, LocationDescriptor::variable(v0, Kind::Int)),
    );
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::Abort)));
    // Recovery handler.
    b.emit(
        InstructionRecord::new(Opcode::movement(MoveOp::MoveInt))
            .with_args(nine, LocationDescriptor::variable(v1, Kind::Int)),
    );
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::Return)));
    let mut h = TestHarness::new(b);
    h.set_register(reg::ON_ERROR, 3);
    assert_eq!(h.run(), ExitStatus::Aborted(AbortReason::Requested));
    assert_eq!(h.variable(v1), TypedValue::Int(9));
    assert_eq!(h.variable(v0), TypedValue::Int(7));
    assert_eq!(h.register(reg::ERROR_CODE), 200);
    assert_eq!(h.register(reg::ERROR_LINE), 0);
    assert!(h.indicator(flag::ERROR));
    assert!(!h.context().control.recovery_armed());
}

#[test]
fn test_user_error_without_handler_continues() {
    let mut b = ProgramBuilder::new();
    let v0 = b.variable(TypedValue::Int(0));
    let errcode = cdesc(&mut b, TypedValue::Int(200), Kind::Int);
    let one = cdesc(&mut b, TypedValue::Int(1), Kind::Int);
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::RaiseError)).with_arg(errcode));
    b.emit(
        InstructionRecord::new(Opcode::movement(MoveOp::MoveInt))
            .with_args(one, LocationDescriptor::variable(v0, Kind::Int)),
    );
    let mut h = TestHarness::new(b);
    assert_eq!(h.run(), ExitStatus::Completed);
    assert_eq!(h.variable(v0), TypedValue::Int(1));
    assert!(h.indicator(flag::ERROR));
}

#[test]
fn test_hard_fatal_code_aborts_without_handler() {
    let mut b = ProgramBuilder::new();
    let errcode = cdesc(&mut b, TypedValue::Int(18), Kind::Int);
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::RaiseError)).with_arg(errcode));
    let mut h = TestHarness::new(b);
    assert_eq!(
        h.run(),
        ExitStatus::Aborted(AbortReason::FatalError {
            code: ErrorCode(18),
            line: 0,
        })
    );
}

#[test]
fn test_error_inside_recovery_upgrades_to_abort() {
    let mut b = ProgramBuilder::new();
    let first = cdesc(&mut b, TypedValue::Int(200), Kind::Int);
    let second = cdesc(&mut b, TypedValue::Int(201), Kind::Int);
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::RaiseError)).with_arg(first));
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::Abort)));
    // Handler raises again while recovery is armed.
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::RaiseError)).with_arg(second));
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::Return)));
    let mut h = TestHarness::new(b);
    h.set_register(reg::ON_ERROR, 2);
    assert_eq!(
        h.run(),
        ExitStatus::Aborted(AbortReason::FatalError {
            code: ErrorCode(201),
            line: 2,
        })
    );
}

#[test]
fn test_chain_request_surfaces_target_and_leave_open() {
    let mut b = ProgramBuilder::new();
    let target = cdesc(&mut b, TypedValue::Text("NEXT".into()), Kind::Text);
    let keep = cdesc(&mut b, TypedValue::Int(1), Kind::Int);
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::Chain)).with_args(target, keep));
    let mut h = TestHarness::new(b);
    assert_eq!(
        h.run(),
        ExitStatus::ChainRequested {
            target: "NEXT".into(),
            leave_open: true,
        }
    );
}

#[test]
fn test_key_check_sets_live_key_indicator() {
    let mut b = ProgramBuilder::new();
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::KeyCheck)));
    let mut h = TestHarness::new(b);
    h.host.keys.push(true);
    h.run();
    assert!(h.indicator(flag::KEY_LIVE));
}

#[test]
fn test_errclear_resets_error_indicator() {
    let mut b = ProgramBuilder::new();
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::ErrClear)));
    let mut h = TestHarness::new(b);
    h.set_indicator(flag::ERROR, true);
    h.run();
    assert!(!h.indicator(flag::ERROR));
    assert_eq!(h.host.warnings_cleared, 1);
}

#[test]
fn test_option_bits() {
    let mut b = ProgramBuilder::new();
    let three = cdesc(&mut b, TypedValue::Int(3), Kind::Int);
    let five = cdesc(&mut b, TypedValue::Int(5), Kind::Int);
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::OptSet)).with_arg(three));
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::OptSet)).with_arg(five));
    b.emit(InstructionRecord::new(Opcode::control(ControlOp::OptClr)).with_arg(three));
    let mut h = TestHarness::new(b);
    h.run();
    assert_eq!(h.context().options, 1 << 5);
}

#[test]
fn test_unsupported_group_is_recoverable() {
    let mut b = ProgramBuilder::new();
    b.emit(InstructionRecord::new(Opcode::group(OpGroup::File, 0)));
    let mut h = TestHarness::new(b);
    assert_eq!(h.run(), ExitStatus::Completed);
    assert!(h.indicator(flag::ERROR));
    assert_eq!(h.register(reg::ERROR_CODE), 58);
}

#[test]
fn test_field_and_window_moves() {
    let mut b = ProgramBuilder::new();
    let v0 = b.variable(TypedValue::Decimal(Decimal::ZERO));
    let nine = cdesc(&mut b, TypedValue::Int(9), Kind::Int);
    b.emit(
        InstructionRecord::new(Opcode::movement(MoveOp::MoveDecimal)).with_args(
            LocationDescriptor::field(1, 2, Kind::Decimal),
            LocationDescriptor::variable(v0, Kind::Decimal),
        ),
    );
    b.emit(
        InstructionRecord::new(Opcode::movement(MoveOp::MoveInt))
            .with_args(nine, LocationDescriptor::window(4, Kind::Int)),
    );
    let mut h = TestHarness::new(b);
    h.host
        .fields
        .insert((1, 2), TypedValue::Decimal(Decimal::from_int(5)));
    assert_eq!(h.run(), ExitStatus::Completed);
    assert_eq!(h.variable(v0), TypedValue::Decimal(Decimal::from_int(5)));
    assert_eq!(h.host.windows.get(&4), Some(&TypedValue::Int(9)));
}

#[test]
fn test_move_evaluates_text_source_as_expression() {
    let mut b = ProgramBuilder::new();
    let v0 = b.variable(TypedValue::Decimal(Decimal::ZERO));
    let src = cdesc(&mut b, TypedValue::Text("2*3".into()), Kind::Decimal);
    b.emit(
        InstructionRecord::new(Opcode::movement(MoveOp::MoveDecimal))
            .with_args(src, LocationDescriptor::variable(v0, Kind::Decimal)),
    );
    let mut h = TestHarness::new(b);
    assert_eq!(h.run(), ExitStatus::Completed);
    assert_eq!(h.variable(v0), TypedValue::Decimal(Decimal::from_int(6)));
}

#[test]
fn test_expression_argument_resolution() {
    let mut b = ProgramBuilder::new();
    let v0 = b.variable(TypedValue::Int(0));
    let mut chunk = ExprChunk::new(Kind::Int);
    let six = chunk.add_literal(TypedValue::Int(6));
    let seven = chunk.add_literal(TypedValue::Int(7));
    chunk.push(ExprOp::Literal(six), Kind::Int);
    chunk.push(ExprOp::Literal(seven), Kind::Int);
    chunk.push(ExprOp::Mul, Kind::Int);
    chunk.push(ExprOp::Output, Kind::Int);
    let expr = b.expression(chunk);
    b.emit(
        InstructionRecord::new(Opcode::movement(MoveOp::MoveInt)).with_args(
            LocationDescriptor::expression(expr, Kind::Int),
            LocationDescriptor::variable(v0, Kind::Int),
        ),
    );
    let mut h = TestHarness::new(b);
    assert_eq!(h.run(), ExitStatus::Completed);
    assert_eq!(h.variable(v0), TypedValue::Int(42));
}

#[test]
fn test_relational_instructions() {
    let mut b = ProgramBuilder::new();
    let three = cdesc(&mut b, TypedValue::Decimal(Decimal::from_int(3)), Kind::Decimal);
    let five = cdesc(&mut b, TypedValue::Decimal(Decimal::from_int(5)), Kind::Decimal);
    let apple = cdesc(&mut b, TypedValue::Text("apple".into()), Kind::Text);
    let banana = cdesc(&mut b, TypedValue::Text("banana".into()), Kind::Text);
    for (relation, kind, a, be, slot) in [
        (Relation::Le, Kind::Decimal, three, five, 10u8),
        (Relation::Gt, Kind::Decimal, three, five, 11),
        (Relation::Ne, Kind::Decimal, three, five, 12),
        (Relation::Lt, Kind::Text, apple, banana, 13),
    ] {
        b.emit(
            InstructionRecord::new(Opcode::condition(
                ConditionOp::Relational { relation, kind },
                slot,
                false,
            ))
            .with_args(a, be),
        );
    }
    // Negated store: 5 == 5 is true, stored inverted.
    let five_int = cdesc(&mut b, TypedValue::Int(5), Kind::Int);
    b.emit(
        InstructionRecord::new(Opcode::condition(
            ConditionOp::Relational {
                relation: Relation::Eq,
                kind: Kind::Int,
            },
            14,
            true,
        ))
        .with_args(five_int, five_int),
    );
    let mut h = TestHarness::new(b);
    assert_eq!(h.run(), ExitStatus::Completed);
    assert!(h.indicator(10));
    assert!(!h.indicator(11));
    assert!(h.indicator(12));
    assert!(h.indicator(13));
    assert!(!h.indicator(14));
}

#[test]
fn test_boolean_instructions_combine_chains() {
    let mut b = ProgramBuilder::new();
    let left = LocationDescriptor::guards([GuardTerm::flag(1), GuardTerm::NONE, GuardTerm::NONE]);
    let right = LocationDescriptor::guards([GuardTerm::flag(2), GuardTerm::NONE, GuardTerm::NONE]);
    b.emit(
        InstructionRecord::new(Opcode::condition(
            ConditionOp::Boolean {
                left_all: true,
                right_all: true,
                conjunction: false,
            },
            20,
            false,
        ))
        .with_args(left, right),
    );
    b.emit(
        InstructionRecord::new(Opcode::condition(
            ConditionOp::Boolean {
                left_all: true,
                right_all: true,
                conjunction: true,
            },
            21,
            false,
        ))
        .with_args(left, right),
    );
    let mut h = TestHarness::new(b);
    h.set_indicator(1, true);
    h.set_indicator(2, false);
    assert_eq!(h.run(), ExitStatus::Completed);
    assert!(h.indicator(20));
    assert!(!h.indicator(21));
}

#[test]
fn test_contains_and_match_instructions() {
    let mut b = ProgramBuilder::new();
    let ell = cdesc(&mut b, TypedValue::Text("ell".into()), Kind::Text);
    let hello = cdesc(&mut b, TypedValue::Text("hello".into()), Kind::Text);
    b.emit(
        InstructionRecord::new(Opcode::condition(ConditionOp::Contains, 30, false))
            .with_args(ell, hello),
    );
    let cases = [
        ("A?C", "ABC", 31u8),
        ("A?C", "XBC", 32),
        ("AB*", "ABD", 33),
    ];
    for (pattern, value, slot) in cases {
        let p = cdesc(&mut b, TypedValue::Text(pattern.into()), Kind::Text);
        let v = cdesc(&mut b, TypedValue::Text(value.into()), Kind::Text);
        b.emit(
            InstructionRecord::new(Opcode::condition(ConditionOp::Match, slot, false))
                .with_args(p, v),
        );
    }
    let mut h = TestHarness::new(b);
    assert_eq!(h.run(), ExitStatus::Completed);
    assert!(h.indicator(30));
    assert!(h.indicator(31));
    assert!(!h.indicator(32));
    assert!(h.indicator(33));
}

#[test]
fn test_file_status_condition() {
    let mut b = ProgramBuilder::new();
    b.emit(
        InstructionRecord::new(Opcode::condition(ConditionOp::FileStatus, 34, false))
            .with_arg(LocationDescriptor::field(3, 0, Kind::Int)),
    );
    let mut h = TestHarness::new(b);
    h.host.statuses.insert(3, 2);
    assert_eq!(h.run(), ExitStatus::Completed);
    assert!(h.indicator(34));
}

#[test]
fn test_division_by_zero_yields_zero() {
    let mut h = TestHarness::new(ProgramBuilder::new());
    assert_eq!(h.eval("10/0", Kind::Int).unwrap(), TypedValue::Int(0));
    assert_eq!(h.eval("10/0", Kind::Real).unwrap(), TypedValue::Real(0.0));
    assert_eq!(
        h.eval("10/0", Kind::Decimal).unwrap(),
        TypedValue::Decimal(Decimal::ZERO)
    );
    assert!(h.context().pending_error().is_none());
}

#[test]
fn test_literal_fast_path_kinds() {
    let mut h = TestHarness::new(ProgramBuilder::new());
    assert_eq!(h.eval("42", Kind::Int).unwrap(), TypedValue::Int(42));
    assert_eq!(h.eval("3.5", Kind::Real).unwrap(), TypedValue::Real(3.5));
    assert_eq!(
        h.eval(" 12/31/1999 ", Kind::Date).unwrap(),
        TypedValue::Date(Date::from_civil(1999, 12, 31).unwrap())
    );
    assert_eq!(h.eval("123", Kind::Text).unwrap(), TypedValue::Text("123".into()));
    assert_eq!(h.eval("", Kind::Int).unwrap(), TypedValue::Int(0));
}

#[test]
fn test_expression_arithmetic_and_functions() {
    let mut h = TestHarness::new(ProgramBuilder::new());
    assert_eq!(
        h.eval("1+2*3", Kind::Decimal).unwrap(),
        TypedValue::Decimal(Decimal::from_int(7))
    );
    assert_eq!(
        h.eval("(1+2)*3", Kind::Decimal).unwrap(),
        TypedValue::Decimal(Decimal::from_int(9))
    );
    assert_eq!(h.eval("2^3", Kind::Real).unwrap(), TypedValue::Real(8.0));
    assert_eq!(h.eval("-3", Kind::Int).unwrap(), TypedValue::Int(-3));
    assert_eq!(h.eval("MIN(4,7)", Kind::Int).unwrap(), TypedValue::Int(4));
    assert_eq!(h.eval("MAX(4,7)", Kind::Int).unwrap(), TypedValue::Int(7));
    assert_eq!(h.eval("ABS(0-9)", Kind::Int).unwrap(), TypedValue::Int(9));
    assert_eq!(h.eval("ROUND(2.5)", Kind::Real).unwrap(), TypedValue::Real(3.0));
    assert_eq!(h.eval("ROUND(0-2.5)", Kind::Real).unwrap(), TypedValue::Real(-3.0));
    assert_eq!(h.eval("SQRT(16)", Kind::Real).unwrap(), TypedValue::Real(4.0));
    assert_eq!(h.eval("6&3", Kind::Int).unwrap(), TypedValue::Int(2));
    assert_eq!(h.eval("6|3", Kind::Int).unwrap(), TypedValue::Int(7));
    assert_eq!(h.eval("1+2", Kind::Text).unwrap(), TypedValue::Text("3".into()));
}

#[test]
fn test_numeric_domain_faults_substitute_zero() {
    let mut h = TestHarness::new(ProgramBuilder::new());
    assert_eq!(h.eval("LOG(-1)", Kind::Real).unwrap(), TypedValue::Real(0.0));
    assert_eq!(h.context().pending_error(), Some(code::MATH_DOMAIN));

    // Square root takes the absolute value; no fault.
    let mut h = TestHarness::new(ProgramBuilder::new());
    assert_eq!(h.eval("SQRT(-9)", Kind::Real).unwrap(), TypedValue::Real(3.0));
    assert!(h.context().pending_error().is_none());
}

#[test]
fn test_reentrant_nested_text_operand() {
    let mut h = TestHarness::new(ProgramBuilder::new());
    let direct = h.eval("1+2*3", Kind::Decimal).unwrap();

    let mut chunk = ExprChunk::new(Kind::Decimal);
    let lit = chunk.add_literal(TypedValue::Text("1+2*3".into()));
    chunk.push(ExprOp::Literal(lit), Kind::Text);
    chunk.push(ExprOp::ToDecimal, Kind::Text);
    chunk.push(ExprOp::Output, Kind::Decimal);

    let mut host = tabula_tests::TestHost::default();
    let nested = h
        .runtime
        .evaluate_expr(&mut host, &chunk, Kind::Decimal)
        .unwrap();
    assert_eq!(nested, direct);
    assert_eq!(nested, TypedValue::Decimal(Decimal::from_int(7)));
    // The outer stack is untouched by the inner call's use of it.
    assert_eq!(h.context().operands.cursor(), 0);
    assert_eq!(h.context().texts.depth(), 0);
}

#[test]
fn test_stack_imbalance_is_fatal_internal_error() {
    let mut chunk = ExprChunk::new(Kind::Int);
    let one = chunk.add_literal(TypedValue::Int(1));
    let two = chunk.add_literal(TypedValue::Int(2));
    chunk.push(ExprOp::Literal(one), Kind::Int);
    chunk.push(ExprOp::Literal(two), Kind::Int);
    chunk.push(ExprOp::Output, Kind::Int);
    let mut h = TestHarness::new(ProgramBuilder::new());
    let mut host = tabula_tests::TestHost::default();
    let result = h.runtime.evaluate_expr(&mut host, &chunk, Kind::Int);
    assert!(matches!(result, Err(Error::StackImbalance)));
    // The cursor was restored despite the failure.
    assert_eq!(h.context().operands.cursor(), 0);
}

#[test]
fn test_length_of_pending_text() {
    let mut chunk = ExprChunk::new(Kind::Int);
    let lit = chunk.add_literal(TypedValue::Text("hello".into()));
    chunk.push(ExprOp::Literal(lit), Kind::Text);
    chunk.push(ExprOp::Length, Kind::Text);
    chunk.push(ExprOp::Output, Kind::Int);
    let mut h = TestHarness::new(ProgramBuilder::new());
    let mut host = tabula_tests::TestHost::default();
    let value = h.runtime.evaluate_expr(&mut host, &chunk, Kind::Int).unwrap();
    assert_eq!(value, TypedValue::Int(5));
}

#[test]
fn test_date_arithmetic_crosses_year_boundary() {
    let mut chunk = ExprChunk::new(Kind::Date);
    let eve = chunk.add_literal(TypedValue::Date(Date::from_civil(1999, 12, 31).unwrap()));
    let one = chunk.add_literal(TypedValue::Decimal(Decimal::from_int(1)));
    chunk.push(ExprOp::Literal(eve), Kind::Date);
    chunk.push(ExprOp::Literal(one), Kind::Decimal);
    chunk.push(ExprOp::Add, Kind::Date);
    chunk.push(ExprOp::Output, Kind::Date);
    let mut h = TestHarness::new(ProgramBuilder::new());
    let mut host = tabula_tests::TestHost::default();
    let value = h.runtime.evaluate_expr(&mut host, &chunk, Kind::Date).unwrap();
    assert_eq!(
        value,
        TypedValue::Date(Date::from_civil(2000, 1, 1).unwrap())
    );
}

#[test]
fn test_conversion_roundtrips() {
    let mut h = TestHarness::new(ProgramBuilder::new());
    // Integer → real → integer is exact for fraction-free values.
    for source in ["0", "1", "-17", "100000"] {
        let int_direct = h.eval(source, Kind::Int).unwrap();
        let through_real = h.eval(source, Kind::Real).unwrap();
        assert_eq!(through_real.convert(Kind::Int), Some(int_direct));
    }
    // Real → decimal → real holds within one decimal-precision unit.
    let real = h.eval("3.141592", Kind::Real).unwrap().as_real().unwrap();
    let decimal = TypedValue::Real(real)
        .convert(Kind::Decimal)
        .and_then(|v| v.convert(Kind::Real))
        .and_then(|v| v.as_real())
        .unwrap();
    assert!((decimal - real).abs() < 1e-6);
}

#[test]
fn test_entry_instruction_routes_to_host() {
    let mut b = ProgramBuilder::new();
    b.emit(InstructionRecord::new(Opcode::entry(0)));
    let mut h = TestHarness::new(b);
    // The fixture host has no forms machinery; the instruction raises a
    // recoverable unsupported error.
    assert_eq!(h.run(), ExitStatus::Completed);
    assert!(h.indicator(flag::ERROR));
    assert_eq!(h.register(reg::ERROR_CODE), 58);
}

#[test]
fn test_standalone_evaluation() {
    use tabula_runtime::evaluate_standalone;
    assert_eq!(
        evaluate_standalone("2+2", Kind::Int).unwrap(),
        TypedValue::Int(4)
    );
    assert_eq!(
        evaluate_standalone("10/4", Kind::Decimal).unwrap(),
        TypedValue::Decimal(Decimal::from_real(2.5))
    );
}

#[test]
fn test_sub_expression_call_adopts_result() {
    let mut b = ProgramBuilder::new();
    let mut inner = ExprChunk::new(Kind::Int);
    let twenty = inner.add_literal(TypedValue::Int(20));
    let one = inner.add_literal(TypedValue::Int(1));
    inner.push(ExprOp::Literal(twenty), Kind::Int);
    inner.push(ExprOp::Literal(one), Kind::Int);
    inner.push(ExprOp::Add, Kind::Int);
    inner.push(ExprOp::Output, Kind::Int);
    let inner_idx = b.expression(inner);

    let mut outer = ExprChunk::new(Kind::Int);
    let two = outer.add_literal(TypedValue::Int(2));
    outer.push(ExprOp::CallExpr(inner_idx), Kind::Int);
    outer.push(ExprOp::Literal(two), Kind::Int);
    outer.push(ExprOp::Mul, Kind::Int);
    outer.push(ExprOp::Output, Kind::Int);
    let outer_idx = b.expression(outer);

    let v0 = b.variable(TypedValue::Int(0));
    b.emit(
        InstructionRecord::new(Opcode::movement(MoveOp::MoveInt)).with_args(
            LocationDescriptor::expression(outer_idx, Kind::Int),
            LocationDescriptor::variable(v0, Kind::Int),
        ),
    );
    let mut h = TestHarness::new(b);
    assert_eq!(h.run(), ExitStatus::Completed);
    assert_eq!(h.variable(v0), TypedValue::Int(42));
}
