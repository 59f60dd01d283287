//! End-to-end lowering tests.
//!
//! Each test builds a MidIR module programmatically, lowers it, runs the
//! LLVM verifier, and asserts over the printed IR.

use inkwell::context::Context;

use crate::codegen::to_llvm;
use crate::midir::{
    BinOp, ConstExpr, Field, FuncBody, FuncBodyBuilder, FuncDecl, Global, Module, Mutability,
    NamedType, Operand, Rvalue, Statement, Terminator, Type, TypeIdx, VarId,
    VarTypes,
};

fn func_module(
    name: &str,
    params: Vec<VarId>,
    ret: Option<Type>,
    var_types: Vec<Type>,
    body: FuncBody,
) -> Module {
    Module {
        name: "test".into(),
        types: Vec::new(),
        globals: vec![Global::Func(FuncDecl {
            name: name.into(),
            params,
            ret,
            vars: VarTypes::new(VarId::new(0), var_types),
            body: Some(body),
        })],
        gc_headers: Vec::new(),
    }
}

fn lower_ok(midir: &Module) -> String {
    let context = Context::create();
    let module = to_llvm(&context, midir).expect("lowering failed");
    if let Err(e) = module.verify() {
        panic!(
            "verifier rejected module: {}\n{}",
            e.to_string(),
            module.print_to_string().to_string()
        );
    }
    module.print_to_string().to_string()
}

fn int_const(v: i128) -> Operand {
    Operand::Const(ConstExpr::Int(v, Type::i32()))
}

#[test]
fn test_identity_function() {
    let mut b = FuncBodyBuilder::new();
    b.terminate(Terminator::Return(Some(Operand::Var(VarId::new(0)))));

    let midir = func_module(
        "id",
        vec![VarId::new(0)],
        Some(Type::i32()),
        vec![Type::i32()],
        b.finish(),
    );
    let ir = lower_ok(&midir);
    assert!(ir.contains("define i32 @id(i32 %0)"), "{}", ir);
    assert!(ir.contains("br label %L0"), "{}", ir);
    assert!(ir.contains("ret i32 %0"), "{}", ir);
    assert!(!ir.contains("phi"), "{}", ir);
}

#[test]
fn test_straight_line_reassignment_needs_no_phi() {
    // L0: v1 = 7; jump L1    L1: return v1
    let mut b = FuncBodyBuilder::new();
    let next = b.new_node();
    b.push_stmt(Statement::Move(VarId::new(1), Rvalue::Use(int_const(7))));
    b.terminate(Terminator::Jump(next));
    b.switch_to(next);
    b.terminate(Terminator::Return(Some(Operand::Var(VarId::new(1)))));

    let midir = func_module(
        "seven",
        Vec::new(),
        Some(Type::i32()),
        vec![Type::i32(), Type::i32()],
        b.finish(),
    );
    let ir = lower_ok(&midir);
    assert!(!ir.contains("phi"), "{}", ir);
    assert!(ir.contains("ret i32 7"), "{}", ir);
}

#[test]
fn test_diamond_places_one_phi_at_join() {
    let mut b = FuncBodyBuilder::new();
    let then_node = b.new_node();
    let else_node = b.new_node();
    let join = b.new_node();

    b.terminate(Terminator::Branch {
        cond: Operand::Var(VarId::new(0)),
        then_node,
        else_node,
    });
    b.switch_to(then_node);
    b.push_stmt(Statement::Move(VarId::new(1), Rvalue::Use(int_const(1))));
    b.terminate(Terminator::Jump(join));
    b.switch_to(else_node);
    b.push_stmt(Statement::Move(VarId::new(1), Rvalue::Use(int_const(2))));
    b.terminate(Terminator::Jump(join));
    b.switch_to(join);
    b.terminate(Terminator::Return(Some(Operand::Var(VarId::new(1)))));

    let midir = func_module(
        "select",
        vec![VarId::new(0)],
        Some(Type::i32()),
        vec![Type::bool(), Type::i32()],
        b.finish(),
    );
    let ir = lower_ok(&midir);
    assert_eq!(ir.matches("phi").count(), 1, "{}", ir);
    assert!(ir.contains("phi i32"), "{}", ir);
    // One incoming per arm, labelled with the arm's block.
    assert!(ir.contains("[ 1, %L1 ]"), "{}", ir);
    assert!(ir.contains("[ 2, %L2 ]"), "{}", ir);
}

#[test]
fn test_loop_counter_gets_header_phi() {
    // L0: i = 0; jump L1
    // L1: c = i < 10; branch c L2 L3
    // L2: i = i + 1; jump L1
    // L3: return i
    let i = VarId::new(0);
    let c = VarId::new(1);
    let mut b = FuncBodyBuilder::new();
    let header = b.new_node();
    let body = b.new_node();
    let exit = b.new_node();

    b.push_stmt(Statement::Move(i, Rvalue::Use(int_const(0))));
    b.terminate(Terminator::Jump(header));
    b.switch_to(header);
    b.push_stmt(Statement::Move(
        c,
        Rvalue::Binary(BinOp::Lt, Operand::Var(i), int_const(10)),
    ));
    b.terminate(Terminator::Branch {
        cond: Operand::Var(c),
        then_node: body,
        else_node: exit,
    });
    b.switch_to(body);
    b.push_stmt(Statement::Move(
        i,
        Rvalue::Binary(BinOp::Add, Operand::Var(i), int_const(1)),
    ));
    b.terminate(Terminator::Jump(header));
    b.switch_to(exit);
    b.terminate(Terminator::Return(Some(Operand::Var(i))));

    let midir = func_module(
        "count",
        Vec::new(),
        Some(Type::i32()),
        vec![Type::i32(), Type::bool()],
        b.finish(),
    );
    let ir = lower_ok(&midir);
    // The counter merges the initial value from L0 with the increment from
    // the loop body.
    assert!(ir.contains("phi i32"), "{}", ir);
    assert!(ir.contains("[ 0, %L0 ]"), "{}", ir);
    assert!(ir.contains("%L2 ]"), "{}", ir);
    assert!(ir.contains("add"), "{}", ir);
}

#[test]
fn test_struct_parameter_expands_into_extracts() {
    // sum(p: {i32, i32}) -> i32 { a = p.0; b = p.1; return a + b }
    let pair = Type::struct_of(vec![
        Field::new("a", Mutability::Mutable, Type::i32()),
        Field::new("b", Mutability::Mutable, Type::i32()),
    ]);
    let p = VarId::new(0);
    let a = VarId::new(1);
    let b_var = VarId::new(2);
    let s = VarId::new(3);

    let mut b = FuncBodyBuilder::new();
    b.push_stmt(Statement::Move(a, Rvalue::Field(Operand::Var(p), 0)));
    b.push_stmt(Statement::Move(b_var, Rvalue::Field(Operand::Var(p), 1)));
    b.push_stmt(Statement::Move(
        s,
        Rvalue::Binary(BinOp::Add, Operand::Var(a), Operand::Var(b_var)),
    ));
    b.terminate(Terminator::Return(Some(Operand::Var(s))));

    let midir = func_module(
        "sum",
        vec![p],
        Some(Type::i32()),
        vec![pair, Type::i32(), Type::i32(), Type::i32()],
        b.finish(),
    );
    let ir = lower_ok(&midir);
    assert_eq!(ir.matches("extractvalue").count(), 2, "{}", ir);
    assert!(!ir.contains("phi"), "{}", ir);
    assert!(ir.contains("add"), "{}", ir);
}

#[test]
fn test_aggregate_return_is_recomposed() {
    // make(x: i32) -> {i32, i32} { p = {x, x}; return p }
    let pair = Type::struct_of(vec![
        Field::new("a", Mutability::Mutable, Type::i32()),
        Field::new("b", Mutability::Mutable, Type::i32()),
    ]);
    let x = VarId::new(0);
    let p = VarId::new(1);

    let mut b = FuncBodyBuilder::new();
    b.push_stmt(Statement::Move(
        p,
        Rvalue::Aggregate(pair.clone(), vec![Operand::Var(x), Operand::Var(x)]),
    ));
    b.terminate(Terminator::Return(Some(Operand::Var(p))));

    let midir = func_module(
        "make",
        vec![x],
        Some(pair.clone()),
        vec![Type::i32(), pair],
        b.finish(),
    );
    let ir = lower_ok(&midir);
    assert!(ir.contains("insertvalue"), "{}", ir);
    assert!(ir.contains("ret { i32, i32 }"), "{}", ir);
}

#[test]
fn test_mutually_recursive_named_types_lower() {
    let field = |name: &str, ty: Type| Field::new(name, Mutability::Mutable, ty);
    let a_ptr = Type::ptr_to(Type::Named(TypeIdx::new(0)));
    let b_ptr = Type::ptr_to(Type::Named(TypeIdx::new(1)));

    let mut b = FuncBodyBuilder::new();
    b.terminate(Terminator::Return(Some(Operand::Var(VarId::new(0)))));

    let mut midir = func_module(
        "id_a",
        vec![VarId::new(0)],
        Some(a_ptr.clone()),
        vec![a_ptr],
        b.finish(),
    );
    midir.types = vec![
        NamedType::new(
            "A",
            Some(Type::struct_of(vec![
                field("tag", Type::i32()),
                field("other", b_ptr),
            ])),
        ),
        NamedType::new(
            "B",
            Some(Type::struct_of(vec![
                field("tag", Type::i32()),
                field("other", Type::ptr_to(Type::Named(TypeIdx::new(0)))),
            ])),
        ),
    ];

    let ir = lower_ok(&midir);
    assert!(ir.contains("%A = type { i32, %B* }"), "{}", ir);
    assert!(ir.contains("%B = type { i32, %A* }"), "{}", ir);
    assert!(ir.contains("define %A* @id_a(%A* %0)"), "{}", ir);
}

#[test]
fn test_switch_lowering_with_shared_case_target() {
    // L0: switch v0 { 0 -> L1, 1 -> L1, default -> L2 }
    // L1: v1 = 1; jump L3    L2: v1 = 2; jump L3    L3: return v1
    let v0 = VarId::new(0);
    let v1 = VarId::new(1);
    let mut b = FuncBodyBuilder::new();
    let shared = b.new_node();
    let other = b.new_node();
    let join = b.new_node();

    b.terminate(Terminator::Switch {
        discr: Operand::Var(v0),
        cases: vec![(0, shared), (1, shared)],
        default: other,
    });
    b.switch_to(shared);
    b.push_stmt(Statement::Move(v1, Rvalue::Use(int_const(1))));
    b.terminate(Terminator::Jump(join));
    b.switch_to(other);
    b.push_stmt(Statement::Move(v1, Rvalue::Use(int_const(2))));
    b.terminate(Terminator::Jump(join));
    b.switch_to(join);
    b.terminate(Terminator::Return(Some(Operand::Var(v1))));

    let midir = func_module(
        "pick",
        vec![v0],
        Some(Type::i32()),
        vec![Type::i32(), Type::i32()],
        b.finish(),
    );
    let ir = lower_ok(&midir);
    assert!(ir.contains("switch i32"), "{}", ir);
    assert!(ir.contains("phi i32"), "{}", ir);
}

#[test]
fn test_use_before_assignment_sees_undef() {
    // v1 is returned without ever being assigned: the seeded binding is
    // undef of its declared type.
    let mut b = FuncBodyBuilder::new();
    b.terminate(Terminator::Return(Some(Operand::Var(VarId::new(1)))));

    let midir = func_module(
        "uninit",
        Vec::new(),
        Some(Type::i32()),
        vec![Type::i32(), Type::i32()],
        b.finish(),
    );
    let ir = lower_ok(&midir);
    assert!(ir.contains("ret i32 undef"), "{}", ir);
}

#[test]
fn test_call_between_functions() {
    // callee: double(x) = x + x;  caller: quad(x) = double(double(x))
    let x = VarId::new(0);
    let t = VarId::new(1);

    let mut callee = FuncBodyBuilder::new();
    callee.push_stmt(Statement::Move(
        t,
        Rvalue::Binary(BinOp::Add, Operand::Var(x), Operand::Var(x)),
    ));
    callee.terminate(Terminator::Return(Some(Operand::Var(t))));

    let mut caller = FuncBodyBuilder::new();
    caller.push_stmt(Statement::Move(
        t,
        Rvalue::Call(crate::midir::GlobalIdx::new(0), vec![Operand::Var(x)]),
    ));
    caller.push_stmt(Statement::Move(
        t,
        Rvalue::Call(crate::midir::GlobalIdx::new(0), vec![Operand::Var(t)]),
    ));
    caller.terminate(Terminator::Return(Some(Operand::Var(t))));

    let vars = || VarTypes::new(VarId::new(0), vec![Type::i32(), Type::i32()]);
    let midir = Module {
        name: "test".into(),
        types: Vec::new(),
        globals: vec![
            Global::Func(FuncDecl {
                name: "double".into(),
                params: vec![x],
                ret: Some(Type::i32()),
                vars: vars(),
                body: Some(callee.finish()),
            }),
            Global::Func(FuncDecl {
                name: "quad".into(),
                params: vec![x],
                ret: Some(Type::i32()),
                vars: vars(),
                body: Some(caller.finish()),
            }),
        ],
        gc_headers: Vec::new(),
    };
    let ir = lower_ok(&midir);
    assert_eq!(ir.matches("call i32 @double").count(), 2, "{}", ir);
}

#[test]
fn test_back_edge_into_entry_node() {
    // The entry node is itself a loop header: its φ merges the seeded value
    // arriving over the synthetic entry edge with the looped value.
    let v = VarId::new(0);
    let c = VarId::new(1);
    let mut b = FuncBodyBuilder::new();
    let entry = b.current_node();
    let exit = b.new_node();

    b.push_stmt(Statement::Move(
        v,
        Rvalue::Binary(BinOp::Add, Operand::Var(v), int_const(1)),
    ));
    b.push_stmt(Statement::Move(
        c,
        Rvalue::Binary(BinOp::Lt, Operand::Var(v), int_const(3)),
    ));
    b.terminate(Terminator::Branch {
        cond: Operand::Var(c),
        then_node: entry,
        else_node: exit,
    });
    b.switch_to(exit);
    b.terminate(Terminator::Return(Some(Operand::Var(v))));

    let midir = func_module(
        "spin",
        Vec::new(),
        Some(Type::i32()),
        vec![Type::i32(), Type::bool()],
        b.finish(),
    );
    let ir = lower_ok(&midir);
    // One incoming from the synthetic entry block, one from the node
    // itself.
    assert!(ir.contains("phi i32"), "{}", ir);
    assert!(ir.contains("%entry ]"), "{}", ir);
    assert!(ir.contains("%L0 ]"), "{}", ir);
}

#[test]
fn test_lowering_is_deterministic() {
    let mut b = FuncBodyBuilder::new();
    let then_node = b.new_node();
    let else_node = b.new_node();
    let join = b.new_node();
    b.terminate(Terminator::Branch {
        cond: Operand::Var(VarId::new(0)),
        then_node,
        else_node,
    });
    b.switch_to(then_node);
    b.push_stmt(Statement::Move(VarId::new(1), Rvalue::Use(int_const(1))));
    b.terminate(Terminator::Jump(join));
    b.switch_to(else_node);
    b.push_stmt(Statement::Move(VarId::new(1), Rvalue::Use(int_const(2))));
    b.terminate(Terminator::Jump(join));
    b.switch_to(join);
    b.terminate(Terminator::Return(Some(Operand::Var(VarId::new(1)))));

    let midir = func_module(
        "select",
        vec![VarId::new(0)],
        Some(Type::i32()),
        vec![Type::bool(), Type::i32()],
        b.finish(),
    );

    let first = lower_ok(&midir);
    let second = lower_ok(&midir);
    assert_eq!(first, second);
}

#[test]
fn test_validation_failure_aborts_lowering() {
    let mut b = FuncBodyBuilder::new();
    b.terminate(Terminator::Jump(crate::midir::NodeId::new(99)));

    let midir = func_module("broken", Vec::new(), None, Vec::new(), b.finish());
    let context = Context::create();
    let err = to_llvm(&context, &midir).unwrap_err();
    assert!(err.iter().any(|d| d.code.as_deref() == Some("E0602")));
}
