use crate::analysis::{apply_shape, stack_shape, verify_method, StackShape};
use crate::instructions::{Condition, Instruction, StackOp};
use crate::method::{MethodAccessFlags, MethodRecord};
use crate::values::ValueKind;
use crate::builder::TableBuilder;
use crate::TranslateError;
use pretty_assertions::assert_eq;

fn build_static(
    descriptor: &str,
    body: impl FnOnce(&mut crate::builder::MethodBuilder<'_>),
) -> MethodRecord {
    let mut builder = TableBuilder::new();
    {
        let mut class = builder.class("app/V");
        let mut m = class.static_method("m", descriptor);
        body(&mut m);
        m.build().unwrap();
        class.build().unwrap();
    }
    let table = builder.finish();
    table.get("app/V").unwrap().methods[0].clone()
}

#[test]
fn test_frames_track_stack_shapes() {
    let method = build_static("(II)I", |m| {
        m.iload(0).iload(1).iadd().ireturn();
    });
    let frames = verify_method(&method).unwrap();

    assert_eq!(frames.before(0), Some(&[][..]));
    assert_eq!(frames.before(2), Some(&[ValueKind::Int, ValueKind::Int][..]));
    assert_eq!(frames.before(3), Some(&[ValueKind::Int][..]));
    assert_eq!(frames.max_depth(), 2);
}

#[test]
fn test_dup2_picks_form_by_category() {
    let wide = [ValueKind::Long];
    let narrow = [ValueKind::Int, ValueKind::Int];
    assert_eq!(
        stack_shape(StackOp::Dup2, &wide),
        Some(StackShape::Dup { count: 1, depth: 0 })
    );
    assert_eq!(
        stack_shape(StackOp::Dup2, &narrow),
        Some(StackShape::Dup { count: 2, depth: 0 })
    );
    assert_eq!(stack_shape(StackOp::Pop, &wide), None);

    let mut stack = vec![1, 2, 3];
    apply_shape(StackShape::Dup { count: 1, depth: 1 }, &mut stack);
    assert_eq!(stack, vec![1, 3, 2, 3]);
}

#[test]
fn test_unreachable_code_has_no_frame() {
    let method = build_static("()I", |m| {
        m.iconst(1).ireturn().iconst(2).ireturn();
    });
    let frames = verify_method(&method).unwrap();

    assert!(frames.is_reachable(1));
    assert!(!frames.is_reachable(2));
}

#[test]
fn test_inconsistent_join_is_rejected() {
    let method = build_static("(I)I", |m| {
        m.iload(0)
            .if_zero(Condition::Eq, "join")
            .iconst(1)
            .label("join")
            .iconst(2)
            .ireturn();
    });
    let err = verify_method(&method).unwrap_err();
    assert!(matches!(err, TranslateError::Verification { .. }));
}

#[test]
fn test_invalid_jump_target_is_rejected() {
    let method = build_static("()V", |m| {
        m.op(Instruction::Goto { target: 99 }).return_void();
    });
    let err = verify_method(&method).unwrap_err();
    assert!(err.to_string().contains("invalid jump target"));
}

#[test]
fn test_falling_off_the_end_is_rejected() {
    let method = build_static("()V", |m| {
        m.iconst(1).pop();
    });
    let err = verify_method(&method).unwrap_err();
    assert!(matches!(
        err,
        TranslateError::Verification { offset: 1, .. }
    ));
}

#[test]
fn test_wrong_operand_kind_is_rejected() {
    let method = build_static("()V", |m| {
        m.lconst(1).iconst(1).iadd().pop().return_void();
    });
    assert!(verify_method(&method).is_err());
}

#[test]
fn test_handler_entry_sees_exception_reference() {
    let method = build_static("()V", |m| {
        m.label("start")
            .iconst(1)
            .pop()
            .label("end")
            .return_void()
            .label("catch")
            .astore(0)
            .return_void()
            .handler("start", "end", "catch", None);
    });
    let frames = verify_method(&method).unwrap();
    assert_eq!(frames.before(3), Some(&[ValueKind::Ref][..]));
}
