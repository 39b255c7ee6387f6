use crate::heap::{Heap, TypeDescriptor};
use crate::runtime::Runtime;
use crate::unwind::{Fault, Unwind};
use crate::value::Value;
use classport_core::{JavaType, RuntimeConfig, ValueKind};
use pretty_assertions::assert_eq;

#[test]
fn test_array_element_sizes() {
    let mut heap = Heap::new();
    let cases = [
        (JavaType::Boolean, 1),
        (JavaType::Byte, 1),
        (JavaType::Char, 2),
        (JavaType::Short, 2),
        (JavaType::Int, 4),
        (JavaType::Float, 4),
        (JavaType::Long, 8),
        (JavaType::Double, 8),
    ];
    for (element, size) in cases {
        let obj = heap.alloc_array(&element, 3).unwrap();
        let array = heap.array(obj).unwrap();
        assert_eq!(array.elem_size, size, "{:?}", element);
        assert_eq!(array.length, 3);
        assert_eq!(array.element_type(), &element);
    }
}

#[test]
fn test_narrow_elements_truncate_and_extend() {
    let mut heap = Heap::new();
    let bytes = heap.alloc_array(&JavaType::Byte, 1).unwrap();
    let chars = heap.alloc_array(&JavaType::Char, 1).unwrap();

    heap.array_mut(bytes).unwrap().store(0, Value::Int(200)).unwrap();
    heap.array_mut(chars).unwrap().store(0, Value::Int(-1)).unwrap();

    assert_eq!(heap.array(bytes).unwrap().load(0).unwrap(), Value::Int(-56));
    assert_eq!(heap.array(chars).unwrap().load(0).unwrap(), Value::Int(0xFFFF));
}

#[test]
fn test_index_outside_array_faults() {
    let mut heap = Heap::new();
    let obj = heap.alloc_array(&JavaType::Long, 2).unwrap();
    let err = heap.array(obj).unwrap().load(2).unwrap_err();
    assert!(matches!(
        err,
        Unwind::Fault(Fault::ArrayIndexOutOfBounds { index: 2, length: 2 })
    ));
    assert!(heap.array(obj).unwrap().load(-1).is_err());
}

#[test]
fn test_two_dimensional_allocation_is_eager() {
    let mut heap = Heap::new();
    let ty = JavaType::parse("[[I").unwrap();
    let grid = heap.alloc_2d(&ty, 3, 4).unwrap();
    assert_eq!(heap.live(), 4);

    heap.store_2d(grid, 2, 3, Value::Int(9)).unwrap();
    assert_eq!(heap.load_2d(grid, 2, 3).unwrap(), Value::Int(9));
    assert_eq!(heap.load_2d(grid, 0, 0).unwrap(), Value::Int(0));
    assert!(heap.load_2d(grid, 3, 0).is_err());
}

#[test]
fn test_negative_dimension_faults() {
    let mut heap = Heap::new();
    let ty = JavaType::parse("[[[J").unwrap();
    let err = heap.alloc_multi(&ty, &[2, -3]).unwrap_err();
    assert!(matches!(err, Unwind::Fault(Fault::NegativeArraySize(-3))));
    assert_eq!(heap.live(), 0);
}

#[test]
fn test_collect_frees_unreachable_objects() {
    let mut heap = Heap::new();
    let node = TypeDescriptor::new("app/Node", vec![ValueKind::Ref, ValueKind::Int]);
    let root = heap.allocate(&node);
    let child = heap.allocate(&node);
    let orphan = heap.allocate(&node);
    heap.set_field(root, 0, Value::object(child)).unwrap();

    let freed = heap.collect([root]);

    assert_eq!(freed, vec![orphan]);
    assert!(heap.contains(child));
    assert!(!heap.contains(orphan));
    assert_eq!(heap.live(), 2);
}

#[test]
fn test_freed_slots_are_reused() {
    let mut heap = Heap::new();
    let first = heap.alloc_string("a");
    heap.collect(std::iter::empty());
    let second = heap.alloc_string("b");
    assert_eq!(first, second);
    assert_eq!(heap.allocated(), 2);
}

#[test]
fn test_pending_allocation_survives_collection() {
    let runtime = Runtime::new(RuntimeConfig::default());
    let ctx = runtime.current_thread();
    let pending = runtime.heap().alloc_string("pending");
    let garbage = runtime.heap().alloc_string("garbage");
    ctx.state().track_pending(pending).unwrap();

    assert_eq!(runtime.collect(), 1);
    assert!(runtime.is_live(pending));
    assert!(!runtime.is_live(garbage));

    ctx.state().release_pending();
    runtime.collect();
    assert!(!runtime.is_live(pending));
    assert_eq!(runtime.stats().collections, 2);
}

#[test]
fn test_pending_window_is_bounded() {
    let config = RuntimeConfig {
        pending_allocations: 2,
        ..RuntimeConfig::default()
    };
    let runtime = Runtime::new(config);
    let ctx = runtime.current_thread();
    let mut state = ctx.state();
    for text in ["a", "b"] {
        let obj = runtime.heap().alloc_string(text);
        state.track_pending(obj).unwrap();
    }
    let extra = runtime.heap().alloc_string("c");
    assert!(state.track_pending(extra).is_err());
}

#[test]
fn test_interned_strings_are_shared_and_rooted() {
    let runtime = Runtime::new(RuntimeConfig::default());
    let a = runtime.intern("hello");
    let b = runtime.intern("hello");
    assert_eq!(a, b);
    runtime.collect();
    assert_eq!(runtime.heap().string(a).unwrap(), "hello");
}
