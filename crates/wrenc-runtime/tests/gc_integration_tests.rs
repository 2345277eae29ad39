//! Integration tests for the tri-color mark-sweep collector (spec 4.L).

use wrenc_runtime::gc::{GarbageCollector, Traceable};
use wrenc_runtime::object::{ObjHeader, ObjKind};
use wrenc_runtime::value::Value;

struct NoContainers;
impl Traceable for NoContainers {
    fn trace(&self, _header: *mut ObjHeader) -> Vec<Value> {
        Vec::new()
    }
}

fn root_of(view: &wrenc_runtime::object::ManagedView) -> Value {
    unsafe { Value::from_ptr(view.as_header_ptr()) }.unwrap()
}

#[test]
fn unrooted_objects_are_reclaimed() {
    let mut gc = GarbageCollector::new();
    gc.allocate_managed(Value::NULL, 2).unwrap();
    gc.allocate_managed(Value::NULL, 2).unwrap();

    gc.collect(std::iter::empty(), &|_| 2, &NoContainers);

    assert_eq!(gc.stats().objects_freed, 2);
}

#[test]
fn chain_of_rooted_objects_all_survive() {
    let mut gc = GarbageCollector::new();

    let mut current = Value::NULL;
    let mut views = Vec::new();
    for _ in 0..50 {
        let view = gc.allocate_managed(Value::NULL, 1).unwrap();
        view.set_field(0, current);
        current = root_of(&view);
        views.push(view);
    }

    gc.collect([&current], &|_| 1, &NoContainers);

    assert_eq!(gc.stats().objects_freed, 0);
}

#[test]
fn circular_references_without_a_root_are_collected() {
    let mut gc = GarbageCollector::new();

    let a = gc.allocate_managed(Value::NULL, 1).unwrap();
    let b = gc.allocate_managed(Value::NULL, 1).unwrap();
    let a_val = root_of(&a);
    let b_val = root_of(&b);
    a.set_field(0, b_val);
    b.set_field(0, a_val);

    gc.collect(std::iter::empty(), &|_| 1, &NoContainers);

    assert_eq!(gc.stats().objects_freed, 2);
}

#[test]
fn list_kind_is_traced_through_the_container_callback() {
    struct OneElementList(Value);
    impl Traceable for OneElementList {
        fn trace(&self, _header: *mut ObjHeader) -> Vec<Value> {
            vec![self.0]
        }
    }

    let mut gc = GarbageCollector::new();
    let element = gc.allocate_managed(Value::NULL, 0).unwrap();
    let element_val = root_of(&element);

    let list_header = gc.allocate_leaf(Value::NULL, ObjKind::List).unwrap();
    let list_val = unsafe { Value::from_ptr(list_header) }.unwrap();

    gc.collect([&list_val], &|_| 0, &OneElementList(element_val));

    assert_eq!(gc.stats().objects_freed, 0);
}

#[test]
fn repeated_collections_accumulate_stats() {
    let mut gc = GarbageCollector::new();

    for _ in 0..3 {
        for _ in 0..5 {
            gc.allocate_managed(Value::NULL, 2).unwrap();
        }
        gc.collect(std::iter::empty(), &|_| 2, &NoContainers);
    }

    let stats = gc.stats();
    assert_eq!(stats.collections, 3);
    assert_eq!(stats.objects_freed, 15);
    assert!(stats.bytes_freed > 0);
}

#[test]
fn empty_collection_is_a_no_op() {
    let mut gc = GarbageCollector::new();
    gc.collect(std::iter::empty(), &|_| 0, &NoContainers);
    assert_eq!(gc.stats().objects_freed, 0);
}

#[test]
fn primitive_fields_survive_alongside_their_owner() {
    let mut gc = GarbageCollector::new();
    let view = gc.allocate_managed(Value::NULL, 3).unwrap();
    view.set_field(0, Value::number(42.0).unwrap());
    view.set_field(1, Value::number(3.14).unwrap());
    view.set_field(2, Value::NULL);
    let root = root_of(&view);

    gc.collect([&root], &|_| 3, &NoContainers);

    assert_eq!(view.get_field(0).unwrap().as_number(), Some(42.0));
    assert_eq!(view.get_field(1).unwrap().as_number(), Some(3.14));
    assert!(view.get_field(2).unwrap().is_null());
}
