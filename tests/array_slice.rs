//! End-to-end scenario: slice assignment over a sized `Array`, and the
//! bitfield packing example from the spec's truncation scenario.

use vmtype::testutil::VecVm;
use vmtype::{array, bitfield, num, pin, Value};

#[test]
fn slice_assignment_writes_exactly_the_requested_range() {
    let vm = VecVm::new(16);
    let ty = array(num("B").unwrap(), Some(8));
    let view = pin(&ty, &vm, 0);
    view.memset(0).unwrap();
    view.set_slice(2, 6, &[Value::U8(1), Value::U8(2), Value::U8(3), Value::U8(4)]).unwrap();
    assert_eq!(view.raw().unwrap(), vec![0, 0, 1, 2, 3, 4, 0, 0]);
}

#[test]
fn length_mismatched_slice_assignment_fails() {
    let vm = VecVm::new(16);
    let ty = array(num("B").unwrap(), Some(8));
    let view = pin(&ty, &vm, 0);
    view.memset(0).unwrap();
    assert!(view.set_slice(2, 6, &[Value::U8(1), Value::U8(2)]).is_err());
}

#[test]
fn bitfield_truncates_on_overflowing_write() {
    let vm = VecVm::new(16);
    let bf = bitfield(num("B").unwrap(), vec![("f1", 2), ("f2", 4), ("f3", 1)]).unwrap();
    let view = pin(&bf, &vm, 0);
    view.memset(0).unwrap();
    view.field("f2").unwrap().set_bits(2).unwrap();
    view.field("f1").unwrap().set_bits(5).unwrap();

    assert_eq!(view.field("f1").unwrap().get_bits().unwrap(), 1);
    assert_eq!(view.field("f2").unwrap().get_bits().unwrap(), 2);
    assert_eq!(view.field("f3").unwrap().get_bits().unwrap(), 0);
    assert_eq!(view.raw().unwrap(), vec![0b0000_1001]);
}
