//! End-to-end scenario: reinterpreting the same 16 bytes under two
//! unrelated struct descriptors via `cast`.

use vmtype::testutil::VecVm;
use vmtype::{array, num, pin, ptr, str_, struct_, StrEncoding, Value};

#[test]
fn casting_reinterprets_shared_bytes() {
    let vm = VecVm::new(32);

    let data_array = struct_(
        "DataArray",
        vec![
            ("val1", num("B").unwrap()),
            ("val2", num("B").unwrap()),
            ("arrayptr", ptr("<I", array(num("B").unwrap(), Some(16))).unwrap()),
            ("array", array(num("B").unwrap(), Some(16))),
        ],
    )
    .unwrap();

    let data_str = struct_(
        "DataStr",
        vec![("valshort", num("<H").unwrap()), ("data", ptr("<I", str_(StrEncoding::Utf16Le)).unwrap())],
    )
    .unwrap();

    let as_array = pin(&data_array, &vm, 0);
    as_array.field("val1").unwrap().set(Value::U8(0x34)).unwrap();
    as_array.field("val2").unwrap().set(Value::U8(0x12)).unwrap();

    let as_str = as_array.cast(&data_str);
    assert_eq!(as_str.field("valshort").unwrap().get().unwrap(), Value::U16(0x1234));

    as_str.field("valshort").unwrap().set(Value::U16(0x1122)).unwrap();
    assert_eq!(as_array.field("val1").unwrap().get().unwrap(), Value::U8(0x22));
    assert_eq!(as_array.field("val2").unwrap().get().unwrap(), Value::U8(0x11));
}
