//! String codec scenarios: UTF-16LE encoding produces the exact documented
//! byte layout, and both codecs round-trip through `str_get`/`str_set`.

use vmtype::testutil::VecVm;
use vmtype::{pin, str_, StrEncoding, Vm};

#[test]
fn utf16le_encodes_with_double_nul_terminator() {
    let vm = VecVm::new(32);
    let ty = str_(StrEncoding::Utf16Le);
    let view = pin(&ty, &vm, 0);
    view.str_set("Miams").unwrap();
    assert_eq!(
        vm.read(0, 12).unwrap(),
        vec![0x4d, 0x00, 0x69, 0x00, 0x61, 0x00, 0x6d, 0x00, 0x73, 0x00, 0x00, 0x00]
    );
    assert_eq!(view.str_get(None).unwrap(), "Miams");
}

#[test]
fn ansi_round_trips_latin1() {
    let vm = VecVm::new(32);
    let ty = str_(StrEncoding::Ansi);
    let view = pin(&ty, &vm, 0);
    view.str_set("abc").unwrap();
    assert_eq!(vm.read(0, 4).unwrap(), vec![b'a', b'b', b'c', 0]);
    assert_eq!(view.str_get(None).unwrap(), "abc");
}

#[test]
fn str_get_honors_max_bytes_cap() {
    let vm = VecVm::new(8);
    // No terminator anywhere in the buffer.
    for i in 0..8 {
        vm.write(i, &[0x41]).unwrap();
    }
    let ty = str_(StrEncoding::Ansi);
    let view = pin(&ty, &vm, 0);
    assert!(view.str_get(Some(4)).is_err());
}
