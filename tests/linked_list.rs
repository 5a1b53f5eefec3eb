//! End-to-end scenario: push/pop over a singly linked list whose nodes and
//! list header are allocated through the process-wide allocator hook.

use vmtype::testutil::{BumpAllocator, VecVm};
use vmtype::{num, ptr, self_marker, set_allocator, struct_, void, Value};

fn install_allocator() -> &'static BumpAllocator {
    use once_cell::sync::OnceCell;
    static ALLOCATOR: OnceCell<BumpAllocator> = OnceCell::new();
    let allocator = ALLOCATOR.get_or_init(|| BumpAllocator::new(0x100));
    set_allocator(|vm, size| allocator.alloc(vm, size));
    allocator
}

#[test]
fn push_and_pop_three_nodes() {
    install_allocator();
    let vm = VecVm::new(4096);

    let list_node = struct_(
        "ListNode",
        vec![("next", ptr("<I", self_marker()).unwrap()), ("data", ptr("<I", void()).unwrap())],
    )
    .unwrap();

    let linked_list = struct_(
        "LinkedList",
        vec![
            ("head", ptr("<I", list_node.clone()).unwrap()),
            ("tail", ptr("<I", list_node.clone()).unwrap()),
            ("size", num("<I").unwrap()),
        ],
    )
    .unwrap();

    let list_size = linked_list.size().unwrap();
    let list_addr = vmtype::alloc::alloc_in(&vm, list_size).unwrap();
    let list = vmtype::pin(&linked_list, &vm, list_addr);
    list.memset(0).unwrap();

    let node_size = list_node.size().unwrap();
    for _ in 0..3 {
        let node_addr = vmtype::alloc::alloc_in(&vm, node_size).unwrap();
        let node = vmtype::pin(&list_node, &vm, node_addr);
        node.memset(0).unwrap();

        let count = list.field("size").unwrap().get().unwrap().as_addr();
        if count == 0 {
            list.field("head").unwrap().set(Value::U32(node_addr as u32)).unwrap();
        } else {
            let tail_addr = list.field("tail").unwrap().get().unwrap().as_addr();
            vmtype::pin(&list_node, &vm, tail_addr)
                .field("next")
                .unwrap()
                .set(Value::U32(node_addr as u32))
                .unwrap();
        }
        list.field("tail").unwrap().set(Value::U32(node_addr as u32)).unwrap();
        list.field("size").unwrap().set(Value::U32((count + 1) as u32)).unwrap();
    }

    assert_eq!(list.field("size").unwrap().get().unwrap(), Value::U32(3));
    let size_field = list.field("size").unwrap();
    assert_eq!(size_field.raw().unwrap(), vec![0x03, 0x00, 0x00, 0x00]);

    // Pop the head.
    let head_addr = list.field("head").unwrap().get().unwrap().as_addr();
    let head = vmtype::pin(&list_node, &vm, head_addr);
    let next_addr = head.field("next").unwrap().get().unwrap().as_addr();
    list.field("head").unwrap().set(Value::U32(next_addr as u32)).unwrap();
    let count = list.field("size").unwrap().get().unwrap().as_addr();
    list.field("size").unwrap().set(Value::U32((count - 1) as u32)).unwrap();

    assert_eq!(list.field("size").unwrap().get().unwrap(), Value::U32(2));
}
