use super::*;

fn read_all(buffer: &TranscriptBuffer<u32>) -> Vec<String> {
    buffer.iter().map(|id| buffer.read(id).to_string()).collect()
}

#[test]
fn append_links_segments_in_buffer_order() {
    let mut buffer = TranscriptBuffer::new();
    let a = buffer.append("one ", 1);
    let b = buffer.append("two ", 1);
    let c = buffer.append("three", 2);

    assert_eq!(buffer.text(), "one two three");
    assert_eq!(buffer.head(), Some(a));
    assert_eq!(buffer.tail(), Some(c));
    assert_eq!(buffer.next(a), Some(b));
    assert_eq!(buffer.prev(c), Some(b));
    assert_eq!(read_all(&buffer), ["one ", "two ", "three"]);
    buffer.check_chain().expect("chain");
}

#[test]
fn extend_grows_only_the_target_and_shifts_later_segments() {
    let mut buffer = TranscriptBuffer::new();
    let a = buffer.append("Hello", 1);
    let b = buffer.append(" world", 1);

    buffer.extend(a, ", dear").expect("extend");
    assert_eq!(buffer.text(), "Hello, dear world");
    assert_eq!(buffer.read(a), "Hello, dear");
    assert_eq!(buffer.read(b), " world");
    buffer.check_chain().expect("chain");

    // Extending the tail is plain appending.
    buffer.extend(b, "!").expect("extend tail");
    assert_eq!(buffer.read(b), " world!");
    assert_eq!(buffer.text(), "Hello, dear world!");
    buffer.check_chain().expect("chain");
}

#[test]
fn extend_with_empty_text_is_a_no_op() {
    let mut buffer = TranscriptBuffer::new();
    let a = buffer.append("text", 1);
    buffer.extend(a, "").expect("empty extend");
    assert_eq!(buffer.text(), "text");
    assert_eq!(buffer.read(a), "text");
}

#[test]
fn extend_grows_an_initially_empty_segment() {
    let mut buffer = TranscriptBuffer::new();
    let label = buffer.append("Assistant: ", 1);
    let body = buffer.append("", 1);
    let after = buffer.append("\n", 2);

    buffer.extend(body, "first").expect("extend");
    buffer.extend(body, " second").expect("extend");
    assert_eq!(buffer.read(body), "first second");
    assert_eq!(buffer.read(label), "Assistant: ");
    assert_eq!(buffer.read(after), "\n");
    assert_eq!(buffer.text(), "Assistant: first second\n");
    buffer.check_chain().expect("chain");
}

#[test]
fn locate_finds_containing_segment_and_falls_back_to_tail() {
    let mut buffer = TranscriptBuffer::new();
    assert_eq!(buffer.locate(0), None);

    let a = buffer.append("abc", 1);
    let b = buffer.append("def", 2);
    assert_eq!(buffer.locate(0), Some(a));
    assert_eq!(buffer.locate(2), Some(a));
    assert_eq!(buffer.locate(3), Some(b));
    assert_eq!(buffer.locate(5), Some(b));
    // Cursor at buffer end belongs to the tail segment.
    assert_eq!(buffer.locate(6), Some(b));
    assert_eq!(buffer.locate(99), Some(b));
}

#[test]
fn delete_shifts_later_segments_by_exactly_the_removed_span() {
    let mut buffer = TranscriptBuffer::new();
    let a = buffer.append("aaaa", 1);
    let b = buffer.append("bb", 2);
    let c = buffer.append("cccccc", 3);
    let (c_start_before, _) = buffer.bounds(c).expect("bounds");

    buffer.delete(b).expect("delete");
    assert_eq!(buffer.text(), "aaaacccccc");
    assert_eq!(buffer.bounds(a), Some((0, 4)));
    let (c_start_after, c_end_after) = buffer.bounds(c).expect("bounds");
    assert_eq!(c_start_before - c_start_after, 2);
    assert_eq!(c_end_after - c_start_after, 6);
    assert_eq!(buffer.read(c), "cccccc");
    assert_eq!(buffer.next(a), Some(c));
    assert_eq!(buffer.prev(c), Some(a));
    buffer.check_chain().expect("chain");
}

#[test]
fn delete_head_and_tail_update_chain_ends() {
    let mut buffer = TranscriptBuffer::new();
    let a = buffer.append("a", 1);
    let b = buffer.append("b", 2);
    let c = buffer.append("c", 3);

    buffer.delete(a).expect("delete head");
    assert_eq!(buffer.head(), Some(b));
    assert_eq!(buffer.prev(b), None);

    buffer.delete(c).expect("delete tail");
    assert_eq!(buffer.tail(), Some(b));
    assert_eq!(buffer.next(b), None);
    assert_eq!(buffer.text(), "b");
    buffer.check_chain().expect("chain");
}

#[test]
fn deleting_every_segment_empties_buffer_and_chain() {
    let mut buffer = TranscriptBuffer::new();
    let ids: Vec<_> = (0..5).map(|i| buffer.append("x", i)).collect();
    for id in ids {
        buffer.delete(id).expect("delete");
        buffer.check_chain().expect("chain");
    }
    assert!(buffer.is_empty());
    assert_eq!(buffer.text(), "");
    assert_eq!(buffer.head(), None);
    assert_eq!(buffer.tail(), None);
}

#[test]
fn slots_are_reused_after_delete() {
    let mut buffer = TranscriptBuffer::new();
    let a = buffer.append("gone", 1);
    buffer.delete(a).expect("delete");
    let b = buffer.append("new", 2);
    assert_eq!(buffer.read(b), "new");
    assert_eq!(buffer.owner(b), Some(2));
    // The freed slot was recycled, so the old id now addresses the new segment.
    assert_eq!(a, b);
    buffer.check_chain().expect("chain");
}

#[test]
fn stale_ids_error_instead_of_corrupting() {
    let mut buffer: TranscriptBuffer<u32> = TranscriptBuffer::new();
    let a = buffer.append("a", 1);
    buffer.delete(a).expect("delete");
    assert!(buffer.delete(a).is_err());
    assert!(buffer.extend(a, "x").is_err());
    assert_eq!(buffer.read(a), "");
}

#[test]
fn interleaved_operations_keep_reads_consistent() {
    let mut buffer = TranscriptBuffer::new();
    let mut live: Vec<(SegmentId, String)> = Vec::new();

    for round in 0..10u32 {
        let text = format!("seg{round};");
        let id = buffer.append(&text, round);
        live.push((id, text));
        if round % 3 == 0 {
            let (id, _) = live.remove(live.len() / 2);
            buffer.delete(id).expect("delete");
        }
        if round % 4 == 1 {
            let (id, text) = &mut live[0];
            buffer.extend(*id, "+").expect("extend");
            text.push('+');
        }
        buffer.check_chain().expect("chain");
        for (id, expected) in &live {
            assert_eq!(buffer.read(*id), expected);
        }
    }
}
