//! Structured builder for generated function bodies.
//!
//! Thin wrapper over the byte writers that tracks how many `if` frames
//! are open, so emitters can close exactly what they opened and the
//! balance invariant holds by construction.

use eoslink_wasm::encode::{write_sleb128, write_u8, write_uleb128};
use eoslink_wasm::types::op;

#[derive(Debug, Default)]
pub(crate) struct BodyWriter {
    buf: Vec<u8>,
    open_frames: u32,
}

impl BodyWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a body with `count` groups of local declarations already
    /// written by the caller; most bodies have none.
    pub fn locals_none(&mut self) {
        write_uleb128(&mut self.buf, 0);
    }

    pub fn raw_u8(&mut self, byte: u8) {
        write_u8(&mut self.buf, byte);
    }

    pub fn uleb(&mut self, value: u64) {
        write_uleb128(&mut self.buf, value);
    }

    pub fn sleb(&mut self, value: i64) {
        write_sleb128(&mut self.buf, value);
    }

    pub fn call(&mut self, func_index: u32) {
        self.raw_u8(op::CALL);
        self.uleb(func_index as u64);
    }

    pub fn local_get(&mut self, index: u32) {
        self.raw_u8(op::LOCAL_GET);
        self.uleb(index as u64);
    }

    pub fn local_set(&mut self, index: u32) {
        self.raw_u8(op::LOCAL_SET);
        self.uleb(index as u64);
    }

    pub fn global_get(&mut self, index: u32) {
        self.raw_u8(op::GLOBAL_GET);
        self.uleb(index as u64);
    }

    pub fn global_set(&mut self, index: u32) {
        self.raw_u8(op::GLOBAL_SET);
        self.uleb(index as u64);
    }

    pub fn i32_const(&mut self, value: i32) {
        self.raw_u8(op::I32_CONST);
        self.sleb(value as i64);
    }

    pub fn i64_const(&mut self, value: i64) {
        self.raw_u8(op::I64_CONST);
        self.sleb(value);
    }

    pub fn i64_eq(&mut self) {
        self.raw_u8(op::I64_EQ);
    }

    pub fn i64_ne(&mut self) {
        self.raw_u8(op::I64_NE);
    }

    pub fn i32_add(&mut self) {
        self.raw_u8(op::I32_ADD);
    }

    pub fn i32_load(&mut self, align_log2: u32, offset: u32) {
        self.raw_u8(op::I32_LOAD);
        self.uleb(align_log2 as u64);
        self.uleb(offset as u64);
    }

    pub fn i64_load(&mut self, align_log2: u32, offset: u32) {
        self.raw_u8(op::I64_LOAD);
        self.uleb(align_log2 as u64);
        self.uleb(offset as u64);
    }

    pub fn i32_store(&mut self, align_log2: u32, offset: u32) {
        self.raw_u8(op::I32_STORE);
        self.uleb(align_log2 as u64);
        self.uleb(offset as u64);
    }

    pub fn i64_store(&mut self, align_log2: u32, offset: u32) {
        self.raw_u8(op::I64_STORE);
        self.uleb(align_log2 as u64);
        self.uleb(offset as u64);
    }

    /// Open an `if` with no result type.
    pub fn if_none(&mut self) {
        self.raw_u8(op::IF);
        self.raw_u8(op::BLOCK_TYPE_NONE);
        self.open_frames += 1;
    }

    /// Switch the innermost open frame to its else arm.
    pub fn else_(&mut self) {
        debug_assert!(self.open_frames > 0, "else outside an if");
        self.raw_u8(op::ELSE);
    }

    /// Close the innermost open frame.
    pub fn end_frame(&mut self) {
        debug_assert!(self.open_frames > 0, "end without matching if");
        self.raw_u8(op::END);
        self.open_frames -= 1;
    }

    /// Close every frame still open.
    pub fn end_open_frames(&mut self) {
        self.end_frames_to(0);
    }

    /// Close frames until only `base` remain open.
    pub fn end_frames_to(&mut self, base: u32) {
        while self.open_frames > base {
            self.end_frame();
        }
    }

    pub fn ret(&mut self) {
        self.raw_u8(op::RETURN);
    }

    pub fn memory_init(&mut self, segment: u32) {
        self.raw_u8(op::MISC_PREFIX);
        self.uleb(op::MEMORY_INIT as u64);
        self.uleb(segment as u64);
        self.raw_u8(0); // memory index
    }

    pub fn data_drop(&mut self, segment: u32) {
        self.raw_u8(op::MISC_PREFIX);
        self.uleb(op::DATA_DROP as u64);
        self.uleb(segment as u64);
    }

    pub fn open_frames(&self) -> u32 {
        self.open_frames
    }

    /// Terminate the body and take the bytes. The function's own frame
    /// gets its closing `end` here.
    pub fn finish(mut self) -> Vec<u8> {
        debug_assert_eq!(self.open_frames, 0, "unbalanced frames at finish");
        self.raw_u8(op::END);
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_balance() {
        let mut body = BodyWriter::new();
        body.locals_none();
        body.if_none();
        body.if_none();
        assert_eq!(body.open_frames(), 2);
        body.else_();
        body.end_open_frames();
        assert_eq!(body.open_frames(), 0);
        let bytes = body.finish();
        assert_eq!(bytes.last(), Some(&0x0b));
        // number of if opcodes equals number of ends minus the body end
        let ifs = bytes.iter().filter(|&&b| b == 0x04).count();
        let ends = bytes.iter().filter(|&&b| b == 0x0b).count();
        assert_eq!(ifs, ends - 1);
    }

    #[test]
    fn const_encodings_are_signed() {
        let mut body = BodyWriter::new();
        body.i32_const(-1);
        body.i64_const(64);
        assert_eq!(body.buf, [0x41, 0x7f, 0x42, 0xc0, 0x00]);
    }
}
