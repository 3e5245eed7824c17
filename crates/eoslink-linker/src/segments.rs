//! Output data segments.
//!
//! Live input segments merge into output segments under a naming policy;
//! while iterating object files we also collect their ABI blobs in link
//! order for the `.abi` companion output.

use eoslink_wasm::types::{align_up, linking};
use tracing::debug;

use crate::writer::Writer;

/// A named group of merged input segments.
#[derive(Clone, Debug)]
pub(crate) struct OutputSegment {
    pub name: String,
    /// Zero-based index in segment creation order.
    pub index: u32,
    /// Maximum log2 alignment of the contained chunks.
    pub alignment: u32,
    /// Total size including inter-chunk padding.
    pub size: u64,
    /// Assigned start virtual address.
    pub start_va: u64,
    /// `WASM_SEGMENT_IS_PASSIVE` when set.
    pub init_flags: u32,
    /// (file, segment) indices of the merged chunks, in insertion order.
    pub chunks: Vec<(usize, usize)>,
    /// Offset of this segment's data bytes within the output data
    /// section payload, recorded at serialization time.
    pub payload_offset: u64,
}

impl OutputSegment {
    fn new(name: &str, index: u32, passive: bool) -> Self {
        Self {
            name: name.to_string(),
            index,
            alignment: 0,
            size: 0,
            start_va: 0,
            init_flags: if passive { linking::SEGMENT_IS_PASSIVE } else { 0 },
            chunks: Vec::new(),
            payload_offset: 0,
        }
    }

    pub fn is_passive(&self) -> bool {
        self.init_flags & linking::SEGMENT_IS_PASSIVE != 0
    }
}

/// Apply the output naming policy to an input segment name.
pub(crate) fn output_segment_name(name: &str, is_pic: bool, merge_data_segments: bool) -> &str {
    // PIC supports a single data segment, since there is only one
    // __memory_base to address from.
    if is_pic {
        return ".data";
    }
    // Thread-local segments always coalesce so .tdata and .tbss share
    // offsets.
    if name.starts_with(".tdata") || name.starts_with(".tbss") {
        return ".tdata";
    }
    if !merge_data_segments {
        return name;
    }
    if name.starts_with(".text.") {
        return ".text";
    }
    if name.starts_with(".data.") {
        return ".data";
    }
    if name.starts_with(".bss.") {
        return ".bss";
    }
    if name.starts_with(".rodata.") {
        return ".rodata";
    }
    name
}

impl Writer<'_> {
    pub(crate) fn create_output_segments(&mut self) {
        let Writer {
            config,
            objects,
            segments,
            segment_map,
            abis,
            ..
        } = self;

        for (file_idx, file) in objects.iter_mut().enumerate() {
            if !file.eosio_abi.is_empty() {
                abis.push(file.eosio_abi.clone());
            }
            for (seg_idx, segment) in file.segments.iter_mut().enumerate() {
                if !segment.live {
                    continue;
                }
                let name =
                    output_segment_name(&segment.name, config.is_pic, config.merge_data_segments);
                let out_idx = match segment_map.get(name) {
                    Some(&idx) => idx,
                    None => {
                        debug!(segment = name, "new output segment");
                        let passive = config.passive_segments || name == ".tdata";
                        let idx = segments.len();
                        segments.push(OutputSegment::new(name, idx as u32, passive));
                        segment_map.insert(name.to_string(), idx);
                        idx
                    }
                };

                let out = &mut segments[out_idx];
                out.alignment = out.alignment.max(segment.alignment);
                out.size = align_up(out.size, 1 << segment.alignment);
                segment.output_segment = Some(out.index);
                segment.output_offset = out.size;
                out.size += segment.data.len() as u64;
                out.chunks.push((file_idx, seg_idx));
            }
        }
    }
}
