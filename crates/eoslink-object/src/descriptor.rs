//! JSON descriptors for object files.
//!
//! The real toolchain hands the linker parsed wasm objects; tests and the
//! CLI describe the same inputs as JSON documents. Deserialization is
//! two-step: a raw serde model mirrors the on-disk shape, then converts
//! into [`ObjectFile`] and [`SymbolTable`] entries with validation.

use serde::Deserialize;

use eoslink_wasm::types::{EventType, GlobalType, InitExpr, RelocKind, Signature, ValType};

use crate::object::{
    FeaturePolicy, FeatureRequest, InitFuncEntry, InputCustomSection, InputEvent, InputFunction,
    InputGlobal, InputSegment, LinkingMetadata, ObjectFile, ProducerInfo, Reloc,
};
use crate::symbol::{
    ChunkRef, DataPlacement, Symbol, SymbolFlags, SymbolId, SymbolKind, SymbolTable,
};

/// Descriptor loading/validation error.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("invalid descriptor json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{file}: invalid hex in {context}")]
    BadHex { file: String, context: String },
    #[error("{file}: duplicate definition of symbol `{symbol}`")]
    DuplicateDefinition { file: String, symbol: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawValType {
    I32,
    I64,
    F32,
    F64,
    V128,
    Funcref,
}

impl From<RawValType> for ValType {
    fn from(raw: RawValType) -> Self {
        match raw {
            RawValType::I32 => ValType::I32,
            RawValType::I64 => ValType::I64,
            RawValType::F32 => ValType::F32,
            RawValType::F64 => ValType::F64,
            RawValType::V128 => ValType::V128,
            RawValType::Funcref => ValType::Funcref,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawRelocKind {
    FunctionIndexLeb,
    TableIndexSleb,
    TableIndexI32,
    MemoryAddrLeb,
    MemoryAddrSleb,
    MemoryAddrI32,
    TypeIndexLeb,
    GlobalIndexLeb,
    FunctionOffsetI32,
    SectionOffsetI32,
    EventIndexLeb,
}

impl From<RawRelocKind> for RelocKind {
    fn from(raw: RawRelocKind) -> Self {
        match raw {
            RawRelocKind::FunctionIndexLeb => RelocKind::FunctionIndexLeb,
            RawRelocKind::TableIndexSleb => RelocKind::TableIndexSleb,
            RawRelocKind::TableIndexI32 => RelocKind::TableIndexI32,
            RawRelocKind::MemoryAddrLeb => RelocKind::MemoryAddrLeb,
            RawRelocKind::MemoryAddrSleb => RelocKind::MemoryAddrSleb,
            RawRelocKind::MemoryAddrI32 => RelocKind::MemoryAddrI32,
            RawRelocKind::TypeIndexLeb => RelocKind::TypeIndexLeb,
            RawRelocKind::GlobalIndexLeb => RelocKind::GlobalIndexLeb,
            RawRelocKind::FunctionOffsetI32 => RelocKind::FunctionOffsetI32,
            RawRelocKind::SectionOffsetI32 => RelocKind::SectionOffsetI32,
            RawRelocKind::EventIndexLeb => RelocKind::EventIndexLeb,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawReloc {
    kind: RawRelocKind,
    offset: u32,
    index: u32,
    #[serde(default)]
    addend: i64,
}

impl From<RawReloc> for Reloc {
    fn from(raw: RawReloc) -> Self {
        Reloc {
            kind: raw.kind.into(),
            offset: raw.offset,
            index: raw.index,
            addend: raw.addend,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawFlags {
    #[serde(default)]
    local: bool,
    #[serde(default)]
    hidden: bool,
    #[serde(default)]
    weak: bool,
    #[serde(default)]
    dead: bool,
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    symbol: String,
    #[serde(default)]
    params: Vec<RawValType>,
    #[serde(default)]
    results: Vec<RawValType>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    relocs: Vec<RawReloc>,
    #[serde(flatten)]
    flags: RawFlags,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    name: String,
    #[serde(default)]
    align: u32,
    #[serde(default)]
    data: String,
    #[serde(default)]
    relocs: Vec<RawReloc>,
    #[serde(default)]
    dead: bool,
}

#[derive(Debug, Deserialize)]
struct RawGlobal {
    symbol: String,
    val_type: RawValType,
    #[serde(default)]
    mutable: bool,
    #[serde(default)]
    init: i64,
    #[serde(flatten)]
    flags: RawFlags,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    symbol: String,
    #[serde(default)]
    attribute: u32,
    #[serde(default)]
    params: Vec<RawValType>,
    #[serde(flatten)]
    flags: RawFlags,
}

#[derive(Debug, Deserialize)]
struct RawCustomSection {
    name: String,
    #[serde(default)]
    payload: String,
    #[serde(default)]
    relocs: Vec<RawReloc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawFeaturePolicy {
    Used,
    Required,
    Disallowed,
}

#[derive(Debug, Deserialize)]
struct RawFeature {
    policy: RawFeaturePolicy,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawInitFunc {
    symbol: String,
    #[serde(default)]
    priority: u32,
}

#[derive(Debug, Default, Deserialize)]
struct RawProducers {
    #[serde(default)]
    languages: Vec<(String, String)>,
    #[serde(default)]
    tools: Vec<(String, String)>,
    #[serde(default)]
    sdks: Vec<(String, String)>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEosio {
    #[serde(default)]
    actions: Vec<String>,
    #[serde(default)]
    notify: Vec<String>,
    #[serde(default)]
    calls: Vec<String>,
    #[serde(default)]
    abi: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawSymbolKind {
    Function,
    Data,
    Global,
    Event,
}

#[derive(Debug, Deserialize)]
struct RawUndefined {
    symbol: String,
    kind: RawSymbolKind,
    #[serde(default)]
    params: Vec<RawValType>,
    #[serde(default)]
    results: Vec<RawValType>,
    #[serde(default)]
    weak: bool,
}

#[derive(Debug, Deserialize)]
struct RawDataSymbol {
    symbol: String,
    segment: u32,
    #[serde(default)]
    offset: u64,
    #[serde(default)]
    size: u64,
    #[serde(flatten)]
    flags: RawFlags,
}

/// The on-disk shape of one object file.
#[derive(Debug, Deserialize)]
pub struct ObjectDescriptor {
    name: String,
    #[serde(default)]
    functions: Vec<RawFunction>,
    #[serde(default)]
    segments: Vec<RawSegment>,
    #[serde(default)]
    globals: Vec<RawGlobal>,
    #[serde(default)]
    events: Vec<RawEvent>,
    #[serde(default)]
    custom_sections: Vec<RawCustomSection>,
    #[serde(default)]
    features: Vec<RawFeature>,
    #[serde(default)]
    init_functions: Vec<RawInitFunc>,
    #[serde(default)]
    producers: RawProducers,
    #[serde(default)]
    eosio: RawEosio,
    #[serde(default)]
    undefined: Vec<RawUndefined>,
    #[serde(default)]
    data_symbols: Vec<RawDataSymbol>,
}

impl ObjectDescriptor {
    pub fn from_json(json: &str) -> Result<Self, DescriptorError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Convert into an [`ObjectFile`], defining this file's symbols in
    /// `table`. `file_index` is the position the object will occupy in
    /// the link order. The first definition of a name wins; a second
    /// non-weak definition is an error.
    pub fn into_object(
        self,
        file_index: u32,
        table: &mut SymbolTable,
    ) -> Result<ObjectFile, DescriptorError> {
        let mut obj = ObjectFile::new(self.name.clone());

        for (i, raw) in self.functions.into_iter().enumerate() {
            let signature = Signature::new(
                raw.params.into_iter().map(Into::into).collect(),
                raw.results.into_iter().map(Into::into).collect(),
            );
            let body = parse_hex(&raw.body, &self.name, &raw.symbol)?;
            let live = !raw.flags.dead;
            let id = define(
                table,
                &self.name,
                &raw.symbol,
                SymbolKind::Function,
                &raw.flags,
                live,
                |sym| {
                    sym.signature = Some(signature.clone());
                    sym.chunk = Some(ChunkRef {
                        file: file_index,
                        index: i as u32,
                    });
                },
            )?;
            obj.symbols.push(id);
            let type_index = register_type(&mut obj, &signature);
            obj.functions.push(InputFunction {
                symbol_name: raw.symbol,
                signature,
                body,
                relocs: raw.relocs.into_iter().map(Into::into).collect(),
                live,
                type_index,
                output_offset: 0,
            });
        }

        for raw in self.segments {
            let data = parse_hex(&raw.data, &self.name, &raw.name)?;
            obj.segments.push(InputSegment {
                name: raw.name,
                alignment: raw.align,
                data,
                relocs: raw.relocs.into_iter().map(Into::into).collect(),
                live: !raw.dead,
                output_segment: None,
                output_offset: 0,
            });
        }

        for (i, raw) in self.globals.into_iter().enumerate() {
            let val_type: ValType = raw.val_type.into();
            let ty = GlobalType {
                val_type,
                mutable: raw.mutable,
            };
            let init = match val_type {
                ValType::I64 => InitExpr::I64Const(raw.init),
                _ => InitExpr::I32Const(raw.init as i32),
            };
            let live = !raw.flags.dead;
            let id = define(
                table,
                &self.name,
                &raw.symbol,
                SymbolKind::Global,
                &raw.flags,
                live,
                |sym| {
                    sym.global_ty = Some(ty);
                    sym.chunk = Some(ChunkRef {
                        file: file_index,
                        index: i as u32,
                    });
                },
            )?;
            obj.symbols.push(id);
            obj.globals.push(InputGlobal {
                symbol_name: raw.symbol,
                ty,
                init,
                live,
            });
        }

        for (i, raw) in self.events.into_iter().enumerate() {
            let signature = Signature::new(raw.params.into_iter().map(Into::into).collect(), vec![]);
            let ty = EventType {
                attribute: raw.attribute,
                signature: signature.clone(),
            };
            let live = !raw.flags.dead;
            let id = define(
                table,
                &self.name,
                &raw.symbol,
                SymbolKind::Event,
                &raw.flags,
                live,
                |sym| {
                    sym.signature = Some(signature.clone());
                    sym.chunk = Some(ChunkRef {
                        file: file_index,
                        index: i as u32,
                    });
                },
            )?;
            obj.symbols.push(id);
            let type_index = register_type(&mut obj, &signature);
            obj.events.push(InputEvent {
                symbol_name: raw.symbol,
                ty,
                live,
                type_index,
            });
        }

        for raw in self.custom_sections {
            let payload = parse_hex(&raw.payload, &self.name, &raw.name)?;
            obj.custom_sections.push(InputCustomSection {
                name: raw.name,
                payload,
                relocs: raw.relocs.into_iter().map(Into::into).collect(),
                output_offset: 0,
            });
        }

        for raw in self.data_symbols {
            let live = !raw.flags.dead;
            let id = define(
                table,
                &self.name,
                &raw.symbol,
                SymbolKind::Data,
                &raw.flags,
                live,
                |sym| {
                    sym.chunk = Some(ChunkRef {
                        file: file_index,
                        index: raw.segment,
                    });
                    sym.placement = Some(DataPlacement {
                        segment: raw.segment,
                        offset: raw.offset,
                        size: raw.size,
                    });
                },
            )?;
            obj.symbols.push(id);
        }

        for raw in self.undefined {
            let kind = match raw.kind {
                RawSymbolKind::Function => SymbolKind::Function,
                RawSymbolKind::Data => SymbolKind::Data,
                RawSymbolKind::Global => SymbolKind::Global,
                RawSymbolKind::Event => SymbolKind::Event,
            };
            if let Some(id) = table.find(&raw.symbol) {
                // Already defined or referenced elsewhere.
                obj.symbols.push(id);
                continue;
            }
            let mut sym = Symbol::new(
                &raw.symbol,
                kind,
                SymbolFlags {
                    live: true,
                    weak: raw.weak,
                    used_in_regular_obj: true,
                    ..SymbolFlags::default()
                },
            );
            if kind == SymbolKind::Function || kind == SymbolKind::Event {
                sym.signature = Some(Signature::new(
                    raw.params.into_iter().map(Into::into).collect(),
                    raw.results.into_iter().map(Into::into).collect(),
                ));
            }
            obj.symbols.push(table.insert(sym));
        }

        obj.features = self
            .features
            .into_iter()
            .map(|f| FeatureRequest {
                policy: match f.policy {
                    RawFeaturePolicy::Used => FeaturePolicy::Used,
                    RawFeaturePolicy::Required => FeaturePolicy::Required,
                    RawFeaturePolicy::Disallowed => FeaturePolicy::Disallowed,
                },
                name: f.name,
            })
            .collect();

        obj.linking = LinkingMetadata {
            version: eoslink_wasm::types::linking::VERSION,
            init_functions: self
                .init_functions
                .into_iter()
                .map(|f| InitFuncEntry {
                    symbol_name: f.symbol,
                    priority: f.priority,
                })
                .collect(),
        };

        obj.producers = ProducerInfo {
            languages: self.producers.languages,
            tools: self.producers.tools,
            sdks: self.producers.sdks,
        };

        obj.eosio_actions = self.eosio.actions;
        obj.eosio_notify = self.eosio.notify;
        obj.eosio_calls = self.eosio.calls;
        obj.eosio_abi = self.eosio.abi;

        Ok(obj)
    }
}

/// Intern `signature` in the file-local type table.
fn register_type(obj: &mut ObjectFile, signature: &Signature) -> u32 {
    if let Some(i) = obj.types.iter().position(|s| s == signature) {
        return i as u32;
    }
    obj.types.push(signature.clone());
    obj.type_is_used.push(false);
    obj.type_map.push(0);
    (obj.types.len() - 1) as u32
}

fn define(
    table: &mut SymbolTable,
    file: &str,
    name: &str,
    kind: SymbolKind,
    raw: &RawFlags,
    live: bool,
    fill: impl FnOnce(&mut Symbol),
) -> Result<SymbolId, DescriptorError> {
    if let Some(existing) = table.find(name) {
        let prior = table.get(existing);
        if prior.flags.defined && !prior.flags.weak && !raw.weak {
            return Err(DescriptorError::DuplicateDefinition {
                file: file.to_string(),
                symbol: name.to_string(),
            });
        }
        if prior.flags.defined {
            return Ok(existing); // first definition wins over weak followers
        }
    }
    let mut sym = Symbol::new(
        name,
        kind,
        SymbolFlags {
            defined: true,
            live,
            local: raw.local,
            hidden: raw.hidden,
            weak: raw.weak,
            used_in_regular_obj: true,
            ..SymbolFlags::default()
        },
    );
    fill(&mut sym);
    Ok(table.insert(sym))
}

fn parse_hex(text: &str, file: &str, context: &str) -> Result<Vec<u8>, DescriptorError> {
    let text: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if text.len() % 2 != 0 {
        return Err(DescriptorError::BadHex {
            file: file.to_string(),
            context: context.to_string(),
        });
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16).map_err(|_| DescriptorError::BadHex {
                file: file.to_string(),
                context: context.to_string(),
            })
        })
        .collect()
}
