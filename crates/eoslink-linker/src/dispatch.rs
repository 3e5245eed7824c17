//! Generated EOSIO dispatcher bodies.
//!
//! Two entry points are synthesized directly as wasm bytecode: the action
//! dispatcher (`apply`) and the sync-call dispatcher (`sync_call`). Both
//! pattern-match an incoming 64-bit name against the compile-time-known
//! handler set with chained `i64.eq`/`if` frames and route to the
//! handler's function index.

use std::collections::BTreeMap;

use indexmap::IndexSet;

use eoslink_wasm::name::{string_to_name, sync_call_id};

use crate::body::BodyWriter;
use crate::writer::Writer;
use crate::LinkError;

const EOSIO_COMPILER_ERROR_BASE: u64 = 8_000_000_000_000_000_000;
const EOSIO_ERROR_NO_ACTION: u64 = EOSIO_COMPILER_ERROR_BASE;
const EOSIO_ERROR_ONERROR: u64 = EOSIO_COMPILER_ERROR_BASE + 1;
const EOSIO_CANARY_FAILURE: u64 = EOSIO_COMPILER_ERROR_BASE + 2;

/// Status returned by the sync-call entry point when the call ran to
/// completion.
const SYNC_CALL_EXECUTED: i64 = 0;

// Error codes returned by the sync-call entry point; must be <= -10000.
const SYNC_CALL_UNSUPPORTED_HEADER_VERSION: i64 = -10000;
const SYNC_CALL_UNKNOWN_FUNCTION: i64 = -10001;

/// Split `name:handler` into its two halves.
fn split_entry(entry: &str) -> (&str, &str) {
    match entry.find(':') {
        Some(i) => (&entry[..i], &entry[i + 1..]),
        None => (entry, ""),
    }
}

/// Dispatch deduplication key: everything up to the handler symbol, so
/// the same name arriving from two files routes to the first handler
/// seen rather than producing a duplicate branch.
fn dedup_key(entry: &str) -> &str {
    match entry.rfind(':') {
        Some(i) => &entry[..i],
        None => entry,
    }
}

impl Writer<'_> {
    /// The action dispatcher, installed as `apply(receiver, code,
    /// action)`.
    pub(crate) fn create_dispatch_function(&mut self) -> Result<(), LinkError> {
        let contract_idx = self.function_index("eosio_set_contract_name")?;
        let assert_idx = self.opt_function_index("eosio_assert_code");
        let pre_idx = self.opt_function_index("pre_dispatch");
        let post_idx = self.opt_function_index("post_dispatch");

        let mut body = BodyWriter::new();
        body.locals_none();

        body.local_get(0); // receiver
        body.call(contract_idx);

        if let Some(ctors_idx) = self.opt_function_index("__wasm_call_ctors")
            && ctors_idx != 0
        {
            body.call(ctors_idx);
        }

        if self.config.stack_canary {
            self.emit_canary_setup(&mut body)?;
        }

        if let Some(pre) = pre_idx {
            body.local_get(0);
            body.local_get(1);
            body.local_get(2);
            body.call(pre);
            // proceed only when pre_dispatch returned non-zero
            body.if_none();
        }

        body.local_get(0);
        body.local_get(1);
        body.i64_eq();
        body.if_none(); // code == receiver

        self.emit_action_dispatch(&mut body, assert_idx, post_idx)?;

        body.else_();
        self.emit_notify_dispatch(&mut body, assert_idx, post_idx)?;
        body.end_frame(); // code == receiver

        if self.config.stack_canary {
            self.emit_canary_check(&mut body)?;
        }

        if let Some(dtors_idx) = self.opt_function_index("__cxa_finalize")
            && dtors_idx != 0
            && (dtors_idx as usize) < self.symtab.len()
        {
            body.i32_const(0); // null
            body.call(dtors_idx);
        }

        if pre_idx.is_some() {
            body.end_frame();
        }

        self.install_function("apply", body.finish())
    }

    /// One `if (action == name64) call handler` arm, chained with `else`
    /// onto the previous arm. Also used for per-group notify chains,
    /// whose entries carry the same `name:handler` shape.
    fn emit_handler_if(
        &self,
        body: &mut BodyWriter,
        entry: &str,
        need_else: &mut bool,
    ) -> Result<(), LinkError> {
        if *need_else {
            body.else_();
        }
        *need_else = true;

        let (name, handler) = split_entry(entry);
        body.i64_const(string_to_name(name) as i64);
        body.local_get(2); // action
        body.i64_eq();
        body.if_none();
        body.local_get(0); // receiver
        body.local_get(1); // code
        let index = self
            .opt_function_index(handler)
            .ok_or_else(|| LinkError::Internal("function not found".to_string()))?;
        body.call(index);
        Ok(())
    }

    /// Same-contract action routing: the unique-action chain, the
    /// `receiver != "eosio"` no-action assert, and the optional
    /// `post_dispatch` tail.
    fn emit_action_dispatch(
        &self,
        body: &mut BodyWriter,
        assert_idx: Option<u32>,
        post_idx: Option<u32>,
    ) -> Result<(), LinkError> {
        let base = body.open_frames();
        let mut dispatched: IndexSet<String> = IndexSet::new();
        let mut need_else = false;
        for file in self.objects.iter() {
            for action in &file.eosio_actions {
                if dispatched.insert(dedup_key(action).to_string()) {
                    self.emit_handler_if(body, action, &mut need_else)?;
                }
            }
        }

        if !dispatched.is_empty() {
            body.else_();
        }

        // do not fail when receiver is eosio itself
        body.local_get(0);
        body.i64_const(string_to_name("eosio") as i64);
        body.i64_ne();
        body.if_none();

        match assert_idx {
            Some(index) if (index as usize) < self.symtab.len() => {
                body.i32_const(0); // false
                body.i64_const(EOSIO_ERROR_NO_ACTION as i64);
                body.call(index);
            }
            _ => {
                return Err(LinkError::Internal(
                    "contract with no actions and trying to create dispatcher".to_string(),
                ));
            }
        }

        if let Some(post) = post_idx {
            body.else_();
            body.local_get(0);
            body.local_get(1);
            body.local_get(2);
            body.call(post);
        }
        body.end_frame(); // receiver != eosio
        body.end_frames_to(base); // the action chain
        Ok(())
    }

    /// Cross-contract notification routing: synthesized onerror assert,
    /// per-code groups, wildcard handlers, optional `post_dispatch`.
    fn emit_notify_dispatch(
        &self,
        body: &mut BodyWriter,
        assert_idx: Option<u32>,
        post_idx: Option<u32>,
    ) -> Result<(), LinkError> {
        let base = body.open_frames();

        let mut dispatched: IndexSet<String> = IndexSet::new();
        let mut notify_handlers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for file in self.objects.iter() {
            for notif in &file.eosio_notify {
                if dispatched.insert(dedup_key(notif).to_string()) {
                    // <code_name>::<action>:<handler>
                    let split = notif.find(':').unwrap_or(notif.len());
                    let code_name = &notif[..split];
                    let rest = notif.get(split + 2..).unwrap_or("");
                    notify_handlers
                        .entry(code_name.to_string())
                        .or_default()
                        .push(rest.to_string());
                }
            }
        }

        // A handler for eosio::onerror suppresses the synthesized assert;
        // only the literal "eosio" group is searched.
        let mut has_onerror_handler = false;
        if !dispatched.is_empty()
            && let Some(group) = notify_handlers.get("eosio")
        {
            for rest in group {
                if split_entry(rest).0 == "onerror" {
                    has_onerror_handler = true;
                }
            }
        }

        if !has_onerror_handler {
            let index = assert_idx
                .ok_or_else(|| LinkError::SymbolNotFound("eosio_assert_code".to_string()))?;
            body.i64_const(string_to_name("eosio") as i64);
            body.local_get(1); // code
            body.i64_eq();
            body.if_none();
            body.i64_const(string_to_name("onerror") as i64);
            body.local_get(2); // action
            body.i64_eq();
            body.if_none();
            body.i32_const(0); // false
            body.i64_const(EOSIO_ERROR_ONERROR as i64);
            body.call(index);
            body.end_frame();
            body.end_frame();
        }

        let mut notify0_need_else = false;
        let mut has_written = false;
        if !dispatched.is_empty() {
            for (code_name, group) in &notify_handlers {
                if code_name == "*" {
                    continue;
                }
                has_written = true;
                if notify0_need_else {
                    body.else_();
                }
                body.i64_const(string_to_name(code_name) as i64);
                body.local_get(1); // code
                body.i64_eq();
                body.if_none();

                let inner = body.open_frames();
                let mut need_else = false;
                for rest in group {
                    self.emit_handler_if(body, rest, &mut need_else)?;
                }
                body.end_frames_to(inner);
                notify0_need_else = true;
            }
            if has_written {
                body.else_();
            }
        }

        if let Some(wildcard) = notify_handlers.get("*") {
            let mut need_else = false;
            for rest in wildcard {
                self.emit_handler_if(body, rest, &mut need_else)?;
            }
        }

        if post_idx.is_some() && body.open_frames() > base {
            body.else_();
            body.local_get(0);
            body.local_get(1);
            body.local_get(2);
            body.call(post_idx.unwrap());
        }

        body.end_frames_to(base);
        Ok(())
    }

    /// The sync-call dispatcher, installed as `sync_call(sender,
    /// receiver, data_size) -> i64` with two scratch i32 locals for the
    /// payload and header pointers.
    pub(crate) fn create_call_dispatch_function(&mut self) -> Result<(), LinkError> {
        let contract_idx = self.function_index("eosio_set_contract_name")?;

        let mut body = BodyWriter::new();
        // one local group: 2 x i32 (locals 3 and 4, after the parameters)
        body.uleb(1);
        body.uleb(2);
        body.raw_u8(eoslink_wasm::types::ValType::I32 as u8);

        body.local_get(1); // receiver
        body.call(contract_idx);

        if let Some(ctors_idx) = self.opt_function_index("__wasm_call_ctors")
            && ctors_idx != 0
        {
            body.call(ctors_idx);
        }

        if self.config.stack_canary {
            self.emit_canary_setup(&mut body)?;
        }

        let base = body.open_frames();
        let mut dispatched: IndexSet<String> = IndexSet::new();
        let mut need_else = false;
        for file in self.objects.iter() {
            for call in &file.eosio_calls {
                if dispatched.insert(dedup_key(call).to_string()) {
                    self.emit_call_if(&mut body, call, &mut need_else)?;
                }
            }
        }
        if dispatched.is_empty() {
            return Err(LinkError::Internal(
                "call_cnt must be greater than 0".to_string(),
            ));
        }

        // no matching function name
        body.else_();
        body.i64_const(SYNC_CALL_UNKNOWN_FUNCTION);
        body.ret();
        body.end_frames_to(base);

        if self.config.stack_canary {
            self.emit_canary_check(&mut body)?;
        }

        if let Some(dtors_idx) = self.opt_function_index("__cxa_finalize")
            && dtors_idx != 0
            && (dtors_idx as usize) < self.symtab.len()
        {
            body.i32_const(0); // null
            body.call(dtors_idx);
        }

        body.i64_const(SYNC_CALL_EXECUTED);
        self.install_function("sync_call", body.finish())
    }

    /// One sync-call arm: fetch the payload and header, reject unknown
    /// header versions, then compare the called name's hash id and
    /// invoke the handler.
    fn emit_call_if(
        &self,
        body: &mut BodyWriter,
        entry: &str,
        need_else: &mut bool,
    ) -> Result<(), LinkError> {
        if *need_else {
            body.else_();
        }
        *need_else = true;

        let get_data_idx = self.function_index("__eos_get_sync_call_data_")?;
        body.local_get(2); // data_size
        body.call(get_data_idx);
        body.local_set(3); // data

        let get_header_idx = self.function_index("__eos_get_sync_call_data_header_")?;
        body.local_get(3);
        body.call(get_header_idx);
        body.local_set(4); // header

        // header version; anything non-zero is unsupported
        body.local_get(4);
        body.i32_load(2, 0);
        body.if_none();
        body.i64_const(SYNC_CALL_UNSUPPORTED_HEADER_VERSION);
        body.ret();
        body.end_frame();

        // called function name lives at header + 8
        body.local_get(4);
        body.i32_const(8);
        body.i32_add();
        body.i64_load(3, 0);

        let (call_name, handler) = split_entry(entry);
        body.i64_const(sync_call_id(call_name) as i64);
        body.i64_eq();
        body.if_none();
        body.local_get(0); // sender
        body.local_get(1); // receiver
        body.local_get(2); // data_size
        body.local_get(3); // data
        let index = self
            .opt_function_index(handler)
            .ok_or_else(|| LinkError::Internal("sync call function not found".to_string()))?;
        if (index as usize) >= self.symtab.len() {
            return Err(LinkError::Internal(
                "sync call function index out of bound".to_string(),
            ));
        }
        body.call(index);
        Ok(())
    }

    fn canary_address(&self) -> Result<u64, LinkError> {
        let id = self
            .symtab
            .find("__data_end")
            .ok_or_else(|| LinkError::SymbolNotFound("__data_end".to_string()))?;
        // the canary slot sits just past the end of static data
        Ok(self.symtab.get(id).virtual_address.unwrap_or(0) + 8)
    }

    /// Seed the canary: sample `current_time`, stash it in the
    /// `__stack_canary` global and mirror it to linear memory.
    fn emit_canary_setup(&self, body: &mut BodyWriter) -> Result<(), LinkError> {
        let canary_idx = self.global_index("__stack_canary")?;
        let time_idx = self
            .opt_function_index("current_time")
            .ok_or_else(|| LinkError::SymbolNotFound("current_time".to_string()))?;

        body.call(time_idx);
        body.global_set(canary_idx);

        body.i32_const(self.canary_address()? as i32);
        body.global_get(canary_idx);
        body.i64_store(3, 0);
        Ok(())
    }

    /// Compare the in-memory canary with the global; on mismatch abort
    /// through `eosio_assert_code`.
    fn emit_canary_check(&self, body: &mut BodyWriter) -> Result<(), LinkError> {
        let canary_idx = self.global_index("__stack_canary")?;
        let assert_idx = self.function_index("eosio_assert_code")?;

        body.global_get(canary_idx);
        body.i32_const(self.canary_address()? as i32);
        body.i64_load(3, 0);
        body.i64_ne();
        body.if_none();
        body.i32_const(0); // false
        body.i64_const(EOSIO_CANARY_FAILURE as i64);
        body.call(assert_idx);
        body.end_frame();
        Ok(())
    }
}
