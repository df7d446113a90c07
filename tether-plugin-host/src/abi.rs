//! Guest ABI for consumer modules.
//!
//! A consumer module exports `memory`, an `alloc` bump allocator and the
//! contract functions listed in [`CONTRACT`]. Strings and blobs cross the
//! boundary as a packed `ptr << 32 | len` i64. The host side of the ABI lives
//! in the `tether` import module; its functions only do real work while a
//! consumer call is in flight, so a module being inspected can link against
//! them but cannot reach the data store or the network.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::DateTime;
use tether_consumer::ServiceContext;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use wasmtime::{
    Caller, Engine, Extern, ExternType, FuncType, Instance, Linker, Memory, Module, Store,
    StoreLimits, UpdateDeadline, ValType,
};

use crate::error::PluginHostError;
use crate::limits::ResourceLimits;

pub(crate) const IMPORT_MODULE: &str = "tether";
pub(crate) const WASM_MAGIC: &[u8] = b"\0asm";

/// Return value of `http_get` when the provider rejected the credential.
pub const HTTP_FORBIDDEN: i64 = -403;
/// Generic failure return value of host imports.
pub const HOST_ERROR: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prim {
    I32,
    I64,
}

struct ExportSig {
    name: &'static str,
    params: &'static [Prim],
    results: &'static [Prim],
    required: bool,
}

const CONTRACT: &[ExportSig] = &[
    ExportSig {
        name: "alloc",
        params: &[Prim::I32],
        results: &[Prim::I32],
        required: true,
    },
    ExportSig {
        name: "consumer_manifest",
        params: &[],
        results: &[Prim::I64],
        required: true,
    },
    ExportSig {
        name: "validate_authorization",
        params: &[Prim::I32],
        results: &[Prim::I32],
        required: true,
    },
    ExportSig {
        name: "sync",
        params: &[Prim::I32, Prim::I32],
        results: &[Prim::I32],
        required: true,
    },
    ExportSig {
        name: "service_image",
        params: &[Prim::I32, Prim::I32, Prim::I32],
        results: &[Prim::I64],
        required: false,
    },
];

/// Optional capabilities found while checking the contract.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ContractInfo {
    pub has_service_image: bool,
}

/// Checks that `module` structurally satisfies the consumer contract.
pub(crate) fn check_contract(module: &Module) -> Result<ContractInfo, String> {
    match module.get_export("memory") {
        Some(ExternType::Memory(_)) => {}
        _ => return Err("missing export `memory`".to_string()),
    }

    let mut info = ContractInfo::default();
    for export in CONTRACT {
        match module.get_export(export.name) {
            Some(ExternType::Func(ty)) if signature_matches(&ty, export) => {
                if export.name == "service_image" {
                    info.has_service_image = true;
                }
            }
            Some(_) => return Err(format!("export `{}` has the wrong signature", export.name)),
            None if export.required => return Err(format!("missing export `{}`", export.name)),
            None => {}
        }
    }
    Ok(info)
}

fn prim(ty: &ValType) -> Option<Prim> {
    match ty {
        ValType::I32 => Some(Prim::I32),
        ValType::I64 => Some(Prim::I64),
        _ => None,
    }
}

fn signature_matches(ty: &FuncType, export: &ExportSig) -> bool {
    let params: Vec<Option<Prim>> = ty.params().map(|p| prim(&p)).collect();
    let results: Vec<Option<Prim>> = ty.results().map(|r| prim(&r)).collect();
    params.iter().copied().eq(export.params.iter().map(|p| Some(*p)))
        && results.iter().copied().eq(export.results.iter().map(|r| Some(*r)))
}

pub(crate) fn pack(ptr: u32, len: u32) -> i64 {
    ((u64::from(ptr) << 32) | u64::from(len)) as i64
}

pub(crate) fn unpack(packed: i64) -> (usize, usize) {
    let raw = packed as u64;
    ((raw >> 32) as usize, (raw & 0xffff_ffff) as usize)
}

fn slice_of(data: &[u8], ptr: usize, len: usize) -> wasmtime::Result<&[u8]> {
    ptr.checked_add(len)
        .filter(|end| *end <= data.len())
        .map(|end| &data[ptr..end])
        .ok_or_else(|| wasmtime::Error::msg(format!("guest range {ptr}+{len} out of bounds")))
}

/// The in-flight consumer call a store is serving.
pub(crate) struct CallScope {
    pub ctx: ServiceContext,
    pub handle: Handle,
    /// Set once the caller stopped waiting for the result.
    pub cancelled: Arc<AtomicBool>,
}

impl CallScope {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Data attached to every plugin `Store`.
pub(crate) struct HostState {
    label: String,
    limits: StoreLimits,
    scope: Option<CallScope>,
}

impl HostState {
    pub fn new(label: impl Into<String>, limits: &ResourceLimits, scope: Option<CallScope>) -> Self {
        Self {
            label: label.into(),
            limits: limits.store_limits(),
            scope,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.scope.as_ref().is_some_and(CallScope::is_cancelled)
    }
}

/// A fresh store with memory limits and a fuel budget applied.
///
/// Every engine epoch tick makes the guest check whether its call was
/// cancelled; a cancelled guest traps at the next check.
pub(crate) fn new_store(
    engine: &Engine,
    state: HostState,
    fuel: u64,
) -> wasmtime::Result<Store<HostState>> {
    let mut store = Store::new(engine, state);
    store.limiter(|s| &mut s.limits);
    store.set_fuel(fuel)?;
    store.set_epoch_deadline(1);
    if store.data().is_cancelled() {
        // Cancelled before the guest started: trap at its first check.
        store.set_epoch_deadline(0);
    }
    store.epoch_deadline_callback(|ctx| {
        if ctx.data().is_cancelled() {
            Err(wasmtime::Error::msg("consumer call cancelled"))
        } else {
            Ok(UpdateDeadline::Continue(1))
        }
    });
    Ok(store)
}

/// Calls `consumer_manifest` and copies the returned bytes out of the guest.
pub(crate) fn call_manifest(
    store: &mut Store<HostState>,
    instance: &Instance,
) -> wasmtime::Result<Vec<u8>> {
    let manifest = instance.get_typed_func::<(), i64>(&mut *store, "consumer_manifest")?;
    let packed = manifest.call(&mut *store, ())?;
    read_packed(store, instance, packed)
}

/// Copies a packed guest range out of the instance's memory.
pub(crate) fn read_packed(
    store: &mut Store<HostState>,
    instance: &Instance,
    packed: i64,
) -> wasmtime::Result<Vec<u8>> {
    let memory = instance
        .get_memory(&mut *store, "memory")
        .ok_or_else(|| wasmtime::Error::msg("module exports no memory"))?;
    let (ptr, len) = unpack(packed);
    Ok(slice_of(memory.data(&*store), ptr, len)?.to_vec())
}

/// Builds a linker with the `tether` host imports.
pub(crate) fn host_linker(engine: &Engine) -> Result<Linker<HostState>, PluginHostError> {
    let mut linker = Linker::new(engine);
    linker.func_wrap(IMPORT_MODULE, "log", host_log)?;
    linker.func_wrap(IMPORT_MODULE, "get_singleton", host_get_singleton)?;
    linker.func_wrap(IMPORT_MODULE, "update_singleton", host_update_singleton)?;
    linker.func_wrap(IMPORT_MODULE, "http_get", host_http_get)?;
    linker.func_wrap(IMPORT_MODULE, "set_cursor", host_set_cursor)?;
    Ok(linker)
}

fn caller_memory(caller: &mut Caller<'_, HostState>) -> wasmtime::Result<Memory> {
    caller
        .get_export("memory")
        .and_then(Extern::into_memory)
        .ok_or_else(|| wasmtime::Error::msg("guest exports no memory"))
}

fn read_guest(caller: &mut Caller<'_, HostState>, ptr: i32, len: i32) -> wasmtime::Result<Vec<u8>> {
    let memory = caller_memory(caller)?;
    let bytes = slice_of(memory.data(&*caller), ptr as u32 as usize, len as u32 as usize)?;
    Ok(bytes.to_vec())
}

fn read_guest_str(caller: &mut Caller<'_, HostState>, ptr: i32, len: i32) -> wasmtime::Result<String> {
    String::from_utf8(read_guest(caller, ptr, len)?)
        .map_err(|e| wasmtime::Error::msg(format!("guest string is not UTF-8: {e}")))
}

/// Copies `bytes` into guest memory obtained from the guest's `alloc`.
fn write_guest(caller: &mut Caller<'_, HostState>, bytes: &[u8]) -> wasmtime::Result<i64> {
    let alloc = caller
        .get_export("alloc")
        .and_then(Extern::into_func)
        .ok_or_else(|| wasmtime::Error::msg("guest exports no alloc"))?
        .typed::<i32, i32>(&*caller)?;
    let len = u32::try_from(bytes.len())
        .ok()
        .filter(|len| *len <= i32::MAX as u32)
        .ok_or_else(|| wasmtime::Error::msg("payload too large for guest memory"))?;

    let ptr = alloc.call(&mut *caller, len as i32)? as u32;
    let memory = caller_memory(caller)?;
    memory
        .write(&mut *caller, ptr as usize, bytes)
        .map_err(|e| wasmtime::Error::msg(format!("guest write failed: {e}")))?;
    Ok(pack(ptr, len))
}

fn call_scope(caller: &Caller<'_, HostState>) -> wasmtime::Result<(ServiceContext, Handle)> {
    let scope = caller
        .data()
        .scope
        .as_ref()
        .ok_or_else(|| wasmtime::Error::msg("host import is only available during a consumer call"))?;
    ensure_live(caller)?;
    Ok((scope.ctx.clone(), scope.handle.clone()))
}

/// Traps once the consumer call has been cancelled.
fn ensure_live(caller: &Caller<'_, HostState>) -> wasmtime::Result<()> {
    if caller.data().is_cancelled() {
        return Err(wasmtime::Error::msg("consumer call cancelled"));
    }
    Ok(())
}

fn host_log(mut caller: Caller<'_, HostState>, level: i32, ptr: i32, len: i32) -> wasmtime::Result<()> {
    let message = read_guest_str(&mut caller, ptr, len)?;
    let consumer = caller.data().label.as_str();
    match level {
        0 => error!(consumer, "{message}"),
        1 => warn!(consumer, "{message}"),
        2 => info!(consumer, "{message}"),
        _ => debug!(consumer, "{message}"),
    }
    Ok(())
}

fn host_get_singleton(
    mut caller: Caller<'_, HostState>,
    tag_ptr: i32,
    tag_len: i32,
) -> wasmtime::Result<i64> {
    let (ctx, handle) = call_scope(&caller)?;
    let tag = read_guest_str(&mut caller, tag_ptr, tag_len)?;

    let result = handle.block_on(ctx.data().get_singleton(ctx.binding_id(), &tag));
    ensure_live(&caller)?;
    match result {
        Ok(Some(value)) => {
            let bytes = serde_json::to_vec(&value)?;
            write_guest(&mut caller, &bytes)
        }
        Ok(None) => Ok(0),
        Err(e) => {
            warn!(binding_id = %ctx.binding_id(), tag = %tag, error = %e, "get_singleton failed");
            Ok(HOST_ERROR)
        }
    }
}

fn host_update_singleton(
    mut caller: Caller<'_, HostState>,
    tag_ptr: i32,
    tag_len: i32,
    key_ptr: i32,
    key_len: i32,
    value_ptr: i32,
    value_len: i32,
) -> wasmtime::Result<i32> {
    let (ctx, handle) = call_scope(&caller)?;
    let tag = read_guest_str(&mut caller, tag_ptr, tag_len)?;
    let timestamp_key = read_guest_str(&mut caller, key_ptr, key_len)?;
    let raw = read_guest(&mut caller, value_ptr, value_len)?;

    let value: serde_json::Value = match serde_json::from_slice(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(binding_id = %ctx.binding_id(), tag = %tag, error = %e, "update_singleton received invalid JSON");
            return Ok(HOST_ERROR as i32);
        }
    };

    let result = handle.block_on(ctx.data().update_singleton(
        ctx.binding_id(),
        &tag,
        &timestamp_key,
        value,
    ));
    match result {
        Ok(()) => Ok(0),
        Err(e) => {
            warn!(binding_id = %ctx.binding_id(), tag = %tag, error = %e, "update_singleton failed");
            Ok(HOST_ERROR as i32)
        }
    }
}

fn host_http_get(mut caller: Caller<'_, HostState>, url_ptr: i32, url_len: i32) -> wasmtime::Result<i64> {
    let (ctx, handle) = call_scope(&caller)?;
    let url = read_guest_str(&mut caller, url_ptr, url_len)?;

    let result = handle.block_on(ctx.fetch(&url));
    ensure_live(&caller)?;
    match result {
        Ok(body) => write_guest(&mut caller, body.as_bytes()),
        Err(e) if e.is_forbidden() => {
            debug!(binding_id = %ctx.binding_id(), url = %url, "Provider request forbidden");
            Ok(HTTP_FORBIDDEN)
        }
        Err(e) => {
            warn!(binding_id = %ctx.binding_id(), url = %url, error = %e, "Provider request failed");
            Ok(HOST_ERROR)
        }
    }
}

fn host_set_cursor(
    mut caller: Caller<'_, HostState>,
    obj_ptr: i32,
    obj_len: i32,
    date_ms: i64,
) -> wasmtime::Result<()> {
    let (ctx, _) = call_scope(&caller)?;
    let current_object = if obj_len == 0 {
        None
    } else {
        Some(read_guest_str(&mut caller, obj_ptr, obj_len)?)
    };
    let current_date = if date_ms < 0 {
        None
    } else {
        DateTime::from_timestamp_millis(date_ms)
    };
    ctx.set_cursor(current_object, current_date);
    Ok(())
}
