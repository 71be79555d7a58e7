//! Exported-call dispatch.
//!
//! [`ModuleInstance::invoke`] is the one way host code calls a guest export:
//! check the export's shape, encode the arguments into the instance's memory,
//! make the call, and decode the single result word before the instance can
//! go away.

use std::time::Instant;

use tracing::{debug, instrument};
use wasmtime::{FuncType, Val, ValType};

use crate::codec::{DecodedResult, EncodedValue, ResultKind};
use crate::instance::{ModuleInstance, tracked_call};
use tagbridge_common::BridgeError;

impl ModuleInstance {
    /// Call `export` with `args` and decode its result as `kind`.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::ExportNotFound`] / [`BridgeError::SignatureMismatch`]
    ///   if the export is missing or shaped differently.
    /// - [`BridgeError::AllocationFailed`] if an argument could not be placed.
    /// - [`BridgeError::Trap`], [`BridgeError::FuelExhausted`] or
    ///   [`BridgeError::UnsupportedIntrinsic`] if the call did not return.
    /// - [`BridgeError::MemoryFault`] if the result does not decode.
    #[instrument(skip(self, args, kind), fields(operation_id = %self.operation_id(), kind = kind.name()))]
    pub fn invoke(
        &mut self,
        export: &str,
        args: &[EncodedValue<'_>],
        kind: ResultKind,
    ) -> Result<DecodedResult, BridgeError> {
        let start = Instant::now();

        let func = self
            .instance
            .get_func(&mut self.store, export)
            .ok_or_else(|| BridgeError::ExportNotFound {
                name: export.to_string(),
            })?;
        check_signature(export, &func.ty(&self.store), args.len(), kind)?;

        let mut params = Vec::with_capacity(args.len());
        for arg in args {
            #[allow(clippy::cast_possible_wrap)]
            params.push(Val::I32(arg.encode(&mut *self)? as i32));
        }

        let mut results = vec![Val::I32(0); usize::from(kind.returns_value())];
        tracked_call(&mut self.store, export, |store| {
            func.call(store, &params, &mut results)
        })?;

        #[allow(clippy::cast_sign_loss)]
        let word = results.first().and_then(Val::i32).map_or(0, |w| w as u32);
        let decoded = kind.decode(&*self, word, self.initial_scan_window)?;

        debug!(
            duration_us = start.elapsed().as_micros(),
            null = matches!(decoded, DecodedResult::Null),
            "Guest call completed"
        );

        Ok(decoded)
    }
}

/// All parameters and the optional result must be `i32`, the parameter
/// count must match `argc`, and a result must exist exactly when `kind`
/// expects one.
fn check_signature(
    export: &str,
    ty: &FuncType,
    argc: usize,
    kind: ResultKind,
) -> Result<(), BridgeError> {
    let params: Vec<ValType> = ty.params().collect();
    if params.len() != argc {
        return Err(BridgeError::signature_mismatch(
            export,
            format!("export takes {} parameters, call passes {argc}", params.len()),
        ));
    }
    if let Some(position) = params.iter().position(|p| !matches!(p, ValType::I32)) {
        return Err(BridgeError::signature_mismatch(
            export,
            format!("parameter {position} is {}, expected i32", params[position]),
        ));
    }

    let results: Vec<ValType> = ty.results().collect();
    let expected = usize::from(kind.returns_value());
    if results.len() != expected {
        return Err(BridgeError::signature_mismatch(
            export,
            format!(
                "export returns {} values, {} result expects {expected}",
                results.len(),
                kind.name()
            ),
        ));
    }
    if results.iter().any(|r| !matches!(r, ValType::I32)) {
        return Err(BridgeError::signature_mismatch(export, "result is not i32"));
    }

    Ok(())
}
