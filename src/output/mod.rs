//! Parse / transform / convert outputs computed against the active module.
//!
//! The layer holds the current inputs and a binding to one installed handle.
//! Every bind or unbind bumps an epoch; a computation whose epoch changed
//! while it ran is discarded, so an output is only ever attributed to the
//! handle that produced it.

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::debug;

use crate::compiler::{
    guarded, Capability, ConvertOptions, ModuleOutput, ParseOptions, TransformOptions,
};
use crate::lifecycle::{FlightTracker, HandleId, ModuleHandle};
use crate::telemetry;
use crate::versions::VersionId;

/// Source text plus the options for each capability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerInputs {
    pub source: String,
    pub parse: ParseOptions,
    pub transform: TransformOptions,
    pub convert: ConvertOptions,
}

impl CompilerInputs {
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }
}

/// One computed result and the module instance that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub capability: Capability,
    pub handle: HandleId,
    pub version: VersionId,
    pub result: ModuleOutput,
}

impl Output {
    /// Text shown in the output pane: the tree as pretty JSON for parse,
    /// generated code otherwise.
    pub fn display_text(&self) -> Option<String> {
        match self.capability {
            Capability::Parse => serde_json::to_string_pretty(self.result.as_json()).ok(),
            Capability::Transform | Capability::ConvertToAlternateSyntax => {
                self.result.code().map(str::to_string)
            }
        }
    }
}

/// Latest published outputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputSnapshot {
    pub handle: Option<HandleId>,
    pub parse: Option<Output>,
    pub transform: Option<Output>,
    pub convert: Option<Output>,
}

impl OutputSnapshot {
    pub fn get(&self, capability: Capability) -> Option<&Output> {
        match capability {
            Capability::Parse => self.parse.as_ref(),
            Capability::Transform => self.transform.as_ref(),
            Capability::ConvertToAlternateSyntax => self.convert.as_ref(),
        }
    }
}

#[derive(Default)]
struct BindingState {
    handle: Option<ModuleHandle>,
    epoch: u64,
    newest_ticket: u64,
}

struct InputState {
    inputs: CompilerInputs,
    revision: u64,
}

pub struct OutputLayer {
    binding: RwLock<BindingState>,
    inputs: Mutex<InputState>,
    flights: FlightTracker,
    snapshot: watch::Sender<OutputSnapshot>,
}

impl OutputLayer {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(OutputSnapshot::default());
        Self {
            binding: RwLock::new(BindingState::default()),
            inputs: Mutex::new(InputState {
                inputs: CompilerInputs::default(),
                revision: 0,
            }),
            flights: FlightTracker::new(),
            snapshot,
        }
    }

    /// Receive every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<OutputSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn current(&self) -> OutputSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn bound_handle(&self) -> Option<HandleId> {
        self.binding.read().handle.as_ref().map(|h| h.id())
    }

    pub fn inputs(&self) -> CompilerInputs {
        self.inputs.lock().inputs.clone()
    }

    /// Replace the inputs and recompute all outputs.
    pub async fn set_inputs(&self, inputs: CompilerInputs) -> OutputSnapshot {
        {
            let mut state = self.inputs.lock();
            state.inputs = inputs;
            state.revision += 1;
        }
        self.refresh().await
    }

    /// Recompute all three outputs from the current inputs.
    ///
    /// The result is published only if neither the binding nor the inputs
    /// changed in the meantime.
    pub async fn refresh(&self) -> OutputSnapshot {
        let epoch = self.epoch();
        let (inputs, revision) = {
            let state = self.inputs.lock();
            (state.inputs.clone(), state.revision)
        };

        let (parse, transform, convert) = tokio::join!(
            self.compute(Capability::Parse, &inputs),
            self.compute(Capability::Transform, &inputs),
            self.compute(Capability::ConvertToAlternateSyntax, &inputs),
        );
        let handle = [&parse, &transform, &convert]
            .iter()
            .find_map(|o| o.as_ref().map(|o| o.handle))
            .or_else(|| self.bound_handle());
        let snapshot = OutputSnapshot { handle, parse, transform, convert };

        {
            // Epoch check and publish under one lock
            let binding = self.binding.read();
            if binding.epoch == epoch && self.inputs.lock().revision == revision {
                self.snapshot.send_replace(snapshot.clone());
            }
        }
        snapshot
    }

    /// Run one capability against the bound handle.
    ///
    /// Yields `None` when unbound, when the module fails, or when the binding
    /// changed before the call finished.
    pub async fn compute(&self, capability: Capability, inputs: &CompilerInputs) -> Option<Output> {
        let (handle, epoch) = {
            let state = self.binding.read();
            (state.handle.clone()?, state.epoch)
        };

        let _flight = self.flights.track(handle.id());
        let module = handle.module();
        let result = match capability {
            Capability::Parse => guarded(module.parse(&inputs.source, &inputs.parse)).await,
            Capability::Transform => guarded(module.transform(&inputs.source, &inputs.transform)).await,
            Capability::ConvertToAlternateSyntax => {
                guarded(module.convert_to_alternate_syntax(&inputs.source, &inputs.convert)).await
            }
        };

        if self.epoch() != epoch {
            debug!(capability = %capability, handle = %handle.id(), "Discarding output from replaced module");
            telemetry::record_stale_output(capability.as_str());
            return None;
        }

        match result {
            Ok(result) => Some(Output {
                capability,
                handle: handle.id(),
                version: handle.version().clone(),
                result,
            }),
            Err(e) => {
                debug!(capability = %capability, version = %handle.version(), error = %e, "Compiler call failed");
                None
            }
        }
    }

    pub(crate) fn flights(&self) -> &FlightTracker {
        &self.flights
    }

    /// Point the layer at a newly activated handle and recompute.
    ///
    /// A binding from an older switch request than the newest seen is ignored.
    pub(crate) async fn rebind(&self, handle: ModuleHandle, ticket: u64) -> bool {
        {
            let mut state = self.binding.write();
            if ticket < state.newest_ticket {
                debug!(handle = %handle.id(), ticket, newest = state.newest_ticket, "Ignoring rebind from older switch");
                return false;
            }
            state.newest_ticket = ticket;
            state.handle = Some(handle);
            state.epoch += 1;
        }
        self.refresh().await;
        true
    }

    /// Detach from the current handle; in-flight results will be discarded.
    pub(crate) fn unbind(&self) {
        let mut state = self.binding.write();
        if state.handle.is_none() {
            return;
        }
        state.handle = None;
        state.epoch += 1;
        self.snapshot.send_replace(OutputSnapshot::default());
    }

    fn epoch(&self) -> u64 {
        self.binding.read().epoch
    }
}

impl Default for OutputLayer {
    fn default() -> Self {
        Self::new()
    }
}
