// pipeline.rs — Compilation state and pass orchestration
//
// Holds all pass artifacts and runs the minimal set of passes for a given
// terminal PassId.
//
// Preconditions: Program must be set before calling run_pipeline.
// Postconditions: all artifacts for required passes are populated, or has_error is set.
// Failure modes: any pass emitting error-level diagnostics.
// Side effects: calls on_pass_complete callback after each pass for immediate display.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::ast::Program;
use crate::compute_at::{ComputeAtMap, FuseGroup};
use crate::diag::{DiagLevel, Diagnostic};
use crate::fusion::Fusion;
use crate::parallel_dims::{DimMapOptions, ParallelDimensionMap, RepresentativePolicy};
use crate::pass::{descriptor, required_passes, PassId};

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for reproducible builds and cache-key use.
///
/// `source_hash`: SHA-256 of the raw `.fus` source text.
/// `dims_fingerprint`: SHA-256 of `ParallelDimensionMap::canonical_json()`,
/// absent when the dimension pass did not run.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub dims_fingerprint: Option<[u8; 32]>,
    pub compiler_version: &'static str,
}

#[derive(Serialize)]
struct ProvenanceJson<'a> {
    source_hash: String,
    dims_fingerprint: Option<String>,
    manifest_schema_version: u32,
    compiler_version: &'a str,
}

impl Provenance {
    /// Hex string of the source hash (64 characters).
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    /// Hex string of the dimension-map fingerprint (64 characters).
    pub fn dims_fingerprint_hex(&self) -> Option<String> {
        self.dims_fingerprint.as_ref().map(bytes_to_hex)
    }

    /// Serialize provenance as a JSON string for `--emit build-info`.
    pub fn to_json(&self) -> String {
        let view = ProvenanceJson {
            source_hash: self.source_hash_hex(),
            dims_fingerprint: self.dims_fingerprint_hex(),
            manifest_schema_version: 1,
            compiler_version: self.compiler_version,
        };
        let mut json = serde_json::to_string_pretty(&view).unwrap_or_default();
        json.push('\n');
        json
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Compute provenance from source text and, if built, the dimension map.
///
/// The map fingerprint is computed from compact canonical JSON so it is
/// independent of display formatting.
pub fn compute_provenance(source: &str, dim_map: Option<&ParallelDimensionMap>) -> Provenance {
    Provenance {
        source_hash: sha256(source.as_bytes()),
        dims_fingerprint: dim_map.map(|map| sha256(map.canonical_json().as_bytes())),
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Compilation state ──────────────────────────────────────────────────────

/// Settings that override in-source `set` directives.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    pub representative: Option<RepresentativePolicy>,
}

/// Holds all compilation artifacts and accumulated diagnostics.
pub struct CompilationState {
    pub program: Program,
    pub fusion: Option<Fusion>,
    pub fuse_groups: Option<Vec<FuseGroup>>,
    pub options: DimMapOptions,
    pub compute_at: Option<ComputeAtMap>,
    pub dim_map: Option<ParallelDimensionMap>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
}

impl CompilationState {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            fusion: None,
            fuse_groups: None,
            options: DimMapOptions::default(),
            compute_at: None,
            dim_map: None,
            diagnostics: Vec::new(),
            has_error: false,
        }
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution failed due to error-level diagnostics in a pass.
/// The specific diagnostics are available in `CompilationState.diagnostics`.
#[derive(Debug)]
pub struct PipelineError {
    /// The pass that produced the error.
    pub failing_pass: PassId,
}

fn has_error_diags(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}

/// Per-pass post-processing: callback, accumulate, verbose, error check.
fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: Duration,
    verbose: bool,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    let is_err = has_error_diags(&diags);
    state.diagnostics.extend(diags);
    if verbose {
        eprintln!(
            "pdim: {} complete, {:.1}ms",
            descriptor(pass_id).name,
            elapsed.as_secs_f64() * 1000.0
        );
    }
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

/// An upstream artifact a pass needs. Missing artifacts mean the runner was
/// driven out of order, which is reported as a failure of `pass`.
fn upstream<T>(slot: &Option<T>, pass: PassId) -> Result<&T, PipelineError> {
    slot.as_ref().ok_or(PipelineError { failing_pass: pass })
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → on_pass_complete(callback) → verbose → error check.
///
/// Preconditions: `state.program` is set.
/// Postconditions: artifacts for all passes in `required_passes(terminal)` are populated,
///   or `state.has_error` is true.
/// Failure modes: any pass producing error-level diagnostics.
/// Side effects: calls `on_pass_complete` after each pass for immediate diagnostic display.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    overrides: &PipelineOptions,
    verbose: bool,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    for pass_id in required_passes(terminal) {
        match pass_id {
            PassId::BuildFusion => {
                let t = Instant::now();
                let result = crate::lower::lower(&state.program);
                let elapsed = t.elapsed();
                state.fusion = Some(result.fusion);
                state.fuse_groups = Some(result.fuse_groups);
                state.options = result.options;
                if let Some(policy) = overrides.representative {
                    state.options.representative = policy;
                }
                finish_pass(
                    state,
                    PassId::BuildFusion,
                    result.diagnostics,
                    elapsed,
                    verbose,
                    &mut on_pass_complete,
                )?;
            }
            PassId::ComputeAt => {
                let t = Instant::now();
                let result = crate::compute_at::build_compute_at(
                    upstream(&state.fusion, pass_id)?,
                    upstream(&state.fuse_groups, pass_id)?,
                );
                let elapsed = t.elapsed();
                state.compute_at = Some(result.map);
                finish_pass(
                    state,
                    PassId::ComputeAt,
                    result.diagnostics,
                    elapsed,
                    verbose,
                    &mut on_pass_complete,
                )?;
            }
            PassId::ParallelDims => {
                let t = Instant::now();
                let result = ParallelDimensionMap::build_with_options(
                    upstream(&state.fusion, pass_id)?,
                    upstream(&state.compute_at, pass_id)?,
                    &state.options,
                );
                let elapsed = t.elapsed();
                let diags = match result {
                    Ok(map) => {
                        if verbose {
                            eprintln!(
                                "pdim: {} parallel axes used, {} exact (representative = {})",
                                map.len(),
                                map.iter().filter(|(_, _, exact)| *exact).count(),
                                state.options.representative.name()
                            );
                        }
                        state.dim_map = Some(map);
                        Vec::new()
                    }
                    Err(err) => vec![err.to_diagnostic()],
                };
                finish_pass(
                    state,
                    PassId::ParallelDims,
                    diags,
                    elapsed,
                    verbose,
                    &mut on_pass_complete,
                )?;
            }
        }
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────
