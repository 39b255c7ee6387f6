/*! Whole-program and per-method analyses that run between parsing and lowering.
 *
 * The dependency graph and culler decide which classes, methods and fields survive; the verifier
 * computes the exact operand-stack shape at every instruction of a surviving method.
 */

pub mod cull;
pub mod graph;
pub mod verify;

pub use cull::{cull, CullReport, LiveReason};
pub use graph::{CallSite, DependencyGraph, Node};
pub use verify::{apply_shape, stack_shape, verify_method, FrameStates, StackShape};
