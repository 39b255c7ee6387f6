/*! Code generation front half: symbol mangling, the runtime contract, dispatch tables and the
 * lowering of verified instructions into target-independent statements.
 *
 * The C emitter and the reference runtime both start from a [`LoweredProgram`].
 */

pub mod context;
pub mod dispatch;
pub mod lowering;
pub mod mangle;
pub mod runtime_contract;
pub mod stmt;

pub use context::{LoweringContext, MethodTarget};
pub use dispatch::{ClassDispatch, DispatchTables, VTableEntry};
pub use lowering::{lower_method, lower_program, LoweredProgram};
pub use stmt::{
    Call, Dispatch, FieldTarget, LoweredClass, LoweredHandler, LoweredMethod, LoweredStmt,
    StaticField, Stmt,
};
