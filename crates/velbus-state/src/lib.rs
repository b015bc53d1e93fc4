//! The JSON-Patch observable mapping used for every module's state
//! tree. No notion of bus addresses or modules lives here — just the
//! tree and the patch operations its mutations produce.

pub mod dict;
pub mod patch;

pub use dict::{prefix_patch, ObservableDict};
pub use patch::{apply, JsonPatch, JsonPatchOp, PatchOp};
