pub mod format;
pub mod item;
pub mod level;
pub mod version;

pub use format::{OutputFormat, Separator, format_items};
pub use item::{ConfigItemOp, ItemDiff, ItemEdit, MergedItem, OpType, diff_items};
pub use level::{ConfigNode, LevelInfo, LevelName};
pub use version::{
    ApplyInfo, ApplyItem, ChildApply, GenerateMethod, GeneratedRevision, NodeStatus,
    REVISION_LATEST, ReqType, RevisionInfo,
};
