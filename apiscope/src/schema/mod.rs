//! API schema learning: HTTP reassembly, value stripping, PII flagging and
//! the first-seen-wins inventory.

pub mod http;
pub mod inference;
pub mod inventory;
pub mod pii;

pub use inference::{strip_values, HttpJsonInference, SchemaInference};
pub use inventory::{ApiInventory, ApiSchema, KEY_SEPARATOR};
pub use pii::{PiiDetector, SentinelPiiDetector, DEFAULT_PII_TOKENS};
