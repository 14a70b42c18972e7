//! 私信系统核心领域模型
//!
//! 包含用户、私信等核心实体，以及只允许发送者/接收者修改消息的业务规则。

pub mod errors;
pub mod message;
pub mod user;
pub mod value_objects;

pub use errors::*;
pub use message::{DeliveryStatus, DirectMessage};
pub use user::{PresenceStatus, User};
pub use value_objects::*;
