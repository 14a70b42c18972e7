//! 应用层实现。
//!
//! 围绕领域模型的用例：在线状态注册表、实时事件分发、输入状态定时器、
//! 会话聚合与用户目录，以及对持久化和身份解析的抽象。

pub mod clock;
pub mod contacts;
pub mod conversations;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod identity;
pub mod memory;
pub mod presence;
pub mod repository;
pub mod typing;

pub use clock::{Clock, SystemClock};
pub use contacts::ContactResolver;
pub use conversations::{ConversationService, ConversationSummary, HistoryPage, HISTORY_PAGE_SIZE};
pub use directory::{UserDirectory, UserPage};
pub use dispatcher::{DispatcherDependencies, EventDispatcher, SendMessageRequest};
pub use error::{ApplicationError, ErrorCode};
pub use events::{Ack, ClientEvent, MessagePayload, ServerEvent, UserProfile};
pub use identity::IdentityResolver;
pub use memory::{MemoryMessageRepository, MemoryUserRepository};
pub use presence::{
    ConnectionHandle, ConnectionId, PresenceRegistry, PushError, Registration, Unregistration,
};
pub use repository::{ConversationRow, MessageRepository, UserRepository};
pub use typing::TypingTimers;
