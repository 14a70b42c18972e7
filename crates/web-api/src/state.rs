use std::sync::Arc;

use application::{ConversationService, EventDispatcher, IdentityResolver, UserDirectory};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<EventDispatcher>,
    pub conversations: Arc<ConversationService>,
    pub directory: Arc<UserDirectory>,
    pub identity: Arc<dyn IdentityResolver>,
    /// 每个连接发送队列的容量
    pub outbound_buffer: usize,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<EventDispatcher>,
        conversations: Arc<ConversationService>,
        directory: Arc<UserDirectory>,
        identity: Arc<dyn IdentityResolver>,
        outbound_buffer: usize,
    ) -> Self {
        Self {
            dispatcher,
            conversations,
            directory,
            identity,
            outbound_buffer,
        }
    }
}
