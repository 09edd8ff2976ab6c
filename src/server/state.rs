use std::sync::Arc;

use crate::context::AppContext;

/// 应用状态
pub struct AppState {
    /// 服务上下文
    pub ctx: AppContext,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(ctx: AppContext) -> Arc<Self> {
        Arc::new(AppState { ctx })
    }
}
