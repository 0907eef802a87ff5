//! 后台任务句柄
//!
//! 订阅循环和定位监听都运行在独立的 tokio 任务里，通过这个句柄取消。
//! 句柄被丢弃时自动取消，避免任务泄漏。

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct TaskHandle {
    name: &'static str,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    /// `token` 应由任务循环在每个挂起点检查
    pub fn new(name: &'static str, token: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self {
            name,
            token,
            handle,
        }
    }

    /// 启动任务，循环体拿到取消令牌的副本
    pub fn spawn<F, Fut>(name: &'static str, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(f(token.clone()));
        Self::new(name, token, handle)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// 取消任务
    ///
    /// 先置位令牌（已经在运行的循环体据此放弃本轮写入），再中止任务。
    pub fn cancel(&self) {
        debug!("取消任务: {}", self.name);
        self.token.cancel();
        self.handle.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 任务是否已结束（正常完成或被取消）
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            debug!("句柄释放，自动取消任务: {}", self.name);
            self.token.cancel();
            self.handle.abort();
        }
    }
}
