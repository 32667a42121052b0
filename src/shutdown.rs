//! 守护进程的关闭协调
//!
//! 关闭状态保存在 `watch` 通道中，晚订阅的监听者也能立即看到已经触发的关闭，
//! 因此启动恢复期间收到的信号不会丢失。

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, info};

/// 触发关闭的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C / SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
    /// 由代码主动请求，例如测试或嵌入方
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ShutdownReason::Interrupt => "收到Ctrl+C信号",
            ShutdownReason::Terminate => "收到SIGTERM信号",
            ShutdownReason::Requested => "主动请求关闭",
        };
        f.write_str(text)
    }
}

/// 关闭信号的发送端，只有第一次触发生效
#[derive(Clone)]
pub struct ShutdownManager {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// 触发关闭，返回是否由本次调用触发
    pub fn shutdown(&self, reason: ShutdownReason) -> bool {
        let triggered = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });

        if triggered {
            info!("触发守护进程关闭: {}", reason);
            debug!("通知 {} 个监听者", self.tx.receiver_count());
        } else {
            debug!("关闭已经触发过，忽略: {}", reason);
        }
        triggered
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.tx.borrow()
    }

    /// 等待操作系统的关闭信号并触发关闭
    pub async fn listen_for_signals(&self) -> Result<ShutdownReason> {
        let reason = wait_for_signal().await?;
        self.shutdown(reason);
        Ok(reason)
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 关闭信号的接收端，可自由克隆给各个后台循环
#[derive(Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownListener {
    pub fn is_triggered(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// 等待关闭被触发，发送端全部释放时按主动关闭处理
    pub async fn triggered(&mut self) -> ShutdownReason {
        match self.rx.wait_for(Option::is_some).await {
            Ok(reason) => (*reason).unwrap_or(ShutdownReason::Requested),
            Err(_) => ShutdownReason::Requested,
        }
    }
}

async fn wait_for_signal() -> Result<ShutdownReason> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("安装SIGTERM信号处理器失败")?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("安装Ctrl+C信号处理器失败")?;
                Ok(ShutdownReason::Interrupt)
            }
            _ = terminate.recv() => Ok(ShutdownReason::Terminate),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.context("安装Ctrl+C信号处理器失败")?;
        Ok(ShutdownReason::Interrupt)
    }
}
