use std::time::Duration;

use async_trait::async_trait;
use custodian_core::{AgentCredential, SchedulerError, SchedulerResult};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::remote::{RemoteSession, RemoteTransport};

const EXIT_PREFIX: &str = "X:";

/// 基于HTTP的远程执行通道
///
/// 以 `POST {address}{exec_path}` 提交命令，使用 Bearer 凭证认证。
/// 响应体按行流式返回，`O:` 为结果输出，`E:` 为日志，最后一行 `X:<rc>` 携带退出码。
pub struct HttpTransport {
    client: reqwest::Client,
    exec_path: String,
}

impl HttpTransport {
    /// 创建新的HTTP远程执行通道
    pub fn new(connect_timeout: Duration, exec_path: impl Into<String>) -> SchedulerResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| SchedulerError::Network(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            exec_path: exec_path.into(),
        })
    }

    fn endpoint(&self, address: &str) -> String {
        let base = address.trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{base}{}", self.exec_path)
        } else {
            format!("http://{base}{}", self.exec_path)
        }
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn open(
        &self,
        address: &str,
        credential: &AgentCredential,
        payload: String,
    ) -> SchedulerResult<Box<dyn RemoteSession>> {
        let url = self.endpoint(address);
        debug!("提交Agent命令: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(credential.expose())
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| SchedulerError::Network(format!("请求 {url} 失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SchedulerError::Network(format!(
                "Agent拒绝执行请求: {url} 返回 HTTP {status}"
            )));
        }

        Ok(Box::new(HttpSession {
            response,
            lines: LineBuffer::default(),
            eof: false,
        }))
    }
}

struct HttpSession {
    response: reqwest::Response,
    lines: LineBuffer,
    eof: bool,
}

#[async_trait]
impl RemoteSession for HttpSession {
    async fn next_line(&mut self) -> SchedulerResult<Option<String>> {
        loop {
            if let Some(line) = self.lines.next_line(self.eof)? {
                return Ok(Some(line));
            }
            if self.eof || self.lines.exit.is_some() {
                return Ok(None);
            }

            let chunk = self
                .response
                .chunk()
                .await
                .map_err(|e| SchedulerError::Network(format!("Agent连接中断: {e}")))?;
            match chunk {
                Some(bytes) => self.lines.push(&bytes),
                None => self.eof = true,
            }
        }
    }

    async fn wait(self: Box<Self>) -> SchedulerResult<i32> {
        self.lines.exit.ok_or_else(|| {
            SchedulerError::MalformedResponse("Agent输出在上报退出码之前结束".to_string())
        })
    }
}

/// 把字节流切分为输出行，并截获 `X:<rc>` 退出行
#[derive(Debug, Default)]
struct LineBuffer {
    buffer: Vec<u8>,
    exit: Option<i32>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// 取出下一行，`flush` 为真时把剩余不完整的内容也当作一行
    fn next_line(&mut self, flush: bool) -> SchedulerResult<Option<String>> {
        if self.exit.is_some() {
            return Ok(None);
        }

        let raw: Vec<u8> = match self.buffer.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                let mut raw: Vec<u8> = self.buffer.drain(..=pos).collect();
                raw.pop();
                raw
            }
            None if flush && !self.buffer.is_empty() => std::mem::take(&mut self.buffer),
            None => return Ok(None),
        };

        let line = String::from_utf8_lossy(&raw)
            .trim_end_matches('\r')
            .to_string();

        if let Some(code) = line.strip_prefix(EXIT_PREFIX) {
            let rc = code.trim().parse::<i32>().map_err(|_| {
                SchedulerError::MalformedResponse(format!("无效的退出码: {line:?}"))
            })?;
            self.exit = Some(rc);
            self.buffer.clear();
            return Ok(None);
        }

        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let transport = HttpTransport::new(Duration::from_secs(1), "/v1/exec").unwrap();
        assert_eq!(
            transport.endpoint("10.0.0.5:5444"),
            "http://10.0.0.5:5444/v1/exec"
        );
        assert_eq!(
            transport.endpoint("https://agent.example.com/"),
            "https://agent.example.com/v1/exec"
        );
    }

    #[test]
    fn test_lines_split_across_chunks() {
        let mut lines = LineBuffer::default();
        lines.push(b"E:valid");
        assert_eq!(lines.next_line(false).unwrap(), None);
        lines.push(b"ating\r\nO:{\"key\":");
        assert_eq!(lines.next_line(false).unwrap(), Some("E:validating".to_string()));
        lines.push(b"\"k\"}\nX:0\nO:ignored\n");
        assert_eq!(
            lines.next_line(false).unwrap(),
            Some("O:{\"key\":\"k\"}".to_string())
        );
        assert_eq!(lines.next_line(false).unwrap(), None);
        assert_eq!(lines.exit, Some(0));
        assert_eq!(lines.next_line(true).unwrap(), None);
    }

    #[test]
    fn test_trailing_exit_without_newline() {
        let mut lines = LineBuffer::default();
        lines.push(b"E:done\nX:3");
        assert_eq!(lines.next_line(false).unwrap(), Some("E:done".to_string()));
        assert_eq!(lines.next_line(false).unwrap(), None);
        assert_eq!(lines.next_line(true).unwrap(), None);
        assert_eq!(lines.exit, Some(3));
    }

    #[test]
    fn test_malformed_exit_line() {
        let mut lines = LineBuffer::default();
        lines.push(b"X:boom\n");
        assert!(matches!(
            lines.next_line(false),
            Err(SchedulerError::MalformedResponse(_))
        ));
    }
}
