//! Integration test infrastructure.
//!
//! Provides a fake relay server speaking just enough of the dialect, and a
//! spawned straybot instance pointed at it.

use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::time::{Instant, timeout};

/// A listening fake relay.
pub struct FakeRelay {
    listener: TcpListener,
}

impl FakeRelay {
    pub async fn bind() -> anyhow::Result<FakeRelay> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(FakeRelay { listener })
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().expect("listener has an address").port()
    }

    /// Wait for the bot to connect.
    pub async fn accept(&self, wait: Duration) -> anyhow::Result<RelayConn> {
        let (stream, _) = timeout(wait, self.listener.accept()).await??;
        let (read, write) = stream.into_split();
        Ok(RelayConn {
            lines: BufReader::new(read).lines(),
            writer: write,
        })
    }
}

/// One accepted bot connection, line-oriented.
pub struct RelayConn {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

#[allow(dead_code)]
impl RelayConn {
    pub async fn send_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(format!("{line}\r\n").as_bytes()).await?;
        Ok(())
    }

    pub async fn recv_line(&mut self, wait: Duration) -> anyhow::Result<String> {
        let line = timeout(wait, self.lines.next_line())
            .await??
            .ok_or_else(|| anyhow::anyhow!("connection closed"))?;
        Ok(line)
    }

    /// Read lines until one contains `needle`. Keep-alive pings and other
    /// unrelated traffic are skipped.
    pub async fn expect_line_containing(
        &mut self,
        needle: &str,
        wait: Duration,
    ) -> anyhow::Result<String> {
        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or_else(|| anyhow::anyhow!("timed out waiting for {needle:?}"))?;
            let line = self
                .recv_line(remaining)
                .await
                .map_err(|e| anyhow::anyhow!("while waiting for {needle:?}: {e}"))?;
            if line.contains(needle) {
                return Ok(line);
            }
        }
    }

    /// Assert that nothing containing `needle` arrives within the window.
    pub async fn assert_no_line_containing(
        &mut self,
        needle: &str,
        window: Duration,
    ) -> anyhow::Result<()> {
        let deadline = Instant::now() + window;
        loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Ok(());
            };
            if remaining.is_zero() {
                return Ok(());
            }
            match timeout(remaining, self.lines.next_line()).await {
                Err(_) => return Ok(()),
                Ok(Ok(Some(line))) => {
                    if line.contains(needle) {
                        anyhow::bail!("unexpected line within quiet window: {line}");
                    }
                }
                // Closed: nothing more can arrive.
                Ok(Ok(None)) | Ok(Err(_)) => return Ok(()),
            }
        }
    }

    /// Consume the credential handshake and answer with the welcome.
    pub async fn complete_handshake(&mut self, nick: &str, wait: Duration) -> anyhow::Result<()> {
        self.expect_line_containing("PASS ", wait).await?;
        self.expect_line_containing(&format!("NICK {nick}"), wait).await?;
        self.send_line(&format!(":relay.test 001 {nick} :Welcome, GLHF!"))
            .await?;
        Ok(())
    }

    /// Drop the connection, simulating a mid-session transport failure.
    pub fn close(self) {}
}

/// A spawned straybot process wired to a fake relay port.
pub struct TestBot {
    child: Child,
    _config_dir: tempfile::TempDir,
}

#[allow(dead_code)]
impl TestBot {
    pub fn spawn(port: u16) -> anyhow::Result<TestBot> {
        let config_dir = tempfile::tempdir()?;
        let config_path = config_dir.path().join("straybot.toml");
        let config = format!(
            r##"
[server]
host = "127.0.0.1"
port = {port}
tls = false
nick = "straybot"
pass = "oauth:test-token"

[bot]
prefix = "!"
channel = "#chan"
admins = ["alice"]
greeting = "reporting for duty"
"##
        );
        std::fs::write(&config_path, config)?;

        let child = Command::new(env!("CARGO_BIN_EXE_straybot"))
            .arg(&config_path)
            .env("RUST_LOG", "debug")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(TestBot {
            child,
            _config_dir: config_dir,
        })
    }

    /// Poll for process exit.
    pub fn wait_for_exit(&mut self, wait: Duration) -> bool {
        let deadline = std::time::Instant::now() + wait;
        while std::time::Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        false
    }
}

impl Drop for TestBot {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
