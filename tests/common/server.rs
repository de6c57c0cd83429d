//! Test server management.
//!
//! Spawns and manages slrelay instances for integration testing.

use std::process::{Child, Command};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

/// A test server instance.
pub struct TestServer {
    child: Child,
    port: u16,
    _data_dir: TempDir,
}

impl TestServer {
    /// Spawn a relay listening on `127.0.0.1:<port>` at path `/`.
    pub async fn spawn(port: u16) -> anyhow::Result<Self> {
        Self::spawn_with_path(port, "/").await
    }

    /// Spawn a relay that upgrades only on the given path.
    pub async fn spawn_with_path(port: u16, path: &str) -> anyhow::Result<Self> {
        Self::spawn_with_listen(port, path, &[]).await
    }

    /// Spawn a relay with an explicit upgrade path and origin allow-list.
    pub async fn spawn_with_listen(
        port: u16,
        path: &str,
        allow_origins: &[&str],
    ) -> anyhow::Result<Self> {
        let allow_origins = allow_origins
            .iter()
            .map(|o| format!("{o:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        let data_dir = tempfile::tempdir()?;

        let config_path = data_dir.path().join("config.toml");
        let config_content = format!(
            r#"
[server]
name = "test.relay"
metrics_port = 0

[listen]
address = "127.0.0.1:{port}"
path = "{path}"
allow_origins = [{allow_origins}]
"#
        );
        std::fs::write(&config_path, config_content)?;

        let child = Command::new(env!("CARGO_BIN_EXE_slrelay"))
            .arg(&config_path)
            .spawn()?;

        let server = Self {
            child,
            port,
            _data_dir: data_dir,
        };

        // Wait for server to start listening
        server.wait_until_ready().await?;

        Ok(server)
    }

    /// Wait until the server is accepting connections.
    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..30 {
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port))
                .await
                .is_ok()
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Server failed to start within 3 seconds")
    }

    /// WebSocket URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("ws://127.0.0.1:{}{}", self.port, path)
    }

    /// Create a new test client connected to this server.
    pub async fn connect(&self) -> anyhow::Result<super::client::TestClient> {
        super::client::TestClient::connect(&self.url("/")).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
