//! Lifecycle of the admin web server.

use crate::config::AdminConfig;
use crate::web;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("service cannot start while {0:?}")]
    InvalidState(ServiceState),
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

struct Running {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

/// Admin dashboard server: STOPPED -> STARTING -> RUNNING -> STOPPING -> STOPPED.
pub struct AdminService {
    config: Arc<AdminConfig>,
    state: ServiceState,
    running: Option<Running>,
}

impl AdminService {
    pub fn new(config: Arc<AdminConfig>) -> Self {
        Self {
            config,
            state: ServiceState::Stopped,
            running: None,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Address actually bound, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    /// Bind the listener and serve requests on a background task.
    pub async fn start(&mut self) -> Result<SocketAddr, ServiceError> {
        if self.state != ServiceState::Stopped {
            return Err(ServiceError::InvalidState(self.state));
        }
        self.state = ServiceState::Starting;

        let listener = match TcpListener::bind(&self.config.bind).await {
            Ok(listener) => listener,
            Err(source) => {
                self.state = ServiceState::Stopped;
                return Err(ServiceError::Bind {
                    addr: self.config.bind.clone(),
                    source,
                });
            }
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.state = ServiceState::Stopped;
                return Err(e.into());
            }
        };

        let (shutdown, signal) = oneshot::channel::<()>();
        let app = web::router(self.config.clone());
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = signal.await;
                })
                .await
        });

        self.running = Some(Running { addr, shutdown, task });
        self.state = ServiceState::Running;
        tracing::info!(%addr, "admin service listening");
        Ok(addr)
    }

    /// Stop accepting connections and wait for in-flight requests. No-op when stopped.
    pub async fn stop(&mut self) -> Result<(), ServiceError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        self.state = ServiceState::Stopping;
        tracing::info!(addr = %running.addr, "admin service stopping");

        let _ = running.shutdown.send(());
        let result = running.task.await;
        self.state = ServiceState::Stopped;
        result??;

        tracing::info!("admin service stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn config(tmp: &TempDir, bind: &str) -> Arc<AdminConfig> {
        Arc::new(AdminConfig {
            bind: bind.into(),
            db_path: tmp.path().join("vigil.db"),
            dashboard_path: tmp.path().join("index.html"),
            admin_secret: Some("s3cret".into()),
        })
    }

    async fn send(stream: &mut TcpStream, request: &str) -> String {
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        send(
            &mut stream,
            &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"),
        )
        .await
    }

    #[tokio::test]
    async fn test_start_serve_stop() {
        let tmp = TempDir::new().unwrap();
        let mut service = AdminService::new(config(&tmp, "127.0.0.1:0"));
        assert_eq!(service.state(), ServiceState::Stopped);

        let addr = service.start().await.unwrap();
        assert_eq!(service.state(), ServiceState::Running);
        assert_eq!(service.local_addr(), Some(addr));

        let response = get(addr, "/not-a-route").await;
        assert!(response.starts_with("HTTP/1.1 404"));

        service.stop().await.unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
        assert!(service.local_addr().is_none());
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_request() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, "127.0.0.1:0");
        let writer = vigil_store::open(&config.db_path).unwrap();
        vigil_store::migrate(&writer).unwrap();

        let mut service = AdminService::new(config);
        let addr = service.start().await.unwrap();

        // Hold the write lock so the cleanup handler blocks in the store.
        writer.execute_batch("BEGIN IMMEDIATE").unwrap();
        let body = "tipo=accesos&confirmacion=s3cret";
        let request = format!(
            "POST /limpiar HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
             Content-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            send(&mut stream, &request).await
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stopper = tokio::spawn(async move {
            service.stop().await.unwrap();
            service
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!stopper.is_finished());

        writer.execute_batch("ROLLBACK").unwrap();
        let response = client.await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.ends_with("Historial de accesos eliminado correctamente"));

        let service = stopper.await.unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_requests() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, "127.0.0.1:0");
        vigil_store::migrate(&vigil_store::open(&config.db_path).unwrap()).unwrap();

        let mut service = AdminService::new(config);
        let addr = service.start().await.unwrap();

        let clients: Vec<_> = (0..8).map(|_| tokio::spawn(get(addr, "/data"))).collect();
        for client in clients {
            let response = client.await.unwrap();
            assert!(response.starts_with("HTTP/1.1 200"), "{response}");
            assert!(response.contains("\"total_events\":0"));
        }

        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut service = AdminService::new(config(&tmp, "127.0.0.1:0"));
        service.start().await.unwrap();

        assert!(matches!(
            service.start().await,
            Err(ServiceError::InvalidState(ServiceState::Running))
        ));
        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let tmp = TempDir::new().unwrap();
        let mut service = AdminService::new(config(&tmp, "127.0.0.1:0"));
        service.stop().await.unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_bind_failure_returns_to_stopped() {
        let tmp = TempDir::new().unwrap();
        let mut service = AdminService::new(config(&tmp, "not-an-address"));
        assert!(matches!(service.start().await, Err(ServiceError::Bind { .. })));
        assert_eq!(service.state(), ServiceState::Stopped);
    }
}
