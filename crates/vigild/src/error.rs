use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use vigil_store::StoreError;

/// Failure of one admin request. Rendered as a plain-text body.
#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Confirmación incorrecta")]
    Authorization,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Error de base de datos: {0}")]
    Store(#[from] StoreError),
    #[error("Error de base de datos: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("Error exportando datos: {0}")]
    Export(#[from] csv::Error),
    #[error("Error interno: {0}")]
    Io(#[from] std::io::Error),
}

impl AdminError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Authorization | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Database(_) | Self::Export(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "admin request failed");
        } else {
            tracing::debug!(%status, error = %self, "admin request rejected");
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
