use crate::error::AdminError;
use rusqlite::Connection;
use std::path::Path;
use vigil_store::StoreError;

/// Run `op` on a connection opened for this call only.
///
/// The connection (and its background thread) is dropped before returning,
/// on success and on every error path.
pub async fn with_store<T, F>(db_path: &Path, op: F) -> Result<T, AdminError>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
{
    let conn = tokio_rusqlite::Connection::open(db_path.to_path_buf()).await?;
    let result = conn
        .call(move |conn| {
            vigil_store::configure(conn)
                .and_then(|()| op(conn))
                .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))
        })
        .await;
    drop(conn);
    result.map_err(unwrap_store_error)
}

fn unwrap_store_error(err: tokio_rusqlite::Error) -> AdminError {
    match err {
        tokio_rusqlite::Error::Other(inner) => match inner.downcast::<StoreError>() {
            Ok(store) => AdminError::Store(*store),
            Err(other) => AdminError::Database(tokio_rusqlite::Error::Other(other)),
        },
        other => AdminError::Database(other),
    }
}
