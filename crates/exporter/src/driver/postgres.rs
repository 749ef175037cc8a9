//! PostgreSQL driver.

use domain::ScalarValue;
use futures::TryStreamExt;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Connection, Executor, Postgres, Row, Statement, TypeInfo, ValueRef};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::{ChannelRowStream, Driver, DriverError, RowStream};

pub struct PostgresDriver {
    pool: PgPool,
}

impl PostgresDriver {
    /// Creates a driver over a lazily-connecting pool.
    pub fn new(dsn: &str) -> Result<Self, DriverError> {
        let pool = PgPoolOptions::new()
            .connect_lazy(dsn)
            .map_err(|e| DriverError::Unavailable(e.to_string()))?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl Driver for PostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), DriverError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DriverError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn query(
        &self,
        query: &str,
        scope: CancellationToken,
    ) -> Result<Box<dyn RowStream>, DriverError> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| DriverError::Unavailable(e.to_string()))?;

        let (col_tx, col_rx) = oneshot::channel();
        let (row_tx, row_rx) = mpsc::channel(1);
        tokio::spawn(pump(conn, query.to_string(), scope, col_tx, row_tx));

        let columns = col_rx
            .await
            .map_err(|_| DriverError::Query("cursor task ended before reporting columns".into()))??;
        Ok(Box::new(ChannelRowStream::new(columns, row_rx)))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

async fn pump(
    mut conn: PoolConnection<Postgres>,
    sql: String,
    scope: CancellationToken,
    col_tx: oneshot::Sender<Result<Vec<String>, DriverError>>,
    row_tx: mpsc::Sender<Result<Vec<ScalarValue>, DriverError>>,
) {
    if let Err(e) = (&mut *conn)
        .execute(
            "SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY",
        )
        .await
    {
        let _ = col_tx.send(Err(DriverError::Query(e.to_string())));
        return;
    }

    let mut tx = match conn.begin().await {
        Ok(tx) => tx,
        Err(e) => {
            let _ = col_tx.send(Err(DriverError::Unavailable(e.to_string())));
            return;
        }
    };

    let stmt = match (&mut *tx).prepare(&sql).await {
        Ok(stmt) => stmt,
        Err(e) => {
            let _ = col_tx.send(Err(DriverError::Query(e.to_string())));
            return;
        }
    };
    let columns: Vec<String> = stmt
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    if col_tx.send(Ok(columns)).is_err() {
        return;
    }

    {
        let mut rows = stmt.query().fetch(&mut *tx);
        loop {
            let next = tokio::select! {
                biased;
                _ = scope.cancelled() => {
                    let _ = row_tx.send(Err(DriverError::Cancelled)).await;
                    break;
                }
                next = rows.try_next() => next,
            };
            match next {
                Ok(Some(row)) => match decode_row(&row) {
                    Ok(values) => {
                        if row_tx.send(Ok(values)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = row_tx.send(Err(e)).await;
                        break;
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    let _ = row_tx.send(Err(DriverError::Query(e.to_string()))).await;
                    break;
                }
            }
        }
    }

    let _ = tx.commit().await;
}

/// Decodes a row into the most specific supported scalar per column type.
fn decode_row(row: &PgRow) -> Result<Vec<ScalarValue>, DriverError> {
    let mut values = Vec::with_capacity(row.columns().len());
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row
            .try_get_raw(i)
            .map_err(|e| DriverError::Decode(e.to_string()))?;
        if raw.is_null() {
            values.push(ScalarValue::Null);
            continue;
        }

        let type_name = column.type_info().name();
        let value = match type_name {
            "BOOL" => ScalarValue::Bool(get(row, i)?),
            "INT2" => {
                let v: i16 = get(row, i)?;
                ScalarValue::Int(i64::from(v))
            }
            "INT4" => {
                let v: i32 = get(row, i)?;
                ScalarValue::Int(i64::from(v))
            }
            "INT8" => ScalarValue::Int(get(row, i)?),
            "FLOAT4" => {
                let v: f32 = get(row, i)?;
                ScalarValue::Float(f64::from(v))
            }
            "FLOAT8" => ScalarValue::Float(get(row, i)?),
            "TIMESTAMP" => ScalarValue::Timestamp(get(row, i)?),
            "TIMESTAMPTZ" => {
                let v: chrono::DateTime<chrono::Utc> = get(row, i)?;
                ScalarValue::Timestamp(v.naive_utc())
            }
            "DATE" => {
                let v: chrono::NaiveDate = get(row, i)?;
                ScalarValue::Text(v.to_string())
            }
            "TIME" => {
                let v: chrono::NaiveTime = get(row, i)?;
                ScalarValue::Text(v.to_string())
            }
            "UUID" => {
                let v: sqlx::types::Uuid = get(row, i)?;
                ScalarValue::Text(v.to_string())
            }
            "JSON" | "JSONB" => {
                let v: serde_json::Value = get(row, i)?;
                ScalarValue::Text(v.to_string())
            }
            "BYTEA" => ScalarValue::Bytes(get(row, i)?),
            // TEXT/VARCHAR/CHAR/NAME and other textual types.
            _ => ScalarValue::Text(get(row, i)?),
        };
        values.push(value);
    }
    Ok(values)
}

fn get<'r, T>(row: &'r PgRow, i: usize) -> Result<T, DriverError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<T, _>(i)
        .map_err(|e| DriverError::Decode(e.to_string()))
}
