//! MongoDB driver.
//!
//! Supports the restricted query syntax `[db.]collection.find(<json-filter>)`.
//! The cursor exposes a single synthetic column `document` carrying the JSON
//! form of each document.

use domain::ScalarValue;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document};
use mongodb::{Client, Cursor};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::{Driver, DriverError, RowStream};

pub struct MongoDriver {
    uri: String,
    client: OnceCell<Client>,
}

impl MongoDriver {
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&Client, DriverError> {
        self.client
            .get_or_try_init(|| async {
                Client::with_uri_str(&self.uri)
                    .await
                    .map_err(|e| DriverError::Unavailable(e.to_string()))
            })
            .await
    }
}

#[async_trait::async_trait]
impl Driver for MongoDriver {
    fn name(&self) -> &'static str {
        "mongo"
    }

    async fn ping(&self) -> Result<(), DriverError> {
        let client = self.client().await?;
        client
            .database("admin")
            .run_command(mongodb::bson::doc! { "ping": 1 }, None)
            .await
            .map_err(|e| DriverError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn query(
        &self,
        query: &str,
        scope: CancellationToken,
    ) -> Result<Box<dyn RowStream>, DriverError> {
        let (db_name, collection, filter) = parse_find(query)?;
        let client = self.client().await?;

        let database = match db_name {
            Some(name) => client.database(&name),
            None => client.default_database().ok_or_else(|| {
                DriverError::InvalidQuery(
                    "no database in query and none set in connection URI".to_string(),
                )
            })?,
        };

        let cursor = database
            .collection::<Document>(&collection)
            .find(filter, None)
            .await
            .map_err(|e| DriverError::Query(e.to_string()))?;

        Ok(Box::new(MongoRowStream {
            columns: vec!["document".to_string()],
            cursor,
            scope,
            done: false,
        }))
    }

    async fn close(&self) {
        // The Rust driver tears its connection pool down on drop.
    }
}

/// Parses the restricted `[db.]collection.find(<json-filter>)` syntax.
fn parse_find(query: &str) -> Result<(Option<String>, String, Document), DriverError> {
    let open = query.find('(');
    let close = query.rfind(')');
    let (open, close) = match (open, close) {
        (Some(o), Some(c)) if c > o => (o, c),
        _ => {
            return Err(DriverError::InvalidQuery(
                "expected [db.]collection.find(<filter>)".to_string(),
            ))
        }
    };

    let raw_filter = query[open + 1..close].trim();
    let filter: Document = if raw_filter.is_empty() {
        Document::new()
    } else {
        serde_json::from_str(raw_filter)
            .map_err(|e| DriverError::InvalidQuery(format!("invalid filter JSON: {}", e)))?
    };

    let segments: Vec<&str> = query[..open].split('.').collect();
    if segments.last() != Some(&"find") {
        return Err(DriverError::InvalidQuery(
            "only the 'find' command is supported".to_string(),
        ));
    }

    match segments.len() {
        2 => Ok((None, segments[0].to_string(), filter)),
        3 => Ok((
            Some(segments[0].to_string()),
            segments[1].to_string(),
            filter,
        )),
        _ => Err(DriverError::InvalidQuery(
            "expected [db.]collection.find(<filter>)".to_string(),
        )),
    }
}

struct MongoRowStream {
    columns: Vec<String>,
    cursor: Cursor<Document>,
    scope: CancellationToken,
    done: bool,
}

#[async_trait::async_trait]
impl RowStream for MongoRowStream {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<ScalarValue>>, DriverError> {
        if self.done {
            return Ok(None);
        }

        let next = tokio::select! {
            biased;
            _ = self.scope.cancelled() => {
                self.done = true;
                return Err(DriverError::Cancelled);
            }
            next = self.cursor.try_next() => next,
        };

        match next {
            Ok(Some(document)) => {
                let json = Bson::Document(document).into_relaxed_extjson();
                Ok(Some(vec![ScalarValue::Text(json.to_string())]))
            }
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                Err(DriverError::Query(e.to_string()))
            }
        }
    }

    async fn close(&mut self) {
        self.done = true;
    }
}
