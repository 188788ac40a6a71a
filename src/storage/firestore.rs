// file: storage/firestore.rs
// desc: DocumentStore over the Firestore v1 REST API

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::cloud::DocumentStore;
use crate::auth::IdToken;
use crate::config::FirebaseConfig;
use crate::error::StorageError;
use crate::history::{HistoryItem, sort_newest_first};

const FIRESTORE_API: &str = "https://firestore.googleapis.com/v1/";
const PAGE_SIZE: &str = "300";
const MAX_WRITES_PER_COMMIT: usize = 500;

pub struct FirestoreStore {
    client: reqwest::Client,
    project_id: String,
    api_key: String,
    token: IdToken,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StringValue {
    string_value: String,
}

/// int64 values travel as decimal strings.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntegerValue {
    integer_value: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryFields {
    character: StringValue,
    #[serde(default)]
    readings: StringValue,
    saved_at: IntegerValue,
}

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    fields: HistoryFields,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Write {
    Update(Document),
    Delete(String),
}

#[derive(Debug, Serialize)]
struct CommitRequest {
    writes: Vec<Write>,
}

impl From<&HistoryItem> for HistoryFields {
    fn from(item: &HistoryItem) -> Self {
        Self {
            character: StringValue {
                string_value: item.character.to_string(),
            },
            readings: StringValue {
                string_value: item.readings.clone(),
            },
            saved_at: IntegerValue {
                integer_value: item.saved_at.to_string(),
            },
        }
    }
}

impl TryFrom<HistoryFields> for HistoryItem {
    type Error = StorageError;

    fn try_from(fields: HistoryFields) -> Result<Self, Self::Error> {
        let mut chars = fields.character.string_value.chars();
        let (Some(character), None) = (chars.next(), chars.next()) else {
            return Err(StorageError::Backend(format!(
                "document character '{}' is not a single character",
                fields.character.string_value
            )));
        };
        let saved_at = fields
            .saved_at
            .integer_value
            .parse()
            .map_err(|e| StorageError::Backend(format!("invalid savedAt: {e}")))?;

        Ok(HistoryItem {
            character,
            readings: fields.readings.string_value,
            saved_at,
        })
    }
}

impl FirestoreStore {
    pub fn new(config: &FirebaseConfig, token: IdToken) -> Self {
        Self {
            client: reqwest::Client::new(),
            project_id: config.project_id.to_string(),
            api_key: config.api_key.to_string(),
            token,
        }
    }

    /// `projects/{p}/databases/(default)/documents`
    fn database_root(&self) -> [&str; 5] {
        ["projects", &self.project_id, "databases", "(default)", "documents"]
    }

    fn document_name(&self, user_id: &str, character: char) -> String {
        format!(
            "{}/users/{user_id}/history/{character}",
            self.database_root().join("/")
        )
    }

    fn url(&self, tail: &[&str]) -> Result<Url, StorageError> {
        let mut url = Url::parse(FIRESTORE_API).map_err(|e| StorageError::Backend(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| StorageError::Backend("firestore url cannot be a base".into()))?
            .pop_if_empty()
            .extend(self.database_root())
            .extend(tail);
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    fn collection_url(&self, user_id: &str) -> Result<Url, StorageError> {
        self.url(&["users", user_id, "history"])
    }

    fn document_url(&self, user_id: &str, character: char) -> Result<Url, StorageError> {
        let character = character.to_string();
        self.url(&["users", user_id, "history", &character])
    }

    fn commit_url(&self) -> Result<Url, StorageError> {
        let mut url = self.url(&[])?;
        let path = format!("{}:commit", url.path());
        url.set_path(&path);
        Ok(url)
    }

    fn authorize(request: RequestBuilder, token: Option<String>) -> RequestBuilder {
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send with the session's id token, renewing it when it is about to
    /// expire. A 401 triggers one forced renewal and a single retry.
    async fn send(&self, request: RequestBuilder) -> Result<Response, StorageError> {
        let retry = request.try_clone();
        let token = self.token.fresh(&self.client, &self.api_key).await?;
        let response = Self::authorize(request, token).send().await?;

        let response = match retry {
            Some(retry) if response.status() == StatusCode::UNAUTHORIZED => {
                log::info!("Firestore rejected the id token, refreshing");
                let token = self.token.refresh(&self.client, &self.api_key).await?;
                Self::authorize(retry, token).send().await?
            }
            _ => response,
        };

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StorageError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<(), StorageError> {
        for batch in commit_batches(writes) {
            let request = self.client.post(self.commit_url()?).json(&batch);
            self.send(request).await?;
        }
        Ok(())
    }

    fn update_write(&self, user_id: &str, item: &HistoryItem) -> Write {
        Write::Update(Document {
            name: Some(self.document_name(user_id, item.character)),
            fields: item.into(),
        })
    }
}

/// Split `writes` into commits Firestore accepts; empty input sends nothing.
fn commit_batches(writes: Vec<Write>) -> Vec<CommitRequest> {
    let mut writes = writes.into_iter().peekable();
    let mut batches = Vec::new();
    while writes.peek().is_some() {
        batches.push(CommitRequest {
            writes: writes.by_ref().take(MAX_WRITES_PER_COMMIT).collect(),
        });
    }
    batches
}

fn decode_documents(documents: Vec<Document>) -> Vec<HistoryItem> {
    documents
        .into_iter()
        .filter_map(|doc| {
            let name = doc.name.clone().unwrap_or_default();
            HistoryItem::try_from(doc.fields)
                .inspect_err(|e| log::warn!("Skipping history document {name}: {e}"))
                .ok()
        })
        .collect()
}

#[async_trait(?Send)]
impl DocumentStore for FirestoreStore {
    async fn list(&self, user_id: &str) -> Result<Vec<HistoryItem>, StorageError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.collection_url(user_id)?;
            url.query_pairs_mut().append_pair("pageSize", PAGE_SIZE);
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let page: ListResponse = self.send(self.client.get(url)).await?.json().await?;
            items.extend(decode_documents(page.documents));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        sort_newest_first(&mut items);
        Ok(items)
    }

    async fn put(&self, user_id: &str, item: &HistoryItem) -> Result<(), StorageError> {
        let body = Document {
            name: None,
            fields: item.into(),
        };
        let request = self
            .client
            .patch(self.document_url(user_id, item.character)?)
            .json(&body);
        self.send(request).await?;
        Ok(())
    }

    async fn put_all(&self, user_id: &str, items: &[HistoryItem]) -> Result<(), StorageError> {
        let writes = items
            .iter()
            .map(|item| self.update_write(user_id, item))
            .collect();
        self.commit(writes).await
    }

    async fn delete(&self, user_id: &str, character: char) -> Result<(), StorageError> {
        let request = self.client.delete(self.document_url(user_id, character)?);
        self.send(request).await?;
        Ok(())
    }

    async fn delete_all(&self, user_id: &str) -> Result<(), StorageError> {
        let writes = self
            .list(user_id)
            .await?
            .into_iter()
            .map(|item| Write::Delete(self.document_name(user_id, item.character)))
            .collect();
        self.commit(writes).await
    }
}
