use crate::models::{Document, Transaction};
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::{
    bson::doc, options::FindOptions, options::IndexOptions, Client as MongoClient, Collection,
    Database, IndexModel,
};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Persistence seam for documents and transactions.
///
/// `replace_transactions` is the one operation with atomicity requirements:
/// the statement's prior rows must survive unchanged unless the full new set
/// is written.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_document(&self, document: &Document) -> Result<(), AppError>;
    async fn find_document(&self, id: &str) -> Result<Option<Document>, AppError>;
    async fn find_documents_by_statement(
        &self,
        statement_id: &str,
    ) -> Result<Vec<Document>, AppError>;
    async fn list_documents(
        &self,
        owner_id: &str,
        statement_id: Option<&str>,
    ) -> Result<Vec<Document>, AppError>;
    async fn update_document(&self, document: &Document) -> Result<(), AppError>;
    /// Returns false when no document with that id existed.
    async fn delete_document(&self, id: &str) -> Result<bool, AppError>;

    /// Atomically replace the statement's full transaction set.
    async fn replace_transactions(
        &self,
        statement_id: &str,
        records: Vec<Transaction>,
    ) -> Result<usize, AppError>;
    /// Transactions for a statement, newest transaction date first.
    async fn list_transactions(&self, statement_id: &str) -> Result<Vec<Transaction>, AppError>;
    async fn delete_transactions(&self, statement_id: &str) -> Result<u64, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(uri = %uri, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB at {}: {}", uri, e);
            AppError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for statement-service");

        let statement_index = IndexModel::builder()
            .keys(doc! { "statement_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("statement_lookup".to_string())
                    .build(),
            )
            .build();
        self.documents()
            .create_index(statement_index.clone(), None)
            .await
            .map_err(AppError::from)?;
        self.transactions()
            .create_index(statement_index, None)
            .await
            .map_err(AppError::from)?;

        let owner_index = IndexModel::builder()
            .keys(doc! { "owner_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("owner_lookup".to_string())
                    .build(),
            )
            .build();
        self.documents()
            .create_index(owner_index, None)
            .await
            .map_err(AppError::from)?;

        Ok(())
    }

    pub fn client(&self) -> &MongoClient {
        &self.client
    }

    fn documents(&self) -> Collection<Document> {
        self.db.collection("documents")
    }

    fn transactions(&self) -> Collection<Transaction> {
        self.db.collection("transactions")
    }
}

#[async_trait]
impl RecordStore for MongoStore {
    async fn insert_document(&self, document: &Document) -> Result<(), AppError> {
        self.documents()
            .insert_one(document, None)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    async fn find_document(&self, id: &str) -> Result<Option<Document>, AppError> {
        self.documents()
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(AppError::from)
    }

    async fn find_documents_by_statement(
        &self,
        statement_id: &str,
    ) -> Result<Vec<Document>, AppError> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": 1 })
            .build();
        let mut cursor = self
            .documents()
            .find(doc! { "statement_id": statement_id }, options)
            .await
            .map_err(AppError::from)?;

        let mut documents = Vec::new();
        while let Some(document) = cursor.try_next().await.map_err(AppError::from)? {
            documents.push(document);
        }
        Ok(documents)
    }

    async fn list_documents(
        &self,
        owner_id: &str,
        statement_id: Option<&str>,
    ) -> Result<Vec<Document>, AppError> {
        let mut filter = doc! { "owner_id": owner_id };
        if let Some(statement_id) = statement_id {
            filter.insert("statement_id", statement_id);
        }

        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let mut cursor = self
            .documents()
            .find(filter, options)
            .await
            .map_err(AppError::from)?;

        let mut documents = Vec::new();
        while let Some(document) = cursor.try_next().await.map_err(AppError::from)? {
            documents.push(document);
        }
        Ok(documents)
    }

    async fn update_document(&self, document: &Document) -> Result<(), AppError> {
        self.documents()
            .replace_one(doc! { "_id": &document.id }, document, None)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<bool, AppError> {
        let result = self
            .documents()
            .delete_one(doc! { "_id": id }, None)
            .await
            .map_err(AppError::from)?;
        Ok(result.deleted_count > 0)
    }

    async fn replace_transactions(
        &self,
        statement_id: &str,
        records: Vec<Transaction>,
    ) -> Result<usize, AppError> {
        let mut session = self
            .client
            .start_session(None)
            .await
            .map_err(AppError::from)?;
        session
            .start_transaction(None)
            .await
            .map_err(AppError::from)?;

        let outcome: Result<(), mongodb::error::Error> = async {
            self.transactions()
                .delete_many_with_session(doc! { "statement_id": statement_id }, None, &mut session)
                .await?;
            if !records.is_empty() {
                self.transactions()
                    .insert_many_with_session(&records, None, &mut session)
                    .await?;
            }
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => {
                session.commit_transaction().await.map_err(AppError::from)?;
                Ok(records.len())
            }
            Err(e) => {
                let _ = session.abort_transaction().await;
                Err(AppError::from(e))
            }
        }
    }

    async fn list_transactions(&self, statement_id: &str) -> Result<Vec<Transaction>, AppError> {
        let options = FindOptions::builder()
            .sort(doc! { "transaction_date": -1, "created_at": -1 })
            .build();
        let mut cursor = self
            .transactions()
            .find(doc! { "statement_id": statement_id }, options)
            .await
            .map_err(AppError::from)?;

        let mut transactions = Vec::new();
        while let Some(transaction) = cursor.try_next().await.map_err(AppError::from)? {
            transactions.push(transaction);
        }
        Ok(transactions)
    }

    async fn delete_transactions(&self, statement_id: &str) -> Result<u64, AppError> {
        let result = self
            .transactions()
            .delete_many(doc! { "statement_id": statement_id }, None)
            .await
            .map_err(AppError::from)?;
        Ok(result.deleted_count)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }
}

/// In-memory store for tests and for running the service without MongoDB.
///
/// The single mutex makes `replace_transactions` trivially atomic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    documents: HashMap<String, Document>,
    transactions: Vec<Transaction>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_document(&self, document: &Document) -> Result<(), AppError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.documents.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn find_document(&self, id: &str) -> Result<Option<Document>, AppError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.documents.get(id).cloned())
    }

    async fn find_documents_by_statement(
        &self,
        statement_id: &str,
    ) -> Result<Vec<Document>, AppError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut documents: Vec<Document> = inner
            .documents
            .values()
            .filter(|d| d.statement_id == statement_id)
            .cloned()
            .collect();
        documents.sort_by_key(|d| d.created_at);
        Ok(documents)
    }

    async fn list_documents(
        &self,
        owner_id: &str,
        statement_id: Option<&str>,
    ) -> Result<Vec<Document>, AppError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut documents: Vec<Document> = inner
            .documents
            .values()
            .filter(|d| d.owner_id == owner_id)
            .filter(|d| statement_id.map_or(true, |s| d.statement_id == s))
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn update_document(&self, document: &Document) -> Result<(), AppError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.documents.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.documents.remove(id).is_some())
    }

    async fn replace_transactions(
        &self,
        statement_id: &str,
        records: Vec<Transaction>,
    ) -> Result<usize, AppError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let count = records.len();
        inner.transactions.retain(|t| t.statement_id != statement_id);
        inner.transactions.extend(records);
        Ok(count)
    }

    async fn list_transactions(&self, statement_id: &str) -> Result<Vec<Transaction>, AppError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut transactions: Vec<Transaction> = inner
            .transactions
            .iter()
            .filter(|t| t.statement_id == statement_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| {
            b.transaction_date
                .cmp(&a.transaction_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(transactions)
    }

    async fn delete_transactions(&self, statement_id: &str) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let before = inner.transactions.len();
        inner.transactions.retain(|t| t.statement_id != statement_id);
        Ok((before - inner.transactions.len()) as u64)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
