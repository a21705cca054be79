//! Shared fixtures for integration tests
//!
//! A small Northwind-shaped SQLite database, a markdown corpus, and a scripted model client that
//! stands in for the language-model backend.

use analytics_copilot::engine::{DataEngine, SqliteEngine};
use analytics_copilot::error::CopilotError;
use analytics_copilot::fewshot::FewShotArtifact;
use analytics_copilot::provider::{
    ChatMessage, CompletionOptions, CompletionResponse, ModelProviderClient, TokenUsage,
};
use analytics_copilot::retrieval::CorpusIndex;
use analytics_copilot::{Pipeline, PipelineSettings};
use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const MARKETING_CALENDAR: &str = "# Northwind Marketing Calendar (2016)

## Summer Beverages 2016
- Dates: 2016-06-01 to 2016-08-31
- Notes: Focus on Beverages and Condiments.

## Winter Classics 2016
- Dates: 2016-12-01 to 2016-12-31
- Notes: Push Dairy Products and Confections for holiday gifting.
";

pub const KPI_DEFINITIONS: &str = "# Northwind KPI Definitions

## Average Order Value (AOV)
- AOV = SUM(UnitPrice * Quantity * (1 - Discount)) / COUNT(DISTINCT OrderID)

## Gross Margin
- GM = SUM((UnitPrice - CostOfGoods) * Quantity * (1 - Discount))
- When cost is missing, approximate it as a fixed share of unit price.
";

pub const PRODUCT_POLICY: &str = "# Returns & Policy

## Returns Window
- Unopened Beverages: 14 days
- Opened Beverages: no returns
- Perishables (Produce, Seafood, Dairy Products): 3 to 7 days
- All other items: 30 days
";

pub const CATALOG: &str = "# Catalog Snapshot

## Categories
- Beverages, Condiments, Confections, Dairy Products, Grains/Cereals, Meat/Poultry, Produce, Seafood.
";

const SEED: &str = r#"
CREATE TABLE Categories (CategoryID INTEGER PRIMARY KEY, CategoryName TEXT);
CREATE TABLE Customers (CustomerID TEXT PRIMARY KEY, CompanyName TEXT);
CREATE TABLE Products (
    ProductID INTEGER PRIMARY KEY,
    ProductName TEXT,
    CategoryID INTEGER,
    UnitPrice REAL
);
CREATE TABLE Orders (OrderID INTEGER PRIMARY KEY, CustomerID TEXT, OrderDate TEXT);
CREATE TABLE "Order Details" (
    OrderID INTEGER,
    ProductID INTEGER,
    UnitPrice REAL,
    Quantity INTEGER,
    Discount REAL
);
CREATE VIEW order_items AS SELECT * FROM "Order Details";

INSERT INTO Categories VALUES (1, 'Beverages'), (2, 'Condiments'), (3, 'Dairy Products');
INSERT INTO Customers VALUES ('ALFKI', 'Alfreds Futterkiste'), ('BONAP', 'Bon app'), ('QUICK', 'QUICK-Stop');
INSERT INTO Products VALUES
    (1, 'Chai', 1, 18.0),
    (2, 'Aniseed Syrup', 2, 10.0),
    (3, 'Camembert Pierrot', 3, 34.0),
    (4, 'Côte de Blaye', 1, 263.5);
INSERT INTO Orders VALUES
    (10001, 'ALFKI', '2016-06-15'),
    (10002, 'BONAP', '2016-07-04'),
    (10003, 'ALFKI', '2016-08-31'),
    (10004, 'QUICK', '2016-12-10'),
    (10005, 'ALFKI', '2017-01-20'),
    (10006, 'BONAP', '2015-03-02');
INSERT INTO "Order Details" VALUES
    (10001, 1, 18.0, 10, 0.0),
    (10002, 2, 10.0, 5, 0.0),
    (10003, 3, 34.0, 2, 0.0),
    (10004, 4, 263.5, 4, 0.05),
    (10005, 1, 18.0, 1, 0.0),
    (10006, 2, 10.0, 3, 0.0);
"#;

/// Temporary workspace with `docs/` and `data/northwind.sqlite`
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("marketing_calendar.md"), MARKETING_CALENDAR).unwrap();
        std::fs::write(docs.join("kpi_definitions.md"), KPI_DEFINITIONS).unwrap();
        std::fs::write(docs.join("product_policy.md"), PRODUCT_POLICY).unwrap();
        std::fs::write(docs.join("catalog.md"), CATALOG).unwrap();

        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        let conn = Connection::open(data.join("northwind.sqlite")).unwrap();
        conn.execute_batch(SEED).unwrap();

        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.root().join("docs")
    }

    pub fn database(&self) -> PathBuf {
        self.root().join("data").join("northwind.sqlite")
    }

    pub fn engine(&self) -> Arc<dyn DataEngine> {
        Arc::new(SqliteEngine::new(
            self.database(),
            200,
            vec![
                "orders".to_string(),
                "order_items".to_string(),
                "products".to_string(),
                "customers".to_string(),
                "categories".to_string(),
            ],
        ))
    }

    pub fn index(&self) -> Arc<CorpusIndex> {
        Arc::new(CorpusIndex::from_dir(&self.docs_dir()).unwrap())
    }

    /// Pipeline over the full corpus with default settings.
    pub fn pipeline(&self, model: Arc<ScriptedModel>) -> Pipeline {
        self.pipeline_with(model, self.index(), None, PipelineSettings::default())
    }

    pub fn pipeline_with(
        &self,
        model: Arc<ScriptedModel>,
        index: Arc<CorpusIndex>,
        artifact: Option<Arc<FewShotArtifact>>,
        settings: PipelineSettings,
    ) -> Pipeline {
        Pipeline::new(
            model,
            CompletionOptions::default(),
            self.engine(),
            index,
            artifact,
            settings,
        )
        .unwrap()
    }
}

enum Script {
    /// Replies handed out in call order
    Sequence(Mutex<VecDeque<String>>),
    /// Reply chosen by the first needle found in the last message
    ByQuestion(Vec<(String, String)>),
}

/// Model client that replays canned replies and records every prompt it receives
pub struct ScriptedModel {
    script: Script,
    delay: Option<Duration>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn sequence(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            script: Script::Sequence(Mutex::new(
                replies.iter().map(|r| r.to_string()).collect(),
            )),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn by_question(routes: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            script: Script::ByQuestion(
                routes
                    .iter()
                    .map(|(needle, reply)| (needle.to_string(), reply.to_string()))
                    .collect(),
            ),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Every call sleeps for `delay` before replying.
    pub fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Script::ByQuestion(vec![(String::new(), reply.to_string())]),
            delay: Some(delay),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().unwrap().clone()
    }

    /// Content of the final message of the `n`th call.
    pub fn request(&self, n: usize) -> String {
        self.prompts.lock().unwrap()[n]
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelProviderClient for ScriptedModel {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> Result<CompletionResponse, CopilotError> {
        let last = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().unwrap().push(messages);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = match &self.script {
            Script::Sequence(queue) => queue.lock().unwrap().pop_front(),
            Script::ByQuestion(routes) => routes
                .iter()
                .find(|(needle, _)| last.contains(needle.as_str()))
                .map(|(_, reply)| reply.clone()),
        };
        let content = reply.ok_or_else(|| {
            CopilotError::ProviderError("scripted model has no reply".to_string())
        })?;

        Ok(CompletionResponse {
            content,
            model: "scripted".to_string(),
            usage: TokenUsage::default(),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn list_models(&self) -> Result<Vec<String>, CopilotError> {
        Ok(vec!["scripted".to_string()])
    }
}
