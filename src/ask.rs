//! Natural-language questions over the exported activities.
//!
//! The export is loaded into a [`Table`] and handed, together with the
//! question, to a [`QueryAgent`]. The bundled agent talks to any
//! OpenAI-compatible `chat/completions` endpoint.

use std::path::Path;

use async_trait::async_trait;
use csv::ReaderBuilder;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("csv file '{0}' not found")]
    MissingExport(String),
    #[error("failed to read csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("agent request failed: {status} {body}")]
    Agent { status: u16, body: String },
    #[error("agent returned no answer")]
    EmptyAnswer,
}

/// In-memory copy of the CSV export.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        if !path.exists() {
            return Err(AgentError::MissingExport(path.display().to_string()));
        }
        let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let rows = reader
            .records()
            .map(|r| r.map(|rec| rec.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;
        info!("Loaded {} rows from {}", rows.len(), path.display());
        Ok(Self { headers, rows })
    }

    /// CSV text of the header plus the last `max_rows` rows (all rows when
    /// `None`), dropping columns that are empty in every included row.
    pub fn to_prompt_csv(&self, max_rows: Option<usize>) -> Result<String, AgentError> {
        let rows = &self.rows[self.rows.len() - self.included_rows(max_rows)..];
        let keep: Vec<usize> = (0..self.headers.len())
            .filter(|&i| rows.iter().any(|r| r.get(i).is_some_and(|c| !c.is_empty())))
            .collect();

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(keep.iter().map(|&i| self.headers[i].as_str()))?;
        for row in rows {
            writer.write_record(keep.iter().map(|&i| row.get(i).map_or("", String::as_str)))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| AgentError::Csv(e.into_error().into()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn included_rows(&self, max_rows: Option<usize>) -> usize {
        max_rows.map_or(self.rows.len(), |m| m.min(self.rows.len()))
    }

    /// User message carrying the data and the question. When rows are left
    /// out the message says so, with the full count.
    pub fn prompt_message(&self, question: &str, max_rows: Option<usize>) -> Result<String, AgentError> {
        let data = self.to_prompt_csv(max_rows)?;
        let included = self.included_rows(max_rows);
        let total = self.rows.len();

        let scope = if included < total {
            format!(
                "The export holds {total} activities; only the last {included} rows of the file \
are included below. Say so if the question needs the rows that were left out.\n"
            )
        } else {
            format!("The export holds {total} activities, all included below.\n")
        };
        Ok(format!("{scope}Data:\n{data}\nQuestion: {question}"))
    }
}

/// Given a table and a question, produce an answer.
#[async_trait]
pub trait QueryAgent: Send + Sync {
    async fn answer(&self, table: &Table, question: &str) -> Result<String, AgentError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatAnswer,
}

#[derive(Deserialize)]
struct ChatAnswer {
    content: Option<String>,
}

const SYSTEM_PROMPT: &str = "You answer questions about a person's Strava activity export. \
The data is CSV with one activity per row; distances are metres, times are seconds, \
speeds are metres per second and dates are ISO 8601 UTC. \
Answer concisely and only from the data given.";

pub struct ChatCompletionsAgent {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
    max_rows: Option<usize>,
}

impl ChatCompletionsAgent {
    pub fn new(base_url: &str, model: impl Into<String>, api_key: SecretString, max_rows: Option<usize>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            max_rows,
        }
    }
}

#[async_trait]
impl QueryAgent for ChatCompletionsAgent {
    async fn answer(&self, table: &Table, question: &str) -> Result<String, AgentError> {
        let content = table.prompt_message(question, self.max_rows)?;
        debug!("Prompt carries {} bytes", content.len());

        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content,
                },
            ],
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::Agent {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(AgentError::EmptyAnswer)
    }
}

/// Load the export and ask `agent` about it.
pub async fn ask(agent: &dyn QueryAgent, csv_path: &Path, question: &str) -> Result<String, AgentError> {
    let table = Table::load(csv_path)?;
    agent.answer(&table, question).await
}
