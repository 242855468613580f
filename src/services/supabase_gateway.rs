use crate::config::Config;
use crate::dto::supabase_dto::{
    AnswersPatch, AttemptInsert, AttemptRow, QuestionRow, SubmitPatch, ATTEMPT_COLUMNS,
    QUESTION_COLUMNS,
};
use crate::error::{Error, PersistenceError, Result};
use crate::models::answer::AnswerMap;
use crate::models::question::Question;
use crate::models::score::Score;
use crate::models::test_attempt::{AttemptStatus, TestAttempt};
use crate::services::gateway::{GatewayResult, PersistenceGateway};
use crate::utils::time::now;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

const ATTEMPTS_TABLE: &str = "test_attempts";
const QUESTIONS_TABLE: &str = "test_questions";

/// Gateway over the Supabase PostgREST API.
#[derive(Clone)]
pub struct SupabaseGateway {
    client: Client,
    base_url: Url,
    anon_key: String,
    access_token: Option<String>,
}

impl SupabaseGateway {
    pub fn new(
        base_url: &str,
        anon_key: String,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;
        let client = Client::builder().timeout(timeout).build()?;
        let access_token = access_token.filter(|t| !t.trim().is_empty());

        info!(
            url = %base_url,
            authenticated = access_token.is_some(),
            "Supabase gateway configured"
        );
        Ok(Self {
            client,
            base_url,
            anon_key,
            access_token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let url = config
            .supabase_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| Error::Config("SUPABASE_URL is not set".to_string()))?;
        let anon_key = config
            .supabase_anon_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("SUPABASE_ANON_KEY is not set".to_string()))?;
        Self::new(
            url,
            anon_key,
            config.supabase_access_token.clone(),
            Duration::from_secs(config.http_timeout_secs),
        )
    }

    fn table_url(&self, table: &str) -> GatewayResult<Url> {
        self.base_url
            .join(&format!("rest/v1/{}", table))
            .map_err(|e| PersistenceError::Network(format!("invalid table url: {}", e)))
    }

    fn request(&self, method: Method, table: &str) -> GatewayResult<RequestBuilder> {
        let token = self.access_token.as_deref().unwrap_or(&self.anon_key);
        Ok(self
            .client
            .request(method, self.table_url(table)?)
            .header("apikey", &self.anon_key)
            .bearer_auth(token))
    }

    async fn read_json<T: DeserializeOwned>(request: RequestBuilder) -> GatewayResult<T> {
        let response = check_status(request.send().await?).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_attempt(&self, attempt_id: Uuid) -> GatewayResult<Option<TestAttempt>> {
        let request = self.request(Method::GET, ATTEMPTS_TABLE)?.query(&[
            ("id", format!("eq.{}", attempt_id)),
            ("select", ATTEMPT_COLUMNS.to_string()),
        ]);
        let rows: Vec<AttemptRow> = Self::read_json(request).await?;
        Ok(rows.into_iter().next().map(TestAttempt::from))
    }
}

async fn check_status(response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => PersistenceError::NotFound(body),
        StatusCode::CONFLICT => PersistenceError::Conflict(body),
        _ => PersistenceError::Status {
            status: status.as_u16(),
            body,
        },
    })
}

#[async_trait]
impl PersistenceGateway for SupabaseGateway {
    async fn create_attempt(&self, test_id: Uuid, student_id: Uuid) -> GatewayResult<TestAttempt> {
        let insert = AttemptInsert {
            test_id,
            student_id,
            status: AttemptStatus::InProgress,
            answers: AnswerMap::new(),
            started_at: now(),
        };
        let request = self
            .request(Method::POST, ATTEMPTS_TABLE)?
            .query(&[("select", ATTEMPT_COLUMNS)])
            .header("Prefer", "return=representation")
            .json(&insert);

        let rows: Vec<AttemptRow> = Self::read_json(request).await?;
        let attempt = rows
            .into_iter()
            .next()
            .map(TestAttempt::from)
            .ok_or_else(|| PersistenceError::Decode("insert returned no rows".to_string()))?;
        debug!(attempt_id = %attempt.id, "Inserted attempt row");
        Ok(attempt)
    }

    async fn list_attempts_for_student(&self, student_id: Uuid) -> GatewayResult<Vec<TestAttempt>> {
        let request = self.request(Method::GET, ATTEMPTS_TABLE)?.query(&[
            ("student_id", format!("eq.{}", student_id)),
            ("order", "started_at.desc".to_string()),
            ("select", ATTEMPT_COLUMNS.to_string()),
        ]);
        let rows: Vec<AttemptRow> = Self::read_json(request).await?;
        Ok(rows.into_iter().map(TestAttempt::from).collect())
    }

    async fn find_in_progress_attempt(
        &self,
        test_id: Uuid,
        student_id: Uuid,
    ) -> GatewayResult<Option<TestAttempt>> {
        let request = self.request(Method::GET, ATTEMPTS_TABLE)?.query(&[
            ("test_id", format!("eq.{}", test_id)),
            ("student_id", format!("eq.{}", student_id)),
            ("status", format!("eq.{}", AttemptStatus::InProgress.as_str())),
            ("order", "started_at.desc".to_string()),
            ("limit", "1".to_string()),
            ("select", ATTEMPT_COLUMNS.to_string()),
        ]);
        let rows: Vec<AttemptRow> = Self::read_json(request).await?;
        Ok(rows.into_iter().next().map(TestAttempt::from))
    }

    async fn update_attempt_answers(&self, attempt_id: Uuid, answers: AnswerMap) -> GatewayResult<()> {
        let request = self
            .request(Method::PATCH, ATTEMPTS_TABLE)?
            .query(&[
                ("id", format!("eq.{}", attempt_id)),
                ("status", format!("eq.{}", AttemptStatus::InProgress.as_str())),
            ])
            .header("Prefer", "return=minimal")
            .json(&AnswersPatch { answers: &answers });

        check_status(request.send().await?).await?;
        debug!(%attempt_id, answers = answers.len(), "Stored answers");
        Ok(())
    }

    async fn submit_attempt(
        &self,
        attempt_id: Uuid,
        answers: AnswerMap,
        score: Score,
    ) -> GatewayResult<()> {
        let patch = SubmitPatch {
            answers: &answers,
            status: AttemptStatus::Submitted,
            earned_points: score.earned_points,
            total_points: score.total_points,
            submitted_at: now(),
        };
        let request = self
            .request(Method::PATCH, ATTEMPTS_TABLE)?
            .query(&[
                ("id", format!("eq.{}", attempt_id)),
                ("status", format!("eq.{}", AttemptStatus::InProgress.as_str())),
                ("select", "id".to_string()),
            ])
            .header("Prefer", "return=representation")
            .json(&patch);

        let updated: Vec<serde_json::Value> = Self::read_json(request).await?;
        if !updated.is_empty() {
            return Ok(());
        }

        // Nothing matched: either a retried submit already landed or the row is gone.
        match self.fetch_attempt(attempt_id).await? {
            Some(attempt) if attempt.status == AttemptStatus::Submitted => {
                warn!(%attempt_id, "Attempt was already submitted; treating as success");
                Ok(())
            }
            Some(_) => Err(PersistenceError::Conflict(format!(
                "attempt {} was not updated",
                attempt_id
            ))),
            None => Err(PersistenceError::NotFound(format!("attempt {}", attempt_id))),
        }
    }

    async fn load_questions(&self, test_id: Uuid) -> GatewayResult<Vec<Question>> {
        let request = self.request(Method::GET, QUESTIONS_TABLE)?.query(&[
            ("test_id", format!("eq.{}", test_id)),
            ("order", "order_index.asc".to_string()),
            ("select", QUESTION_COLUMNS.to_string()),
        ]);
        let rows: Vec<QuestionRow> = Self::read_json(request).await?;
        rows.into_iter().map(Question::try_from).collect()
    }
}
