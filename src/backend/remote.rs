//! Client for the hosted REST API (PostgREST rows, storage bucket, functions).

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use url::Url;
use uuid::Uuid;

use super::{ImageStore, ProfileStore, RecordRepository};
use crate::analysis::{AnalysisRequest, AnalysisResponse, MealAnalyzer};
use crate::cache::DailyRecord;
use crate::config::Config;
use crate::models::{
  HydrationLog, Meal, MealPatch, NewMeal, NewWaterLog, ProfileUpdate, Table, UserProfile,
  WaterLogPatch,
};

/// Storage bucket holding meal photos
const IMAGE_BUCKET: &str = "meal-images";

/// Edge function that estimates macros
const ANALYZE_FUNCTION: &str = "analyze-meal";

/// Hosted backend client
#[derive(Clone)]
pub struct RemoteBackend {
  http: reqwest::Client,
  base: Url,
}

/// Insert payload: the draft plus its owner.
#[derive(Serialize)]
struct Owned<'a, T: Serialize> {
  user_id: Uuid,
  #[serde(flatten)]
  fields: &'a T,
}

impl RemoteBackend {
  pub fn new(url: &str) -> Result<Self> {
    let api_key = Config::get_api_key()?;
    let access_token = Config::get_access_token();
    Self::with_credentials(url, &api_key, access_token.as_deref())
  }

  pub fn with_credentials(url: &str, api_key: &str, access_token: Option<&str>) -> Result<Self> {
    let mut base = Url::parse(url).map_err(|e| eyre!("Invalid backend url '{}': {}", url, e))?;
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    let bearer = access_token.unwrap_or(api_key);
    let mut headers = HeaderMap::new();
    headers.insert(
      "apikey",
      HeaderValue::from_str(api_key).map_err(|e| eyre!("Invalid API key: {}", e))?,
    );
    headers.insert(
      AUTHORIZATION,
      HeaderValue::from_str(&format!("Bearer {}", bearer))
        .map_err(|e| eyre!("Invalid access token: {}", e))?,
    );

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base })
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path)
      .map_err(|e| eyre!("Invalid endpoint '{}': {}", path, e))
  }

  /// Row URL for a table with `column=op.value` filters.
  fn rows_url(&self, table: Table, filters: &[(&str, String)]) -> Result<Url> {
    let mut url = self.endpoint(&format!("rest/v1/{}", table.name()))?;
    {
      let mut query = url.query_pairs_mut();
      query.append_pair("select", "*");
      for (column, filter) in filters {
        query.append_pair(column, filter);
      }
    }
    Ok(url)
  }

  fn rows_request(&self, method: Method, url: Url) -> RequestBuilder {
    self
      .http
      .request(method, url)
      .header("Prefer", "return=representation")
  }

  async fn select<T: DeserializeOwned>(&self, table: Table, filters: &[(&str, String)]) -> Result<Vec<T>> {
    let url = self.rows_url(table, filters)?;
    let response = self
      .http
      .get(url)
      .send()
      .await
      .map_err(|e| eyre!("Failed to query {}: {}", table.name(), e))?;
    read_json(response, table.name()).await
  }

  /// Send a write and return the single row it touched.
  async fn write_one<T: DeserializeOwned, B: Serialize + ?Sized>(
    &self,
    method: Method,
    table: Table,
    filters: &[(&str, String)],
    body: &B,
  ) -> Result<T> {
    let url = self.rows_url(table, filters)?;
    let response = self
      .rows_request(method, url)
      .json(body)
      .send()
      .await
      .map_err(|e| eyre!("Failed to write {}: {}", table.name(), e))?;
    let rows: Vec<T> = read_json(response, table.name()).await?;
    rows
      .into_iter()
      .next()
      .ok_or_else(|| eyre!("No {} row returned", table.name()))
  }

  async fn delete_by_id(&self, table: Table, id: Uuid) -> Result<()> {
    let url = self.rows_url(table, &[("id", eq(id))])?;
    let response = self
      .rows_request(Method::DELETE, url)
      .send()
      .await
      .map_err(|e| eyre!("Failed to delete {} row {}: {}", table.name(), id, e))?;
    let rows: Vec<serde_json::Value> = read_json(response, table.name()).await?;
    if rows.is_empty() {
      return Err(eyre!("No {} row with id {}", table.name(), id));
    }
    Ok(())
  }

  async fn list_day<R: DailyRecord>(
    &self,
    user_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Vec<R>> {
    // Repeated keys AND together in PostgREST
    self
      .select(
        R::table(),
        &[
          ("user_id", eq(user_id)),
          ("created_at", format!("gte.{}", timestamp(start))),
          ("created_at", format!("lte.{}", timestamp(end))),
          ("order", "created_at.desc".to_string()),
        ],
      )
      .await
  }

  async fn insert_owned<R: DailyRecord>(&self, user_id: Uuid, draft: &R::Draft) -> Result<R> {
    let body = Owned {
      user_id,
      fields: draft,
    };
    self.write_one(Method::POST, R::table(), &[], &body).await
  }

  async fn patch_by_id<R: DailyRecord>(&self, id: Uuid, patch: &R::Patch) -> Result<R> {
    self
      .write_one(Method::PATCH, R::table(), &[("id", eq(id))], patch)
      .await
  }

  fn object_url(&self, path: &str) -> Result<Url> {
    self.endpoint(&format!("storage/v1/object/{}/{}", IMAGE_BUCKET, path))
  }
}

fn eq(value: impl std::fmt::Display) -> String {
  format!("eq.{}", value)
}

fn timestamp(t: DateTime<Utc>) -> String {
  t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Decode a JSON body, turning non-2xx responses into errors with the body text.
async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
  let status = response.status();
  if !status.is_success() {
    let body = response.text().await.unwrap_or_default();
    return Err(eyre!("Request for {} failed ({}): {}", what, status, body));
  }
  response
    .json()
    .await
    .map_err(|e| eyre!("Failed to parse {} response: {}", what, e))
}

async fn check_status(response: Response, what: &str) -> Result<()> {
  let status = response.status();
  if !status.is_success() {
    let body = response.text().await.unwrap_or_default();
    return Err(eyre!("Request for {} failed ({}): {}", what, status, body));
  }
  Ok(())
}

// ============================================================================
// Trait implementations
// ============================================================================

#[async_trait]
impl RecordRepository<Meal> for RemoteBackend {
  async fn list_between(
    &self,
    user_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Vec<Meal>> {
    self.list_day(user_id, start, end).await
  }

  async fn insert(&self, user_id: Uuid, draft: &NewMeal) -> Result<Meal> {
    self.insert_owned::<Meal>(user_id, draft).await
  }

  async fn update(&self, id: Uuid, patch: &MealPatch) -> Result<Meal> {
    self.patch_by_id::<Meal>(id, patch).await
  }

  async fn delete(&self, id: Uuid) -> Result<()> {
    self.delete_by_id(Table::Meals, id).await
  }
}

#[async_trait]
impl RecordRepository<HydrationLog> for RemoteBackend {
  async fn list_between(
    &self,
    user_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Vec<HydrationLog>> {
    self.list_day(user_id, start, end).await
  }

  async fn insert(&self, user_id: Uuid, draft: &NewWaterLog) -> Result<HydrationLog> {
    self.insert_owned::<HydrationLog>(user_id, draft).await
  }

  async fn update(&self, id: Uuid, patch: &WaterLogPatch) -> Result<HydrationLog> {
    self.patch_by_id::<HydrationLog>(id, patch).await
  }

  async fn delete(&self, id: Uuid) -> Result<()> {
    self.delete_by_id(Table::WaterLogs, id).await
  }
}

#[async_trait]
impl ProfileStore for RemoteBackend {
  async fn fetch(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
    let rows: Vec<UserProfile> = self
      .select(Table::UserSettings, &[("user_id", eq(user_id))])
      .await?;
    Ok(rows.into_iter().next())
  }

  async fn insert(&self, profile: &UserProfile) -> Result<UserProfile> {
    self
      .write_one(Method::POST, Table::UserSettings, &[], profile)
      .await
  }

  async fn update(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<UserProfile> {
    self
      .write_one(
        Method::PATCH,
        Table::UserSettings,
        &[("user_id", eq(user_id))],
        update,
      )
      .await
  }
}

#[async_trait]
impl ImageStore for RemoteBackend {
  async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
    let url = self.object_url(path)?;
    let response = self
      .http
      .post(url)
      .header(CONTENT_TYPE, content_type)
      .header("x-upsert", "false")
      .body(bytes)
      .send()
      .await
      .map_err(|e| eyre!("Failed to upload image: {}", e))?;
    check_status(response, "image upload").await?;
    Ok(path.to_string())
  }

  fn public_url(&self, path: &str) -> Result<String> {
    self
      .endpoint(&format!("storage/v1/object/public/{}/{}", IMAGE_BUCKET, path))
      .map(String::from)
  }

  async fn delete(&self, path: &str) -> Result<()> {
    let url = self.object_url(path)?;
    let response = self
      .http
      .delete(url)
      .send()
      .await
      .map_err(|e| eyre!("Failed to delete image: {}", e))?;
    check_status(response, "image delete").await
  }
}

#[async_trait]
impl MealAnalyzer for RemoteBackend {
  async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse> {
    let url = self.endpoint(&format!("functions/v1/{}", ANALYZE_FUNCTION))?;
    let response = self
      .http
      .post(url)
      .json(request)
      .send()
      .await
      .map_err(|e| eyre!("Failed to call meal analysis: {}", e))?;
    read_json(response, "meal analysis").await
  }
}
